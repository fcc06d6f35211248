use serde::{Deserialize, Serialize};

use crate::job::Job;

/// Optional result filters applied by the extractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_reviews: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reviews: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_website: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_phone: Option<bool>,
}

/// Parameters of a new extraction job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRequest {
    pub keyword: String,
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    pub max_records: u32,
    #[serde(default)]
    pub filters: ExtractionFilters,
}

impl ExtractionRequest {
    /// Location label in the form the server stores on the job,
    /// most specific part first (`"Austin, TX, US"`).
    pub fn location_label(&self) -> String {
        [self.city.as_deref(), self.state.as_deref(), Some(&self.country)]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub job: Option<Job>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteJobResponse {
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_label_skips_missing_parts() {
        let request = ExtractionRequest {
            keyword: "dentists".into(),
            country: "US".into(),
            state: Some("CA".into()),
            city: Some(" ".into()),
            max_records: 10,
            ..Default::default()
        };
        assert_eq!(request.location_label(), "CA, US");
    }

    #[test]
    fn filters_omit_unset_fields() {
        let value = serde_json::to_value(ExtractionFilters {
            min_rating: Some(4.0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(value, serde_json::json!({ "minRating": 4.0 }));
    }
}
