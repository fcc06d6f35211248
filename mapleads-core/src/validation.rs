//! Advisory checks run before an extraction request leaves the client.
//!
//! The server remains the authority; anything it rejects is surfaced through
//! [`crate::server_error`]. These checks only catch the obvious mistakes
//! early so a round trip is not wasted.

use std::collections::BTreeMap;
use std::fmt;

use mapleads_model::ExtractionRequest;
use serde::Serialize;

pub const MIN_RATING: f32 = 0.0;
pub const MAX_RATING: f32 = 5.0;

/// Account limits relevant to a new job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    pub max_records_per_job: u32,
    /// Remaining credits, when the user summary has been fetched.
    pub available_credits: Option<u64>,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            max_records_per_job: 500,
            available_credits: None,
        }
    }
}

/// Field name to message, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<&'static str, String>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.0.iter().map(|(field, msg)| (*field, msg.as_str()))
    }

    /// Keeps the first message recorded for a field.
    fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in self.iter() {
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "{field}: {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

pub fn validate_extraction(
    request: &ExtractionRequest,
    limits: &PlanLimits,
) -> ValidationErrors {
    let mut errors = ValidationErrors::default();

    if request.keyword.trim().is_empty() {
        errors.add("keyword", "Keyword is required.");
    }
    if request.country.trim().is_empty() {
        errors.add("country", "Please select a country.");
    }

    if request.max_records == 0 {
        errors.add("maxRecords", "Number of records must be at least 1.");
    } else if request.max_records > limits.max_records_per_job {
        errors.add(
            "maxRecords",
            format!(
                "Your plan allows at most {} records per job.",
                limits.max_records_per_job
            ),
        );
    } else if let Some(credits) = limits.available_credits
        && u64::from(request.max_records) > credits
    {
        errors.add(
            "maxRecords",
            format!("Not enough credits: {credits} remaining."),
        );
    }

    let filters = &request.filters;
    for (field, rating) in [
        ("minRating", filters.min_rating),
        ("maxRating", filters.max_rating),
    ] {
        if let Some(rating) = rating
            && !(MIN_RATING..=MAX_RATING).contains(&rating)
        {
            errors.add(field, "Rating must be between 0 and 5.");
        }
    }
    if let (Some(min), Some(max)) = (filters.min_rating, filters.max_rating)
        && min > max
    {
        errors.add(
            "minRating",
            "Minimum rating cannot exceed maximum rating.",
        );
    }
    if let (Some(min), Some(max)) = (filters.min_reviews, filters.max_reviews)
        && min > max
    {
        errors.add(
            "minReviews",
            "Minimum reviews cannot exceed maximum reviews.",
        );
    }

    errors
}
