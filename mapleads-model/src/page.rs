use serde::{Deserialize, Serialize};

use crate::job::JobStatus;

/// Paginated listing envelope used by `GET /jobs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub has_prev_page: bool,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            page: default_page(),
            limit: default_limit(),
            total_pages: 0,
            total: 0,
            has_next_page: false,
            has_prev_page: false,
        }
    }
}

impl<T> Page<T> {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    10
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSort {
    #[default]
    Newest,
    Oldest,
}

impl JobSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobSort::Newest => "newest",
            JobSort::Oldest => "oldest",
        }
    }
}

/// Filter and paging parameters for the jobs listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobListQuery {
    pub page: u32,
    pub limit: u32,
    pub status: Option<JobStatus>,
    pub keyword: Option<String>,
    pub sort: JobSort,
}

impl Default for JobListQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
            status: None,
            keyword: None,
            sort: JobSort::default(),
        }
    }
}

impl JobListQuery {
    /// Query-string pairs in the order the backend documents them. Blank
    /// keywords are omitted rather than sent as empty filters.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.max(1).to_string()),
            ("limit", self.limit.max(1).to_string()),
        ];
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(keyword) = self
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
        {
            pairs.push(("keyword", keyword.to_string()));
        }
        pairs.push(("sort", self.sort.as_str().to_string()));
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_pairs_skip_blank_keyword() {
        let query = JobListQuery {
            keyword: Some("   ".into()),
            status: Some(JobStatus::Active),
            ..Default::default()
        };
        let keys: Vec<_> = query.to_pairs().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["page", "limit", "status", "sort"]);
    }

    #[test]
    fn page_decodes_camel_case_envelope() {
        let page: Page<u32> = serde_json::from_value(serde_json::json!({
            "data": [1, 2],
            "page": 2,
            "limit": 2,
            "totalPages": 3,
            "total": 6,
            "hasNextPage": true,
            "hasPrevPage": true
        }))
        .unwrap();
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next_page && page.has_prev_page);
    }
}
