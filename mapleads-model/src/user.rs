use serde::{Deserialize, Serialize};

/// Account and credit summary for the signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(alias = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Remaining record credits. `None` when the server omits it.
    #[serde(default)]
    pub credits: Option<u64>,
    #[serde(default)]
    pub plan: Option<String>,
    /// Largest record count a single job may request under the plan.
    #[serde(default, alias = "maxRecords")]
    pub max_records_per_job: Option<u32>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("unknown user")
    }
}
