use serde::{Deserialize, Deserializer};

/// One entry of the repository issues listing.
///
/// The endpoint returns pull requests alongside issues; those carry a
/// `pull_request` key.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    #[serde(default)]
    pub number: Option<u64>,
    pub created_at: String,
    pub state: IssueState,
    #[serde(default)]
    pub closed_at: Option<String>,
    #[serde(default, rename = "pull_request", deserialize_with = "key_present")]
    pub is_pull_request: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
    #[serde(other)]
    Unknown,
}

// Only called when the key exists, so any value (including null) marks a pull request.
fn key_present<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    serde::de::IgnoredAny::deserialize(deserializer)?;
    Ok(true)
}
