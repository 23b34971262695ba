use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A unit of work a template can be replayed against (one job posting).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: String,
    /// Identifier assigned by the source site, if any.
    #[serde(default)]
    pub external_id: String,
    pub title: String,
    pub organization: String,
    /// Free-text job type, e.g. "Full-time".
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default = "Utc::now")]
    pub discovered_at: DateTime<Utc>,
}

impl Case {
    pub fn new(title: impl Into<String>, organization: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            external_id: String::new(),
            title: title.into(),
            organization: organization.into(),
            category: String::new(),
            location: String::new(),
            url: String::new(),
            description: String::new(),
            requirements: Vec::new(),
            discovered_at: Utc::now(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Stable hash used for duplicate detection.
    ///
    /// Only organization and title feed the hash, taken as-is. "Acme Inc." and
    /// "acme inc." hash differently.
    pub fn case_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}_{}", self.organization, self.title).as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_ignores_everything_but_org_and_title() {
        let a = Case::new("Senior Engineer", "Acme Corp").with_description("first posting");
        let b = Case::new("Senior Engineer", "Acme Corp")
            .with_description("reposted with new text")
            .with_location("Remote");
        assert_ne!(a.id, b.id);
        assert_eq!(a.case_hash(), b.case_hash());
    }

    #[test]
    fn hash_is_case_sensitive() {
        let a = Case::new("Engineer", "Acme Inc.");
        let b = Case::new("Engineer", "acme inc.");
        assert_ne!(a.case_hash(), b.case_hash());
    }

    #[test]
    fn hash_is_hex_sha256() {
        let hash = Case::new("t", "o").case_hash();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn deserialize_minimal_case() {
        let json = r#"{"id":"c1","title":"Backend Dev","organization":"Startup Dynamics"}"#;
        let case: Case = serde_json::from_str(json).unwrap();
        assert_eq!(case.title, "Backend Dev");
        assert!(case.category.is_empty());
        assert!(case.requirements.is_empty());
    }
}
