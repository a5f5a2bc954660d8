// Core data structures for harvested records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A harvested court document, as persisted to the document store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub source: String,        // Court / publisher identifier
    pub document_type: String, // ruling, decision, order, ...
    pub document_id: String,
    pub is_enabled: bool,
    pub checksum: String, // SHA256 of `content`
    pub full_document_link: String,
    pub content: String,
    pub judged_at: Option<DateTime<Utc>>,
    #[serde(rename = "inserted_at")]
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Create an enabled record stamped with the current time; the checksum is
    /// computed from `content`
    pub fn new(
        source: impl Into<String>,
        document_type: impl Into<String>,
        document_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let content = content.into();
        Self {
            source: source.into(),
            document_type: document_type.into(),
            document_id: document_id.into(),
            is_enabled: true,
            checksum: checksum(&content),
            full_document_link: String::new(),
            content,
            judged_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.full_document_link = link.into();
        self
    }

    pub fn with_judged_at(mut self, judged_at: DateTime<Utc>) -> Self {
        self.judged_at = Some(judged_at);
        self
    }

    /// Store key: `{source}-{base}-{document_id}`
    pub fn document_key(&self, base: &str) -> String {
        format!("{}-{}-{}", self.source, base, self.document_id)
    }

    /// Recalculate the checksum after `content` changed
    pub fn refresh_checksum(&mut self) {
        self.checksum = checksum(&self.content);
        self.updated_at = Utc::now();
    }
}

/// Hex-encoded SHA256 of `content`
pub fn checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
