use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::models::{ManagerId, PackageCandidate};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    pub issued_at: SystemTime,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            issued_at: SystemTime::now(),
        }
    }

    pub fn is_warmup(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// One row of the durable search cache. Set-like on `(source_manager, name)`;
/// later results enrich (fill an empty summary) rather than replace.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub candidate: PackageCandidate,
    pub source_manager: ManagerId,
    pub origin_query: String,
    pub inserted_at: SystemTime,
}
