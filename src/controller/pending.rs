//! In-flight filter requests, keyed by request id.

use crate::relay::RequestId;
use std::collections::HashMap;

/// What the controller needs to finish a request once its result arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// Display name used in failure messages, e.g. `"Blur filter"`.
    pub operation: String,
    pub spinner: String,
    /// Image generation the request was submitted against.
    pub generation: u64,
}

#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: HashMap<RequestId, PendingRequest>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: RequestId, request: PendingRequest) {
        let previous = self.entries.insert(id, request);
        debug_assert!(previous.is_none(), "request id {id} reused");
    }

    pub fn take(&mut self, id: RequestId) -> Option<PendingRequest> {
        self.entries.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Whether any in-flight request still shows `spinner`.
    pub fn uses_spinner(&self, spinner: &str) -> bool {
        self.entries.values().any(|entry| entry.spinner == spinner)
    }
}
