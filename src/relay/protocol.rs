//! Messages exchanged between the controller and the relay thread.
//!
//! Both directions are tagged by `kind` when serialized, which is how they
//! appear in debug logs. Pixel buffers serialize as their byte count.

use crate::types::{ImageBuffer, ImageError, byte_count};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Correlates a `process` request with its `result` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// A fresh id, never handed out before in this process.
    pub fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Request {
    Init,
    Process {
        operation: String,
        request_id: RequestId,
        #[serde(rename = "bytes", serialize_with = "byte_count")]
        pixels: Vec<u8>,
        width: u32,
        height: u32,
    },
    Shutdown,
}

/// A processed frame as it comes back from the module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payload {
    #[serde(rename = "bytes", serialize_with = "byte_count")]
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl Payload {
    pub fn into_image(self) -> Result<ImageBuffer, ImageError> {
        ImageBuffer::new(self.width, self.height, self.channels, self.pixels)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Response {
    Init {
        success: bool,
        message: String,
    },
    Result {
        request_id: RequestId,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Payload>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl Response {
    pub fn init_ok() -> Self {
        Response::Init {
            success: true,
            message: "Image module loaded successfully!".to_string(),
        }
    }

    pub fn init_failed(message: impl fmt::Display) -> Self {
        Response::Init {
            success: false,
            message: message.to_string(),
        }
    }

    pub fn result_ok(request_id: RequestId, payload: Payload) -> Self {
        Response::Result {
            request_id,
            success: true,
            payload: Some(payload),
            message: None,
        }
    }

    pub fn result_failed(request_id: RequestId, message: impl fmt::Display) -> Self {
        Response::Result {
            request_id,
            success: false,
            payload: None,
            message: Some(message.to_string()),
        }
    }

    /// One-line JSON rendering for logs.
    pub fn to_log_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("<unserializable response: {e}>"))
    }
}

impl Request {
    /// One-line JSON rendering for logs.
    pub fn to_log_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("<unserializable request: {e}>"))
    }
}
