//! JSON shapes for the HTTP surfaces of both roles. The primary's secondary
//! client and the HTTP servers share these so the two sides can't drift.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AppendRequest {
    pub msg: String,
    /// Signed so out-of-range values (negatives included) deserialize and get
    /// rejected by write-concern validation rather than body parsing.
    #[serde(default)]
    pub w: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AppendResponse {
    pub messages: Vec<String>,
    pub acks: Vec<AckView>,
    pub w: u32,
    pub duration_ms: u64,
    pub seq: u64,
}

#[derive(Debug, Serialize)]
pub struct AckView {
    pub secondary: String,
    pub ack: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplicateRequest {
    pub msg: String,
    pub seq: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplicateResponse {
    pub status: String,
    pub duplicate: bool,
}

#[derive(Debug, Serialize)]
pub struct PrimaryHealthResponse {
    pub status: String,
    pub count: usize,
    pub secondaries: Vec<String>,
    pub secondary_statuses: Vec<SecondaryStatusView>,
}

#[derive(Debug, Serialize)]
pub struct SecondaryStatusView {
    pub addr: String,
    pub healthy: bool,
    /// Milliseconds since the last successful probe; `null` before the first
    /// success.
    pub last_seen_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SecondaryHealthResponse {
    pub status: String,
    pub delay_ms: u64,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
