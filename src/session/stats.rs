use crate::session::state::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time snapshot of a recognition session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Session identifier
    pub session_id: String,

    /// Current externally visible status
    pub status: Status,

    /// Whether the session wants to be listening right now
    pub is_listening: bool,

    /// When the session object was created
    pub started_at: DateTime<Utc>,

    /// Seconds since creation
    pub duration_secs: f64,

    /// Recognized fragments seen, interim and final
    pub fragments_seen: u64,

    /// Utterances finalized and emitted to the caller
    pub utterances_finalized: u64,
}
