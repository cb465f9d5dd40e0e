//! Work items routed through the shared dispatcher.

/// One queued unit of work, tagged per job kind so each handler only sees
/// the fields it reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Archive the artifacts of a finished session.
    Archive { session_id: u64 },
    /// Cache a static asset referenced from a recording. Dispatched through
    /// the same pool but handled by a different service.
    CacheAsset {
        session_id: u64,
        request_url: String,
        depth: u8,
        context: String,
        is_js: bool,
    },
}

impl Task {
    /// Session the work item belongs to, whatever its kind.
    pub fn session_id(&self) -> u64 {
        match self {
            Task::Archive { session_id } => *session_id,
            Task::CacheAsset { session_id, .. } => *session_id,
        }
    }
}
