use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("nostr client error: {0}")]
    NostrClient(#[from] nostr_sdk::client::Error),
    #[error("nostr key error: {0}")]
    NostrKey(#[from] nostr_sdk::nostr::key::Error),
    #[error("nostr tag error: {0}")]
    NostrTag(#[from] nostr_sdk::nostr::event::tag::Error),
    #[error("serde json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing env var: {0}")]
    MissingEnv(&'static str),
    #[error("invalid env var {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },

    // Structural: the document itself is malformed.
    #[error("document must contain exactly one level-1 title, found {}{}", .count, line_suffix(.line))]
    TitleCount { count: usize, line: Option<usize> },
    #[error("content before document title at line {line}: {text:?}")]
    ContentBeforeTitle { line: usize, text: String },
    #[error("invalid publish options: {0}")]
    InvalidOptions(String),
    #[error("nothing to publish at content level {level}: every section is empty")]
    EmptyPublication { level: u8 },

    // Configuration: the unit graph or relay target cannot be resolved.
    #[error("circular dependency involving unit {d_tag}")]
    CircularDependency { d_tag: String },
    #[error("unit {from} references unknown unit {to}")]
    UnknownReference { from: String, to: String },
    #[error("unknown relay category: {0}")]
    UnknownRelayCategory(String),
    #[error("invalid relay url {url:?}: {reason}")]
    InvalidRelayUrl { url: String, reason: String },
    #[error("no reachable relays")]
    NoReachableRelays,

    // Transient: retried by the retry executor.
    #[error("publish quorum failed: required {required}, got {actual}")]
    Quorum { required: usize, actual: usize },
    #[error("relay probe failed for {relay}: {reason}")]
    Probe { relay: String, reason: String },
    #[error("event not found: {0}")]
    EventNotFound(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("operation timed out")]
    Timeout,

    #[error("invalid event id: {0}")]
    InvalidEventId(String),
    #[error("validation mismatch on {field}: expected {expected}, got {actual}")]
    ValidationMismatch {
        field: String,
        expected: String,
        actual: String,
    },
}

impl Error {
    /// Structural and configuration errors abort the run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::TitleCount { .. }
                | Error::ContentBeforeTitle { .. }
                | Error::InvalidOptions(_)
                | Error::EmptyPublication { .. }
                | Error::CircularDependency { .. }
                | Error::UnknownReference { .. }
                | Error::UnknownRelayCategory(_)
                | Error::InvalidRelayUrl { .. }
                | Error::NoReachableRelays
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::NostrClient(_)
                | Error::Quorum { .. }
                | Error::Probe { .. }
                | Error::EventNotFound(_)
                | Error::Publish(_)
                | Error::Timeout
        )
    }
}

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|line| format!(" (line {line})")).unwrap_or_default()
}
