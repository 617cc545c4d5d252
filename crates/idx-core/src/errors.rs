use uuid::Uuid;

/// Core error type for the index bot.
///
/// Adapter crates map their specific errors into this type so the request
/// pipeline can tell workflow outcomes (shown to the sender) apart from
/// collaborator failures (reported to the operator).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("enrollment {0} was already submitted")]
    AlreadySubmitted(Uuid),

    #[error("enrollment {0} was already decided")]
    Terminal(Uuid),

    #[error("enrollment {0} has not been submitted")]
    NotSubmitted(Uuid),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("search index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Workflow and validation outcomes that are answered with a reply
    /// instead of an operator report.
    pub fn is_rule_violation(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::AlreadySubmitted(_)
                | Error::Terminal(_)
                | Error::NotSubmitted(_)
                | Error::DuplicateKey(_)
                | Error::InvalidInput(_)
        )
    }

    /// Reply catalog key used when a rule violation is shown to a sender.
    pub fn reply_key(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "nothing-to-do",
            Error::AlreadySubmitted(_) => "already-submitted",
            Error::Terminal(_) => "already-decided",
            Error::NotSubmitted(_) => "not-submitted",
            Error::DuplicateKey(_) => "exist",
            Error::InvalidInput(_) => "can-not-understand",
            _ => "error",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
