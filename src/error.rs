use thiserror::Error;

/// Disposition of a failure inside one proxy session.
///
/// `Malformed` and `Eof` are handled identically by every caller (both end
/// the session silently), but are kept distinct so debug logs can say why.
/// `PolicySwitch` is not really an error: it is the control signal the
/// response task uses to unwind its loop once a 4xx/5xx response flips the
/// origin's policy to passthrough.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unexpected end of stream")]
    Eof,

    #[error("failed to connect upstream: {0}")]
    UpstreamConnect(#[source] std::io::Error),

    #[error("malformed HTTP message: {0}")]
    Malformed(String),

    #[error("policy switched, response replaced by redirect")]
    PolicySwitch,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// True for every disposition treated as a plain unrecoverable end of
    /// session (as opposed to `PolicySwitch`, which is a deliberate
    /// control-flow signal).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionError::PolicySwitch)
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
