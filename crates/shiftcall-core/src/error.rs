use thiserror::Error;

/// Error taxonomy shared across every crate in the workspace.
///
/// The variants here map directly onto the error kinds the system as a whole
/// must distinguish between: `InputValidation` and `NotFound` are
/// locally recoverable, `TransientUpstream` is retry-safe, `PermanentUpstream`
/// and `Protocol` terminate the current operation without killing the call,
/// and `Fatal` terminates the call. Individual crates raise these directly
/// rather than wrapping them in a crate-local enum, so a `match` at any
/// boundary (the FSM, the cascade coordinator, the webhook handlers) sees the
/// same shape regardless of which subsystem produced the error.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Caller-supplied input failed local validation (bad DTMF, empty transcript).
    #[error("input validation error: {0}")]
    InputValidation(String),

    /// A lookup (phone, PIN, shift, worker) found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// An upstream dependency (catalog, KV, queue, gateway) failed in a way
    /// that is expected to clear on retry.
    #[error("transient upstream error: {0}")]
    TransientUpstream(String),

    /// An upstream dependency rejected the request in a way retrying will not fix.
    #[error("permanent upstream error: {0}")]
    PermanentUpstream(String),

    /// A malformed frame or unrecognized event from the carrier; never fatal.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An unrecoverable internal invariant violation. Terminates the call.
    #[error("fatal error: {0}")]
    Fatal(String),

    /// Configuration could not be loaded or was invalid.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl OrchestratorError {
    pub fn input_validation<S: Into<String>>(msg: S) -> Self {
        Self::InputValidation(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn transient<S: Into<String>>(msg: S) -> Self {
        Self::TransientUpstream(msg.into())
    }

    pub fn permanent<S: Into<String>>(msg: S) -> Self {
        Self::PermanentUpstream(msg.into())
    }

    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn fatal<S: Into<String>>(msg: S) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Transient upstream failures are the only kind a caller should retry automatically.
    pub fn is_retry_safe(&self) -> bool {
        matches!(self, Self::TransientUpstream(_))
    }
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
