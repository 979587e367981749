use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Boxed error detail carried by the outer error.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Usage,
    Codec,
    Transport,
    Channel,
    Expr,
    Machine,
    Rule,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Config => write!(f, "config"),
            ErrorKind::Usage => write!(f, "usage"),
            ErrorKind::Codec => write!(f, "codec"),
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::Channel => write!(f, "channel"),
            ErrorKind::Expr => write!(f, "expression"),
            ErrorKind::Machine => write!(f, "state machine"),
            ErrorKind::Rule => write!(f, "rule"),
        }
    }
}

pub struct ErrorInner {
    pub kind: ErrorKind,
    pub source: Option<BoxError>,
    pub message: Option<String>,
}

pub struct Error {
    pub inner: Box<ErrorInner>,
}

impl Error {
    pub fn new<E>(kind: ErrorKind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(ErrorInner {
                kind,
                source: source.map(Into::into),
                message: None,
            }),
        }
    }

    pub fn with_message<E>(kind: ErrorKind, message: String, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(ErrorInner {
                kind,
                source: source.map(Into::into),
                message: Some(message),
            }),
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.inner.kind
    }

    pub fn is_config(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Config | ErrorKind::Usage)
    }

    pub fn is_usage(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Usage)
    }

    pub fn is_codec(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Codec)
    }

    pub fn is_transport(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Transport)
    }

    pub fn is_expr(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Expr)
    }

    /// True when the underlying transport error is one of the transient
    /// write conditions a retrying channel is allowed to swallow.
    pub fn is_transient_write(&self) -> bool {
        match &self.inner.source {
            Some(source) => {
                if let Some(err) = source.downcast_ref::<TransportError>() {
                    matches!(
                        err,
                        TransportError::BrokenPipe
                            | TransportError::WouldBlock
                            | TransportError::NoReader
                    )
                } else {
                    false
                }
            }
            None => false,
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("tmcp::Error");
        f.field("kind", &self.inner.kind);
        if let Some(ref message) = self.inner.message {
            f.field("message", message);
        }
        if let Some(ref source) = self.inner.source {
            f.field("source", source);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref message) = self.inner.message {
            write!(f, "{} error: {}", self.inner.kind, message)?;
        } else {
            write!(f, "{} error", self.inner.kind)?;
        }

        if let Some(ref source) = self.inner.source {
            write!(f, ": {source}")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .source
            .as_ref()
            .map(|e| &**e as &(dyn StdError + 'static))
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::new(ErrorKind::Config, Some(err))
    }
}

impl From<UsageError> for Error {
    fn from(err: UsageError) -> Self {
        Error::new(ErrorKind::Usage, Some(err))
    }
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        Error::new(ErrorKind::Codec, Some(err))
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::new(ErrorKind::Transport, Some(err))
    }
}

impl From<ChannelError> for Error {
    fn from(err: ChannelError) -> Self {
        Error::new(ErrorKind::Channel, Some(err))
    }
}

impl From<ExprError> for Error {
    fn from(err: ExprError) -> Self {
        Error::new(ErrorKind::Expr, Some(err))
    }
}

impl From<MachineError> for Error {
    fn from(err: MachineError) -> Self {
        Error::new(ErrorKind::Machine, Some(err))
    }
}

impl From<RuleError> for Error {
    fn from(err: RuleError) -> Self {
        Error::new(ErrorKind::Rule, Some(err))
    }
}

/// Fatal configuration problems detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not readable: {0}")]
    Unreadable(#[source] BoxError),
    #[error("config file is not valid JSON: {0}")]
    Malformed(#[source] BoxError),
    #[error("config scope not found: {0}")]
    ScopeNotFound(String),
    #[error("required config field missing: {0}")]
    MissingField(String),
    #[error("environment variable not set: {0}")]
    EnvNotSet(String),
    #[error("field is not runtime-mutable: {0}")]
    Immutable(String),
    #[error("{0}")]
    Invalid(String),
}

/// Command-line usage violations; these print the usage block and exit.
#[derive(Debug, Error)]
pub enum UsageError {
    #[error("unknown parameter: {0}")]
    UnknownParam(String),
    #[error("parameter --{0} expects a value")]
    MissingValue(String),
    #[error("required parameter missing: --{0}")]
    MissingRequired(String),
    #[error("missing required positional: {0}")]
    MissingPositional(String),
    #[error("unexpected extra positional: {0}")]
    ExtraPositional(String),
    #[error("parameters are mutually exclusive: {0}")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed line: {0}")]
    Line(String),
    #[error("binary decode failed: {0}")]
    Binary(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("broken pipe")]
    BrokenPipe,
    #[error("operation would block")]
    WouldBlock,
    #[error("no reader on fifo")]
    NoReader,
    #[error("open failed: {0}")]
    Open(#[source] BoxError),
    #[error("read failed: {0}")]
    Read(#[source] BoxError),
    #[error("write failed: {0}")]
    Write(#[source] BoxError),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid channel id: {0}")]
    InvalidId(String),
    #[error("invalid policy override: {0}")]
    InvalidOverride(String),
}

#[derive(Debug, Error)]
pub enum ExprError {
    #[error("parse error at {position}: {message}")]
    Parse { position: usize, message: String },
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("wrong argument count for {0}")]
    Arity(String),
    #[error("evaluation budget exceeded")]
    Budget,
}

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("unknown state: {0}")]
    UnknownState(String),
    #[error("instance has no states configured")]
    NoStates,
    #[error("bad transition in state {state}: {message}")]
    BadTransition { state: String, message: String },
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("unknown op: {0}")]
    UnknownOp(String),
    #[error("rule {rule}: bad inputs: {message}")]
    BadInputs { rule: String, message: String },
    #[error("rule {rule}: missing required input {input}")]
    MissingInput { rule: String, input: String },
    #[error("rule {rule}: {message}")]
    Eval { rule: String, message: String },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::BrokenPipe => Error::from(TransportError::BrokenPipe),
            std::io::ErrorKind::WouldBlock => Error::from(TransportError::WouldBlock),
            _ => Error::new(ErrorKind::Transport, Some(err)),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::from(CodecError::Line(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::from(UsageError::MissingRequired("interval-ms".to_string()));
        assert_eq!(
            err.to_string(),
            "usage error: required parameter missing: --interval-ms"
        );
    }

    #[test]
    fn test_error_kinds() {
        let err = Error::from(ConfigError::MissingField("gate.blocks".to_string()));
        assert!(err.is_config());
        assert!(!err.is_usage());

        let err = Error::from(UsageError::UnknownParam("--bogus".to_string()));
        assert!(err.is_usage());
        assert!(err.is_config());
    }

    #[test]
    fn test_transient_write_probe() {
        let err = Error::from(TransportError::NoReader);
        assert!(err.is_transient_write());

        let err = Error::from(TransportError::Open("nope".into()));
        assert!(!err.is_transient_write());

        let err = Error::from(CodecError::Encode("x".to_string()));
        assert!(!err.is_transient_write());
    }

    #[test]
    fn test_io_error_mapping() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone");
        let err = Error::from(io_err);
        assert!(err.is_transport());
        assert!(err.is_transient_write());
    }

    #[test]
    fn test_error_source_chain() {
        let err = Error::from(TransportError::Open("permission denied".into()));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("open failed"));
    }
}
