use thiserror::Error;

/// Core error type for ORC operations
#[derive(Error, Debug)]
pub enum OrcError {
    /// IO errors from the underlying stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow errors raised while converting batches
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    /// Serialization errors from the storage engine
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Date and timestamp arithmetic errors
    #[error("Temporal error: {0}")]
    Temporal(#[from] jiff::Error),

    /// Malformed configuration or a value outside the accepted domain
    #[error("Value error: {0}")]
    Value(String),

    /// A value whose shape or scalar type does not match the schema
    #[error("Type error: {0}")]
    Type(String),

    /// Column id not found in the type tree or file
    #[error("Index error: {0}")]
    Index(String),

    /// Corrupt or truncated file contents
    #[error("Parse error: {0}")]
    Parse(String),

    /// Operation on a writer that has already been closed
    #[error("Writer has been closed")]
    Closed,

    /// Unsupported operation errors
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Internal errors that shouldn't happen
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for ORC operations
pub type Result<T> = std::result::Result<T, OrcError>;

impl OrcError {
    /// Create a new value error
    pub fn value<S: Into<String>>(msg: S) -> Self {
        OrcError::Value(msg.into())
    }

    /// Create a new type error
    pub fn type_error<S: Into<String>>(msg: S) -> Self {
        OrcError::Type(msg.into())
    }

    /// Create a new index error
    pub fn index<S: Into<String>>(msg: S) -> Self {
        OrcError::Index(msg.into())
    }

    /// Create a new parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        OrcError::Parse(msg.into())
    }

    /// Create a new unsupported operation error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        OrcError::Unsupported(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        OrcError::Internal(msg.into())
    }

    /// Whether this error means "the value does not fit this type".
    ///
    /// Union encoding only falls through to the next child on these.
    pub fn is_conversion(&self) -> bool {
        matches!(
            self,
            OrcError::Type(_) | OrcError::Value(_) | OrcError::Temporal(_)
        )
    }
}

/// Extension trait to add context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context<S: Into<String>>(self, ctx: S) -> Result<T>;

    /// Add context with a closure that's only called on error
    fn with_context<S: Into<String>, F: FnOnce() -> S>(self, f: F) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<OrcError>,
{
    fn context<S: Into<String>>(self, ctx: S) -> Result<T> {
        self.map_err(|e| prefix(e.into(), ctx.into()))
    }

    fn with_context<S: Into<String>, F: FnOnce() -> S>(self, f: F) -> Result<T> {
        self.map_err(|e| prefix(e.into(), f().into()))
    }
}

/// Prefixes the message. The error class is kept for the message-carrying variants.
fn prefix(err: OrcError, ctx: String) -> OrcError {
    match err {
        OrcError::Value(msg) => OrcError::Value(format!("{}: {}", ctx, msg)),
        OrcError::Type(msg) => OrcError::Type(format!("{}: {}", ctx, msg)),
        OrcError::Index(msg) => OrcError::Index(format!("{}: {}", ctx, msg)),
        OrcError::Parse(msg) => OrcError::Parse(format!("{}: {}", ctx, msg)),
        OrcError::Unsupported(msg) => OrcError::Unsupported(format!("{}: {}", ctx, msg)),
        OrcError::Temporal(e) => OrcError::Value(format!("{}: {}", ctx, e)),
        OrcError::Closed => OrcError::Closed,
        other => OrcError::Internal(format!("{}: {}", ctx, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = OrcError::value("both selectors set");
        assert_eq!(err.to_string(), "Value error: both selectors set");

        let err = OrcError::type_error("expected int");
        assert_eq!(err.to_string(), "Type error: expected int");

        assert_eq!(OrcError::Closed.to_string(), "Writer has been closed");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: OrcError = io_err.into();
        assert!(err.to_string().contains("IO error"));
        assert!(!err.is_conversion());
    }

    #[test]
    fn test_conversion_classification() {
        assert!(OrcError::type_error("x").is_conversion());
        assert!(OrcError::value("x").is_conversion());
        assert!(!OrcError::index("x").is_conversion());
        assert!(!OrcError::parse("x").is_conversion());
        assert!(!OrcError::Closed.is_conversion());
    }

    #[test]
    fn test_error_context_keeps_class() {
        fn failing_operation() -> Result<()> {
            Err(OrcError::type_error("bad input"))
        }

        let err = failing_operation().context("field 'a'").unwrap_err();
        assert!(matches!(err, OrcError::Type(_)));
        assert!(err.to_string().contains("field 'a': bad input"));
    }

    #[test]
    fn test_error_with_context() {
        fn failing_operation() -> Result<()> {
            Err(OrcError::parse("bad magic"))
        }

        let path = "test.orc";
        let err = failing_operation()
            .with_context(|| format!("Opening file: {}", path))
            .unwrap_err();
        assert!(matches!(err, OrcError::Parse(_)));
        assert!(err.to_string().contains("Opening file: test.orc"));
    }
}
