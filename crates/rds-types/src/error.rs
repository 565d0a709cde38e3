use thiserror::Error;

/// Failures raised by an underlying network client.
///
/// These are passed through to callers unchanged. The only status that the
/// adapters ever reinterpret is Swarm's `500` on a listing or tar download,
/// which means "this hash is not a manifest".
#[derive(Debug, Error)]
pub enum ClientError {
    /// The node answered with a non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The requested content does not exist on the node.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request could not be delivered (connection, timeout, TLS...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with a body that could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),

    /// A tar archive exchanged with the node was malformed.
    #[error("archive error: {0}")]
    Archive(String),

    /// I/O error while reading or writing a stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// HTTP status code, if this error came from an HTTP response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` for an HTTP 500 answer.
    pub fn is_internal_server_error(&self) -> bool {
        self.status() == Some(500)
    }
}

/// Result alias for network client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors returned by providers and the manager.
///
/// Every variant maps to a stable [`code`](RdsError::code) so callers can
/// branch on the error class without matching on messages.
#[derive(Debug, Error)]
pub enum RdsError {
    /// The payload does not even have an accepted gross shape.
    #[error("type error: {0}")]
    Type(String),

    /// The payload has the right shape but violates a content rule.
    #[error("value error: {0}")]
    Value(String),

    /// The operation references a backend that was never registered.
    #[error("provider error: {0}")]
    Provider(String),

    /// Error raised by the underlying network client.
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl RdsError {
    pub const TYPE_CODE: &'static str = "RDS_TYPE_ERR";
    pub const VALUE_CODE: &'static str = "RDS_VALUE_ERR";
    pub const PROVIDER_CODE: &'static str = "RDS_PROVIDER_ERR";
    pub const CLIENT_CODE: &'static str = "RDS_CLIENT_ERR";

    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::Type(msg.into())
    }

    pub fn value(msg: impl Into<String>) -> Self {
        Self::Value(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Stable machine-readable code for this error class.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Type(_) => Self::TYPE_CODE,
            Self::Value(_) => Self::VALUE_CODE,
            Self::Provider(_) => Self::PROVIDER_CODE,
            Self::Client(_) => Self::CLIENT_CODE,
        }
    }

    pub fn is_type(&self) -> bool {
        matches!(self, Self::Type(_))
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    pub fn is_provider(&self) -> bool {
        matches!(self, Self::Provider(_))
    }
}

impl From<std::io::Error> for RdsError {
    fn from(err: std::io::Error) -> Self {
        Self::Client(ClientError::Io(err))
    }
}

/// Result alias for provider and manager operations.
pub type RdsResult<T> = Result<T, RdsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(RdsError::type_error("x").code(), "RDS_TYPE_ERR");
        assert_eq!(RdsError::value("x").code(), "RDS_VALUE_ERR");
        assert_eq!(RdsError::provider("x").code(), "RDS_PROVIDER_ERR");
        let client = RdsError::from(ClientError::NotFound("abc".into()));
        assert_eq!(client.code(), "RDS_CLIENT_ERR");
    }

    #[test]
    fn client_error_passes_through_display() {
        let err = RdsError::from(ClientError::Http {
            status: 404,
            message: "nope".into(),
        });
        assert_eq!(err.to_string(), "HTTP 404: nope");
    }

    #[test]
    fn internal_server_error_detection() {
        let err = ClientError::Http {
            status: 500,
            message: "not a manifest".into(),
        };
        assert!(err.is_internal_server_error());
        assert!(!ClientError::NotFound("x".into()).is_internal_server_error());
        assert_eq!(ClientError::Transport("x".into()).status(), None);
    }

    #[test]
    fn value_message_is_preserved() {
        let err = RdsError::value("Missing \"size\" that is required for Readable streams");
        assert!(err.is_value());
        assert!(err.to_string().contains("size"));
    }
}
