//! Error taxonomy for the Web API client
//!
//! Every failure that leaves the client is one of these variants. Transport
//! library errors are converted at the boundary and never leak out.

/// Errors raised by the schema engine, mapper, token provider and client
#[derive(Debug, Clone)]
pub enum Error {
    /// No HTTP response was obtained (connection, DNS or TLS failure)
    TransportFailure { message: String },
    /// Credentials were rejected or token acquisition itself failed
    AuthenticationFailed { message: String },
    /// The service answered with a non-success status
    ProtocolFailure {
        status: u16,
        code: Option<String>,
        message: String,
    },
    /// The schema has no entry for the requested entity type
    EntityNotSupported { entity: String },
    /// Conflicting or malformed arguments supplied by the caller
    InvalidArgument { message: String },
    /// A document (CSDL, FetchXML, JSON payload) could not be parsed
    ParseError { message: String },
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn transport(message: impl Into<String>) -> Self {
        Error::TransportFailure {
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Error::AuthenticationFailed {
            message: message.into(),
        }
    }

    pub fn entity_not_supported(entity: impl Into<String>) -> Self {
        Error::EntityNotSupported {
            entity: entity.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Error::ParseError {
            message: message.into(),
        }
    }

    /// HTTP status carried by a protocol failure
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::ProtocolFailure { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this is a protocol failure with status 404
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::TransportFailure { message } => write!(f, "Transport failure: {}", message),
            Error::AuthenticationFailed { message } => {
                write!(f, "Authentication failed: {}", message)
            }
            Error::ProtocolFailure {
                status,
                code: Some(code),
                message,
            } => write!(f, "Service returned {} ({}): {}", status, code, message),
            Error::ProtocolFailure {
                status, message, ..
            } => write!(f, "Service returned {}: {}", status, message),
            Error::EntityNotSupported { entity } => {
                write!(f, "Entity '{}' is not supported by the service schema", entity)
            }
            Error::InvalidArgument { message } => write!(f, "Invalid argument: {}", message),
            Error::ParseError { message } => write!(f, "Parse error: {}", message),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::parse(format!("Invalid JSON payload: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_failure_display() {
        let err = Error::ProtocolFailure {
            status: 400,
            code: Some("0x80040217".into()),
            message: "Record not found".into(),
        };
        assert_eq!(
            err.to_string(),
            "Service returned 400 (0x80040217): Record not found"
        );

        let err = Error::ProtocolFailure {
            status: 500,
            code: None,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "Service returned 500: boom");
    }

    #[test]
    fn test_is_not_found() {
        let err = Error::ProtocolFailure {
            status: 404,
            code: None,
            message: String::new(),
        };
        assert!(err.is_not_found());
        assert!(!Error::entity_not_supported("account").is_not_found());
    }
}
