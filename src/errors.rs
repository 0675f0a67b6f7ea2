use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CapacityError {
    #[error("malformed channel identifier: {0}")]
    MalformedIdentifier(String),
    #[error("identifier component out of range: {0}")]
    OutOfRange(String),
    #[error("capacity resolution failed: {0}")]
    ResolutionFailed(String),
    #[error("malformed resolver response: {0}")]
    MalformedResponse(String),
    #[error("unsupported graph format: {0}")]
    UnsupportedFormat(String),
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("io error: {0}")]
    IoError(String),
    #[error("capacity store not found: {0}")]
    MissingStore(String),
    #[error("no capacity recorded for channel {0}")]
    UnresolvedIdentifier(String),
    #[error("destination already populated: {0}")]
    DestinationPopulated(String),
}

impl CapacityError {
    pub fn malformed_identifier<T: Into<String>>(msg: T) -> Self {
        CapacityError::MalformedIdentifier(msg.into())
    }

    pub fn out_of_range<T: Into<String>>(msg: T) -> Self {
        CapacityError::OutOfRange(msg.into())
    }

    pub fn resolution_failed<T: Into<String>>(msg: T) -> Self {
        CapacityError::ResolutionFailed(msg.into())
    }

    pub fn malformed_response<T: Into<String>>(msg: T) -> Self {
        CapacityError::MalformedResponse(msg.into())
    }

    pub fn unsupported_format<T: Into<String>>(msg: T) -> Self {
        CapacityError::UnsupportedFormat(msg.into())
    }

    pub fn parse<T: Into<String>>(msg: T) -> Self {
        CapacityError::ParseError(msg.into())
    }

    pub fn io<T: Into<String>>(msg: T) -> Self {
        CapacityError::IoError(msg.into())
    }

    pub fn missing_store<T: Into<String>>(msg: T) -> Self {
        CapacityError::MissingStore(msg.into())
    }

    pub fn unresolved<T: Into<String>>(msg: T) -> Self {
        CapacityError::UnresolvedIdentifier(msg.into())
    }

    pub fn populated<T: Into<String>>(msg: T) -> Self {
        CapacityError::DestinationPopulated(msg.into())
    }
}
