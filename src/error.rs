use crate::domain::booking::BookingStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Authentication required")]
    AuthenticationError,
    #[error("Not authorized: {0}")]
    AuthorizationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("{entity} not found: {id}")]
    NotFoundError { entity: &'static str, id: String },
    #[error("Booking {id} is {actual}, expected {expected}")]
    StaleStateError {
        id: String,
        actual: BookingStatus,
        expected: String,
    },
    #[error("Payment verification failed: {0}")]
    PaymentVerificationError(String),
    #[error("Malformed booking metadata: {0}")]
    MalformedMetadataError(String),
    #[error("Scheduling conflict: {0}")]
    SchedulingConflictError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(Box<figment::Error>),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl From<figment::Error> for BookingError {
    fn from(err: figment::Error) -> Self {
        Self::ConfigError(Box::new(err))
    }
}

impl From<serde_json::Error> for BookingError {
    fn from(err: serde_json::Error) -> Self {
        Self::InternalError(Box::new(err))
    }
}

impl BookingError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFoundError {
            entity,
            id: id.to_string(),
        }
    }

    /// Message safe to hand back to a caller.
    ///
    /// Domain failures describe themselves; plumbing failures are reduced to a
    /// generic message and logged in full here.
    pub fn public_message(&self) -> String {
        match self {
            Self::AuthenticationError
            | Self::AuthorizationError(_)
            | Self::ValidationError(_)
            | Self::NotFoundError { .. }
            | Self::StaleStateError { .. }
            | Self::PaymentVerificationError(_)
            | Self::MalformedMetadataError(_)
            | Self::SchedulingConflictError(_) => self.to_string(),
            _ => {
                tracing::error!(error = %self, "internal failure");
                "Something went wrong, please try again later".to_string()
            }
        }
    }
}

/// Failures reported by a payment gateway adapter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    #[error("gateway rejected request: {0}")]
    Rejected(String),
    #[error("unknown payment reference: {0}")]
    UnknownReference(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, BookingError>;
