//! Error types for the distribution engine

use thiserror::Error;

use super::message::ValidationErrors;

/// Terminal problems with the stored distribution configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Distribution Event queue={queue} eventType={event_type} does not have a default distribution rule defined!")]
    MissingDefaultRule { queue: String, event_type: String },

    #[error("Distribution Event queue={queue} eventType={event_type} not found")]
    EventNotFound { queue: String, event_type: String },

    #[error("Invalid Argument: unsupported delivery method '{0}'")]
    UnsupportedChannel(String),

    #[error("Invalid distribution rule: {0}")]
    InvalidRule(String),
}

/// Everything that can stop a message from being distributed
#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Transient failure: {0}")]
    Transient(String),
}

impl DistributionError {
    /// Retryable errors leave the message in place for redelivery
    pub fn is_retryable(&self) -> bool {
        matches!(self, DistributionError::Transient(_))
    }
}

pub type DistributionResult<T> = Result<T, DistributionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_default_rule_names_queue_and_event() {
        let err = ConfigurationError::MissingDefaultRule {
            queue: "distribution".to_string(),
            event_type: "invoice.paid".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Distribution Event queue=distribution eventType=invoice.paid does not have a default distribution rule defined!"
        );
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(DistributionError::Transient("timeout".to_string()).is_retryable());
        assert!(!DistributionError::from(ConfigurationError::UnsupportedChannel(
            "fax".to_string()
        ))
        .is_retryable());
    }
}
