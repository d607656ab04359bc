//! Error types for keyview.

use alloc::string::String;
use core::fmt;

/// Result type alias for keyview operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised by reducers, their adapters and derived views.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A malformed argument (filter weight, derived options, kind definition).
    InvalidArgument {
        component: &'static str,
        message: String,
    },
    /// The target has been destroyed and no longer accepts operations.
    Destroyed {
        component: &'static str,
    },
    /// A reactive source broke the subscribe / unsubscribe contract.
    ContractViolation {
        component: &'static str,
        message: String,
    },
    /// An index update was requested while the same index was updating.
    ReentrantUpdate,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument { component, message } => {
                write!(f, "{} error: {}", component, message)
            }
            Error::Destroyed { component } => {
                write!(f, "{} error: this instance has been destroyed", component)
            }
            Error::ContractViolation { component, message } => {
                write!(f, "{} contract violation: {}", component, message)
            }
            Error::ReentrantUpdate => {
                write!(f, "index update requested while the index is already updating")
            }
        }
    }
}

impl Error {
    /// Creates an invalid argument error.
    pub fn invalid_argument(component: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            component,
            message: message.into(),
        }
    }

    /// Creates a destroyed error.
    pub fn destroyed(component: &'static str) -> Self {
        Error::Destroyed { component }
    }

    /// Creates a contract violation error.
    pub fn contract_violation(component: &'static str, message: impl Into<String>) -> Self {
        Error::ContractViolation {
            component,
            message: message.into(),
        }
    }

    /// Creates a re-entrant update error.
    pub fn reentrant_update() -> Self {
        Error::ReentrantUpdate
    }

    /// Returns true if this is a `Destroyed` error.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        matches!(self, Error::Destroyed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_argument("AdapterFilters", "'weight' is not between 0 and 1");
        assert!(err.to_string().contains("AdapterFilters"));
        assert!(err.to_string().contains("weight"));

        let err = Error::destroyed("MapReducer");
        assert!(err.to_string().contains("destroyed"));

        let err = Error::reentrant_update();
        assert!(err.to_string().contains("already updating"));
    }

    #[test]
    fn test_error_constructors() {
        let err = Error::contract_violation("AdapterSort", "no unsubscribe returned");
        match err {
            Error::ContractViolation { component, .. } => assert_eq!(component, "AdapterSort"),
            _ => panic!("Wrong error type"),
        }
        assert!(Error::destroyed("AdapterDerived").is_destroyed());
        assert!(!Error::reentrant_update().is_destroyed());
    }
}
