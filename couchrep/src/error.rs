use std::error;
use std::fmt;

/// Convenient result type for replication operations using [`RepError`] as the error type.
pub type RepResult<T> = Result<T, RepError>;

/// Main error type for replication operations.
///
/// [`RepError`] can represent a single error, an error with additional detail, or multiple
/// aggregated errors, which is how the worker pool reports the failures of several workers at
/// once.
#[derive(Debug, Clone)]
pub struct RepError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Error with kind and static description
    WithDescription(ErrorKind, &'static str),
    /// Error with kind, static description, and dynamic detail
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
    /// Multiple aggregated errors
    Many(Vec<RepError>),
}

/// Specific categories of errors that can occur during replication.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    // Target Peer Errors
    TargetConnectionFailed,
    TargetRequestFailed,
    TargetProtocolViolation,

    // Queue Errors
    QueueClosed,
    ProgressSinkClosed,

    // Data & Serialization Errors
    InvalidData,
    SerializationError,
    DeserializationError,
    IoError,

    // Configuration Errors
    ConfigError,

    // Worker Errors
    WorkerPanic,
    WorkerCancelled,

    // Unknown / Uncategorized
    Unknown,
}

impl RepError {
    /// Creates a [`RepError`] containing multiple aggregated errors.
    pub fn many(errors: Vec<RepError>) -> RepError {
        RepError {
            repr: ErrorRepr::Many(errors),
        }
    }

    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
            ErrorRepr::Many(ref errors) => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error, flattening aggregated errors.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => vec![kind],
            ErrorRepr::Many(ref errors) => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// For multiple errors, returns the detail of the first error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail) => Some(detail.as_str()),
            ErrorRepr::Many(ref errors) => errors.iter().find_map(|e| e.detail()),
            _ => None,
        }
    }

    /// Returns whether the operation that produced this error may succeed if attempted again.
    ///
    /// Only transient failures talking to the target peer are retryable. Protocol violations
    /// are not, since the peer would answer the same request the same way.
    pub fn is_retryable(&self) -> bool {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => matches!(
                kind,
                ErrorKind::TargetConnectionFailed | ErrorKind::TargetRequestFailed
            ),
            ErrorRepr::Many(ref errors) => {
                !errors.is_empty() && errors.iter().all(|err| err.is_retryable())
            }
        }
    }
}

impl PartialEq for RepError {
    fn eq(&self, other: &RepError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::WithDescription(kind_a, _), ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (ErrorRepr::Many(errors_a), ErrorRepr::Many(errors_b)) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for RepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;

                Ok(())
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                desc.fmt(f)?;
                f.write_str(" -> ")?;
                detail.fmt(f)?;

                Ok(())
            }
            ErrorRepr::Many(ref errors) => {
                if errors.is_empty() {
                    write!(f, "Multiple errors occurred (empty)")?;
                } else if errors.len() == 1 {
                    errors[0].fmt(f)?;
                } else {
                    write!(f, "Multiple errors occurred ({} total):", errors.len())?;
                    for (i, error) in errors.iter().enumerate() {
                        write!(f, "\n  {}: {}", i + 1, error)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl error::Error for RepError {}

/// Creates a [`RepError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for RepError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> RepError {
        RepError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

/// Creates a [`RepError`] from an error kind, static description, and dynamic detail.
impl From<(ErrorKind, &'static str, String)> for RepError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> RepError {
        RepError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

/// Creates a [`RepError`] from a vector of errors for aggregation.
impl<E> From<Vec<E>> for RepError
where
    E: Into<RepError>,
{
    fn from(errors: Vec<E>) -> RepError {
        RepError {
            repr: ErrorRepr::Many(errors.into_iter().map(Into::into).collect()),
        }
    }
}

/// Converts [`std::io::Error`] to [`RepError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for RepError {
    fn from(err: std::io::Error) -> RepError {
        RepError {
            repr: ErrorRepr::WithDescriptionAndDetail(
                ErrorKind::IoError,
                "I/O error occurred",
                err.to_string(),
            ),
        }
    }
}

/// Converts [`serde_json::Error`] to [`RepError`].
///
/// Maps to [`ErrorKind::SerializationError`] for I/O failures and
/// [`ErrorKind::DeserializationError`] for malformed payloads.
impl From<serde_json::Error> for RepError {
    fn from(err: serde_json::Error) -> RepError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => {
                (ErrorKind::SerializationError, "JSON I/O operation failed")
            }
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        RepError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, description, err.to_string()),
        }
    }
}

/// Converts a [`tokio::task::JoinError`] of a worker task into a [`RepError`].
impl From<tokio::task::JoinError> for RepError {
    fn from(err: tokio::task::JoinError) -> RepError {
        let (kind, description) = if err.is_panic() {
            (ErrorKind::WorkerPanic, "A replication worker panicked")
        } else {
            (ErrorKind::WorkerCancelled, "A replication worker was cancelled")
        };

        RepError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, description, err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bail, rep_error};

    #[test]
    fn test_from_vector() {
        let errors = vec![
            RepError::from((ErrorKind::TargetRequestFailed, "Error 1")),
            RepError::from((ErrorKind::TargetProtocolViolation, "Error 2")),
        ];
        let multi_err = RepError::from(errors);
        assert_eq!(
            multi_err.kinds(),
            vec![
                ErrorKind::TargetRequestFailed,
                ErrorKind::TargetProtocolViolation
            ]
        );
    }

    #[test]
    fn test_empty_multiple_errors() {
        let multi_err = RepError::many(vec![]);
        assert_eq!(multi_err.kind(), ErrorKind::Unknown);
        assert_eq!(multi_err.kinds(), vec![]);
        assert_eq!(multi_err.detail(), None);
        assert!(!multi_err.is_retryable());
    }

    #[test]
    fn test_error_equality() {
        let err1 = RepError::from((ErrorKind::TargetConnectionFailed, "Connection refused"));
        let err2 = RepError::from((ErrorKind::TargetConnectionFailed, "Connection reset"));
        let err3 = RepError::from((ErrorKind::TargetProtocolViolation, "Unexpected doc"));

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }

    #[test]
    fn test_error_display_with_detail() {
        let err = RepError::from((
            ErrorKind::TargetProtocolViolation,
            "Unexpected document in revision diff",
            "doc-42".to_string(),
        ));
        let display_str = format!("{err}");
        assert!(display_str.contains("TargetProtocolViolation"));
        assert!(display_str.contains("Unexpected document in revision diff"));
        assert!(display_str.contains("doc-42"));
    }

    #[test]
    fn test_multiple_errors_display() {
        let errors = vec![
            RepError::from((ErrorKind::TargetRequestFailed, "Timed out")),
            RepError::from((ErrorKind::WorkerPanic, "Panicked")),
        ];
        let multi_err = RepError::many(errors);
        let display_str = format!("{multi_err}");
        assert!(display_str.contains("Multiple errors"));
        assert!(display_str.contains("2 total"));
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(rep_error!(ErrorKind::TargetConnectionFailed, "Connection refused").is_retryable());
        assert!(rep_error!(ErrorKind::TargetRequestFailed, "Timed out", "after 30s").is_retryable());
        assert!(!rep_error!(ErrorKind::TargetProtocolViolation, "Bad response").is_retryable());
        assert!(!rep_error!(ErrorKind::ProgressSinkClosed, "Closed").is_retryable());

        let mixed = RepError::many(vec![
            rep_error!(ErrorKind::TargetRequestFailed, "Timed out"),
            rep_error!(ErrorKind::TargetProtocolViolation, "Bad response"),
        ]);
        assert!(!mixed.is_retryable());
    }

    #[test]
    fn test_bail_macro() {
        fn test_function() -> RepResult<i32> {
            bail!(
                ErrorKind::TargetProtocolViolation,
                "Test error",
                "Additional detail"
            );
        }

        let err = test_function().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TargetProtocolViolation);
        assert!(err.detail().unwrap().contains("Additional detail"));
    }

    #[test]
    fn test_json_error_classification() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let rep_err = RepError::from(json_err);
        assert_eq!(rep_err.kind(), ErrorKind::DeserializationError);
        assert!(rep_err.detail().unwrap().contains("expected"));
    }

    #[tokio::test]
    async fn test_join_error_of_panicked_task() {
        let handle: tokio::task::JoinHandle<()> = tokio::spawn(async { panic!("worker exploded") });
        let err = RepError::from(handle.await.unwrap_err());

        assert_eq!(err.kind(), ErrorKind::WorkerPanic);
    }
}
