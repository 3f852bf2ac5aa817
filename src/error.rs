// Typed errors with thiserror. Each kind renders a short one-line reason for the host UI.

use std::path::PathBuf;

use thiserror::Error;

use crate::http::Problem;

/// Failures of the coordinate algebra.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformError {
    #[error("invalid rotation: quaternion has zero or non-finite norm")]
    InvalidRotation,

    #[error("singular transform: matrix is not invertible or carries shear")]
    SingularTransform,
}

/// Failures of a single request/response exchange with the mod.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("mod API unreachable: {0}")]
    Unreachable(String),

    #[error("HTTP {status}{}", problem_suffix(.problem))]
    Http {
        status: u16,
        problem: Option<Problem>,
    },

    #[error("malformed JSON: {0}")]
    Decode(String),

    #[error("unexpected response shape: {0}")]
    Schema(String),

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}

impl TransportError {
    /// HTTP status, if the mod answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn problem(&self) -> Option<&Problem> {
        match self {
            TransportError::Http { problem, .. } => problem.as_ref(),
            _ => None,
        }
    }
}

fn problem_suffix(problem: &Option<Problem>) -> String {
    match problem {
        Some(p) => match (&p.title, &p.detail) {
            (_, Some(detail)) => format!(" ({}: {})", p.kind, detail),
            (Some(title), None) => format!(" ({}: {})", p.kind, title),
            (None, None) => format!(" ({})", p.kind),
        },
        None => String::new(),
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() {
            TransportError::Schema(err.to_string())
        } else {
            TransportError::Decode(err.to_string())
        }
    }
}

/// Failures while reading recorder output back into the host.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("cannot open {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid transform recording {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("host import failed: {0}")]
    Host(String),
}

/// Terminal reasons of a recording run and of the standalone operations.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("cannot record: {0}")]
    PreconditionViolated(String),

    #[error("scene rejected by the mod: {0}")]
    SceneRejected(#[source] TransportError),

    #[error("recorder failed to start: {0}")]
    RecorderStartFailed(#[source] TransportError),

    #[error("recording incomplete: {recorded} of {expected} frames")]
    IncompleteRecording { recorded: u32, expected: u32 },

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("mod request failed: {0}")]
    Api(#[from] TransportError),

    #[error("cancelled")]
    Cancelled,
}

/// A second task was invoked while the driver was still running one.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("another task is already running")]
pub struct DriverBusy;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_display_carries_problem() {
        let err = TransportError::Http {
            status: 400,
            problem: Some(Problem {
                kind: "bad-origin".to_string(),
                title: None,
                detail: None,
            }),
        };
        assert_eq!(err.to_string(), "HTTP 400 (bad-origin)");
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn json_errors_are_classified() {
        let malformed = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(
            TransportError::from(malformed),
            TransportError::Decode(_)
        ));

        let wrong_shape = serde_json::from_str::<Vec<u32>>(r#"{"a":1}"#).unwrap_err();
        assert!(matches!(
            TransportError::from(wrong_shape),
            TransportError::Schema(_)
        ));
    }

    #[test]
    fn record_error_is_one_line() {
        let err = RecordError::SceneRejected(TransportError::Http {
            status: 400,
            problem: None,
        });
        assert!(!err.to_string().contains('\n'));
        assert!(err.to_string().contains("400"));
    }
}
