//! Transient feedback text produced by control actions.

use std::fmt;

/// Tone of a feedback message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    /// Request sent, no outcome yet.
    Pending,
    /// Server accepted the request.
    Success,
    /// Rejection, unexpected status, or no response.
    Error,
}

/// One line of control feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    /// Tone.
    pub kind: FeedbackKind,
    /// Text shown to the user.
    pub text: String,
}

impl Feedback {
    /// Pending message.
    pub fn pending(text: impl Into<String>) -> Self {
        Self {
            kind: FeedbackKind::Pending,
            text: text.into(),
        }
    }

    /// Success message.
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: FeedbackKind::Success,
            text: text.into(),
        }
    }

    /// Error message.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: FeedbackKind::Error,
            text: text.into(),
        }
    }

    /// Whether this is an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.kind == FeedbackKind::Error
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Text used when a request got no response at all.
pub const NETWORK_ERROR_TEXT: &str = "Network error";

/// Generic text for an unexpected status.
pub(crate) fn status_error(status: u16) -> Feedback {
    Feedback::error(format!("Error {status}"))
}
