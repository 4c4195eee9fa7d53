//! Stream error type.

/// An error delivered through an event stream.
///
/// Stream errors travel the same channel as data and are terminal for
/// the stream that carries them: after an error, no further values are
/// delivered on that view. They are cloneable so one failure can fan out
/// to every subscriber.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct StreamError {
    message: String,
}

impl StreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Wraps any error into a stream error, keeping its display text.
    pub fn from_error(error: &dyn std::error::Error) -> Self {
        Self::new(error.to_string())
    }
}
