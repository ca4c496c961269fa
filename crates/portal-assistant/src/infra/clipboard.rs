//! System clipboard access used by copy and paste commands.

/// Clipboard failure with the platform message.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("Clipboard unavailable: {0}")]
pub struct ClipboardError(pub String);

/// Text clipboard boundary.
#[cfg_attr(test, mockall::automock)]
pub trait Clipboard: Send + Sync {
    /// Replaces the clipboard text.
    ///
    /// # Errors
    /// Returns an error when the platform clipboard cannot be opened.
    fn set_text(&self, text: String) -> Result<(), ClipboardError>;

    /// Returns the current clipboard text.
    ///
    /// # Errors
    /// Returns an error when the platform clipboard cannot be opened or holds
    /// no text.
    fn get_text(&self) -> Result<String, ClipboardError>;
}

/// Platform clipboard backed by `arboard`.
///
/// A fresh handle is opened per call so the struct stays `Sync`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn set_text(&self, text: String) -> Result<(), ClipboardError> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|error| ClipboardError(error.to_string()))?;

        clipboard
            .set_text(text)
            .map_err(|error| ClipboardError(error.to_string()))
    }

    fn get_text(&self) -> Result<String, ClipboardError> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|error| ClipboardError(error.to_string()))?;

        clipboard
            .get_text()
            .map_err(|error| ClipboardError(error.to_string()))
    }
}
