//! Infrastructure adapters for the portal REST API, sign-in, clipboard,
//! prompts and persisted settings.

/// Sign-in strategies producing portal credentials.
pub mod auth;
pub mod clipboard;
/// Raw portal REST boundary and its `reqwest` implementation.
pub mod portal;
pub mod prompt;
pub mod settings;
