//! User interaction boundary supplied by the host.

use std::future::Future;
use std::pin::Pin;

/// Boxed async result used by [`Prompter`] trait methods.
pub type PromptFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Interactive questions the host asks the user on behalf of the app.
#[cfg_attr(test, mockall::automock)]
pub trait Prompter: Send + Sync {
    /// Asks a yes/no question and resolves to `true` only when the user picks
    /// `confirm_label`.
    fn confirm(
        &self,
        message: String,
        confirm_label: String,
        decline_label: String,
    ) -> PromptFuture<bool>;

    /// Asks for one line of text, pre-filled with `initial`.
    ///
    /// Resolves to `None` when the user cancels.
    fn input(&self, prompt: String, initial: String) -> PromptFuture<Option<String>>;
}
