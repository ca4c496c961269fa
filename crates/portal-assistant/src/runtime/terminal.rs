//! Line-oriented terminal input shared by the shell loop and prompts.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use crate::infra::prompt::{PromptFuture, Prompter};

/// Stdin line reader shared between the shell loop and [`TerminalPrompter`].
pub type SharedLines = Arc<Mutex<Lines<BufReader<Stdin>>>>;

/// Returns a line reader over process stdin.
pub fn stdin_lines() -> SharedLines {
    Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()))
}

/// Prints `label` and reads one answer line.
///
/// Returns `None` on end of input or terminal errors.
pub(crate) async fn read_answer(lines: &SharedLines, label: &str) -> Option<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await.ok()?;
    stdout.flush().await.ok()?;

    lines.lock().await.next_line().await.ok().flatten()
}

/// [`Prompter`] asking questions on the terminal.
pub struct TerminalPrompter {
    lines: SharedLines,
}

impl TerminalPrompter {
    pub fn new(lines: SharedLines) -> Self {
        Self { lines }
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(
        &self,
        message: String,
        confirm_label: String,
        decline_label: String,
    ) -> PromptFuture<bool> {
        let lines = Arc::clone(&self.lines);

        Box::pin(async move {
            let label = format!("{message} [{confirm_label}/{decline_label}] ");

            read_answer(&lines, &label)
                .await
                .is_some_and(|answer| is_confirmation(&answer, &confirm_label))
        })
    }

    fn input(&self, prompt: String, initial: String) -> PromptFuture<Option<String>> {
        let lines = Arc::clone(&self.lines);

        Box::pin(async move {
            let label = if initial.is_empty() {
                format!("{prompt}: ")
            } else {
                format!("{prompt} [{initial}]: ")
            };
            let answer = read_answer(&lines, &label).await?;

            resolve_input(&answer, initial)
        })
    }
}

/// Accepts the full confirm label or its first letter, ignoring case.
fn is_confirmation(answer: &str, confirm_label: &str) -> bool {
    let answer = answer.trim();
    if answer.eq_ignore_ascii_case(confirm_label) {
        return true;
    }

    let mut answer_chars = answer.chars();
    match (answer_chars.next(), answer_chars.next(), confirm_label.chars().next()) {
        (Some(answer), None, Some(label)) => answer.eq_ignore_ascii_case(&label),
        _ => false,
    }
}

/// Falls back to `initial` for blank answers; blank without a default means
/// cancel.
fn resolve_input(answer: &str, initial: String) -> Option<String> {
    let answer = answer.trim();
    if answer.is_empty() {
        return (!initial.is_empty()).then_some(initial);
    }

    Some(answer.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_confirmation_accepts_label_or_initial() {
        // Arrange
        let answers = ["Yes", "yes", " y ", "n", "Not Yet", "", "yep"];

        // Act
        let confirmed = answers.map(|answer| is_confirmation(answer, "Yes"));

        // Assert
        assert_eq!(confirmed, [true, true, true, false, false, false, false]);
    }

    #[test]
    fn test_resolve_input_uses_default_for_blank_answer() {
        // Arrange
        let initial = "Web Map".to_string();

        // Act
        let defaulted = resolve_input("  ", initial.clone());
        let typed = resolve_input(" Dashboard ", initial);
        let cancelled = resolve_input("", String::new());

        // Assert
        assert_eq!(defaulted.as_deref(), Some("Web Map"));
        assert_eq!(typed.as_deref(), Some("Dashboard"));
        assert_eq!(cancelled, None);
    }
}
