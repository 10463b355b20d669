use dialoguer::Confirm;
use dialoguer::theme::ColorfulTheme;

/// Yes/no decision point, usually backed by the user.
pub trait ConfirmGate: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Asks on the terminal. Anything but an explicit answer counts as "no".
pub struct TerminalConfirm {
    default: bool,
}

impl TerminalConfirm {
    pub fn new(default: bool) -> Self {
        Self { default }
    }
}

impl ConfirmGate for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(self.default)
            .interact()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "could not read an answer, assuming no");
                false
            })
    }
}

/// Always gives the same answer; for flags like `--yes-overflow`.
pub struct FixedAnswer(pub bool);

impl ConfirmGate for FixedAnswer {
    fn confirm(&self, prompt: &str) -> bool {
        tracing::debug!(prompt, answer = self.0, "answered without asking");
        self.0
    }
}
