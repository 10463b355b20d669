use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Receives `completed / total` after every dispatched query.
pub trait ProgressSink: Send + Sync {
    fn report(&self, completed: usize, total: usize);
}

/// Discards progress.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _completed: usize, _total: usize) {}
}

/// Terminal progress bar on stderr; hidden when stderr is not a terminal.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new(0);
        if std::io::stderr().is_terminal() {
            let style = ProgressStyle::default_bar()
                .template("{msg} [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█ ");
            bar.set_style(style);
        } else {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_message(message.to_string());
        Self { bar }
    }
}

impl ProgressSink for BarProgress {
    fn report(&self, completed: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(completed as u64);
        if completed >= total {
            self.bar.finish();
        }
    }
}
