use crossterm::style::Stylize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// A spinner on stderr while values resolve. Invisible when stderr is not a
/// terminal or when disabled.
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    pub fn new(message: impl Into<String>, enabled: bool) -> Self {
        let bar = ProgressBar::new_spinner();
        if enabled {
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.dim} {msg}") {
                bar.set_style(style);
            }
            bar.enable_steady_tick(std::time::Duration::from_millis(80));
        } else {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_message(message.into());
        Self { bar }
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.bar.set_message(message.into());
    }

    /// Clear the spinner and print a `✔ message` line when it was visible.
    pub fn finish(self, message: impl Into<String>) {
        let visible = !self.bar.is_hidden();
        self.bar.finish_and_clear();
        if visible {
            eprintln!("{} {}", "✔".green(), message.into());
        }
    }

    pub fn abandon(self) {
        self.bar.finish_and_clear();
    }
}
