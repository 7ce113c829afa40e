use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

/// Emit a progress line every this many cameras.
pub const PROGRESS_EVERY: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    /// Start a named stage over `total` cameras (0 when unknown).
    pub fn stage(&self, name: &str, total: usize) -> StageGuard {
        if self.pretty() {
            let bar = if total > 0 {
                let bar = ProgressBar::new(total as u64);
                let style = ProgressStyle::with_template("{spinner} {msg} [{bar:30}] {pos}/{len}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar());
                bar.set_style(style);
                bar
            } else {
                let spinner = ProgressBar::new_spinner();
                let style = ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner());
                spinner.set_style(style);
                spinner
            };
            bar.set_draw_target(ProgressDrawTarget::stderr());
            bar.enable_steady_tick(Duration::from_millis(120));
            bar.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), total, Some(bar))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), total, None)
        }
    }
}

pub struct StageGuard {
    name: String,
    total: usize,
    start: Instant,
    bar: Option<ProgressBar>,
    summary: Option<String>,
}

impl StageGuard {
    fn new(name: String, total: usize, bar: Option<ProgressBar>) -> Self {
        Self {
            name,
            total,
            start: Instant::now(),
            bar,
            summary: None,
        }
    }

    /// Record that `done` cameras have been handled.
    pub fn progress(&self, done: usize) {
        if let Some(bar) = &self.bar {
            bar.set_position(done as u64);
        } else if done % PROGRESS_EVERY == 0 {
            eprintln!("    progress: {}/{} images...", done, self.total);
        }
    }

    /// Text appended to the completion line.
    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.summary = Some(summary.into());
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let mut message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(summary) = &self.summary {
            message.push_str(": ");
            message.push_str(summary);
        }
        if let Some(bar) = &self.bar {
            bar.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
