//! Spinners and counters on a terminal, nothing otherwise.
//!
//! Each pipeline phase (local scan, remote listing, actions) gets one line
//! under a shared `MultiProgress`. When stderr is not a terminal every bar is
//! hidden and the log is the only record of progress.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

const PHASE_TEMPLATE: &str = "{spinner:.green} {prefix:<8.cyan.bold} {wide_msg}";
const COUNTER_TEMPLATE: &str = "{prefix:<8.cyan.bold} [{bar:30.green/dim}] {pos}/{len} {wide_msg:.dim}";

/// Owner of the progress lines for one command.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

/// Style from a constant template; a bad template falls back to the default.
fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

impl ProgressContext {
    /// Draw only when stderr is a terminal.
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: std::io::stderr().is_terminal(),
        }
    }

    /// Never draws.
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: false,
        }
    }

    fn attach(&self, name: &str, pb: ProgressBar, template: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(pb);
        pb.set_style(style(template));
        pb.set_prefix(name.to_string());
        pb
    }

    /// Spinner line for a phase. Set its message as the phase advances and
    /// finish it when done.
    pub fn stage_line(&self, name: &str) -> ProgressBar {
        let pb = self.attach(name, ProgressBar::new_spinner(), PHASE_TEMPLATE);
        if self.is_tty {
            pb.enable_steady_tick(Duration::from_millis(100));
        }
        pb
    }

    /// Counter over `len` items; the length may be set later.
    pub fn item_bar(&self, name: &str, len: u64) -> ProgressBar {
        self.attach(name, ProgressBar::new(len), COUNTER_TEMPLATE)
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// For routing log lines above the bars.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedProgress = Arc<ProgressContext>;

/// `1234567` as `1,234,567`.
pub fn fmt_num(n: usize) -> String {
    let digits = n.to_string();
    let head = digits.len() % 3;
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (i + 3 - head) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
