//! Restart notices shown before each reload.

use console::Term;
use owo_colors::OwoColorize;
use tracing::debug;

use crate::token::CacheToken;

/// What is about to be reloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartNotice {
    /// Target module path as given by the caller
    pub target: String,
    /// Token of the load about to start
    pub token: CacheToken,
}

/// Hook invoked at the start of every reload when `clear_on_reload` is set.
pub trait ReloadNotifier: Send + Sync {
    fn restarted(&self, notice: &RestartNotice);
}

/// Clears the terminal and prints a restart line to stderr.
#[derive(Debug, Clone)]
pub struct ConsoleNotifier {
    clear: bool,
    colors: bool,
}

impl Default for ConsoleNotifier {
    fn default() -> Self {
        Self {
            clear: true,
            colors: crate::logger::should_use_colors(),
        }
    }
}

impl ConsoleNotifier {
    pub fn new(clear: bool, colors: bool) -> Self {
        Self { clear, colors }
    }
}

impl ReloadNotifier for ConsoleNotifier {
    fn restarted(&self, notice: &RestartNotice) {
        if self.clear {
            let term = Term::stdout();
            if term.is_term() {
                if let Err(e) = term.clear_screen() {
                    debug!(error = %e, "could not clear terminal");
                }
            }
        }

        if self.colors {
            eprintln!(
                "{} {} {}",
                "↻".cyan().bold(),
                "Restarted".cyan(),
                notice.target.dimmed()
            );
        } else {
            eprintln!("↻ Restarted {}", notice.target);
        }
    }
}

/// Does nothing. Useful for embedders that render their own UI.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentNotifier;

impl ReloadNotifier for SilentNotifier {
    fn restarted(&self, _notice: &RestartNotice) {}
}
