//! Interactive confirmation on the terminal.

use std::io::{BufRead, IsTerminal, Write};
use tracing::warn;

use crate::orchestrator::Confirmer;

/// Asks on stderr and reads the answer from stdin.
#[derive(Debug, Clone, Copy)]
pub struct StdinConfirmer {
    auto_confirm: bool,
}

impl StdinConfirmer {
    /// Creates a confirmer; `auto_confirm` answers yes without asking.
    #[must_use]
    pub const fn new(auto_confirm: bool) -> Self {
        Self { auto_confirm }
    }
}

impl Confirmer for StdinConfirmer {
    fn confirm(&self, prompt: &str) -> bool {
        if self.auto_confirm {
            return true;
        }
        if !std::io::stdin().is_terminal() {
            warn!("Cannot ask \"{prompt}\" without a terminal; assuming no");
            return false;
        }

        eprint!("{prompt} [y/N] ");
        let _ = std::io::stderr().flush();

        let mut input = String::new();
        if std::io::stdin().lock().read_line(&mut input).is_err() {
            return false;
        }
        is_yes(&input)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
