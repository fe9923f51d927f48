//! Terminal front end for secretsync
//!
//! - [`TerminalConsole`]: styled notices, line editing, hidden input and a numbered chooser
//! - [`AddWizard`]: builds a new `secrets.yaml` entry from a few questions

mod console;
mod wizard;

pub use console::TerminalConsole;
pub use wizard::{AddWizard, OTHER_HOST};
