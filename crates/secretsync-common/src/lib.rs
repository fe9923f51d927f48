//! Collaborator interfaces shared by the secretsync crates
//!
//! - [`RunMode`]: CI/CD and interactivity flags resolved at startup
//! - [`Console`]: notices and prompts
//! - [`ConfigDir`]: named JSON objects in the user config directory

mod console;
mod error;
mod mode;
mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use console::{ConflictChoice, Console};
pub use error::{ConsoleError, StoreError};
pub use mode::{RunMode, CICD_ENV};
pub use store::{read_json_file, write_json_file, ConfigDir};
