//! End-to-end test utilities for secretsync
//!
//! Runs the real Vault client and reconciliation engine against an in-process
//! mock Vault server, with projects and user config in temporary directories.

pub mod harness;
pub mod mock_vault;

pub use harness::{init_test, vault_entry, TestProject};
pub use mock_vault::{MockVault, RecordedRequest, CAS_ERROR};
