//! Command handler layer.
//!
//! This module owns CLI-oriented orchestration and output wiring.
//!
//! ## Files
//! - `runtime.rs` — reconcile/status/teardown/list.
//! - `admin.rs` — check + vault management.
//!
//! ## Principles
//! - Parse/match CLI inputs here.
//! - Delegate business logic to `services/*`.
//! - Keep behavior and output schema stable.

pub mod admin;
pub mod runtime;

pub use admin::{handle_check, handle_vault_commands};
pub use runtime::{handle_list, handle_reconcile, handle_status, handle_teardown};
