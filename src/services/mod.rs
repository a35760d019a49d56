//! Service layer containing business logic and side-effect helpers.
//!
//! ## Service map
//! - `registry.rs` — stack file parsing and the service registry.
//! - `vault.rs` — encrypted secret store (unlock/resolve + management).
//! - `context.rs` — config resolution into per-service render contexts.
//! - `template.rs` — template library and the pure renderer.
//! - `artifacts.rs` — last-applied artifact persistence and diffing.
//! - `locks.rs` — per-service convergence lock files.
//! - `runtime.rs` — the runtime driver boundary (`docker compose`).
//! - `reconciler.rs` — the orchestration core.
//! - `storage.rs` — audit log.
//! - `output.rs` — JSON/text output helpers.
//!
//! ## Conventions
//! - Prefer pure helpers where possible.
//! - Side effects should be explicit and localized.
//! - Keep command handlers thin; delegate to services.

pub mod artifacts;
pub mod context;
pub mod locks;
pub mod output;
pub mod reconciler;
pub mod registry;
pub mod runtime;
pub mod storage;
pub mod template;
pub mod vault;
