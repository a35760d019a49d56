//! Shared data model layer (structs/enums only).
//!
//! ## Purpose
//! - Keep DTO/report structs in one place.
//! - Avoid cyclic imports and duplicated type definitions.
//! - Make JSON output schema changes explicit and reviewable.
//!
//! ## Files
//! - `models.rs` — service definitions, contexts, artifacts, run reports.
//! - `errors.rs` — error taxonomy and `--json` error codes.
//!
//! ## Rule of thumb
//! Domain types should be data-only: no filesystem/network side effects.

pub mod errors;
pub mod models;
