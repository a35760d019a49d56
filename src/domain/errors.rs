//! Error taxonomy.
//!
//! Fatal errors (`RegistryError`, `VaultError::Auth`, missing passphrase,
//! `ApplyError::EngineUnavailable`) abort a run; the remaining variants are
//! per-service and are captured into that service's outcome so independent
//! services still proceed.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("service not found: {0}")]
    NotFound(String),
    #[error("service is disabled: {0}")]
    Disabled(String),
    #[error("invalid stack file: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("vault passphrase rejected (integrity check failed)")]
    Auth,
    #[error("no passphrase provided (use --passphrase-file, HOMESTACK_PASSPHRASE_FILE or HOMESTACK_PASSPHRASE)")]
    NoPassphrase,
    #[error("secret not found in vault: {0}")]
    MissingSecret(String),
    #[error("invalid vault file: {0}")]
    Invalid(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("service {service}: missing required field: {field}")]
    MissingField { service: String, field: String },
    #[error("service {service}: missing secret: {key}")]
    MissingSecret { service: String, key: String },
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("template not found: {0}")]
    TemplateNotFound(String),
    #[error("template {template}: syntax error: {message}")]
    Syntax { template: String, message: String },
    #[error("template {template}: {message}")]
    Evaluation { template: String, message: String },
}

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("container engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("resource conflict: {0}")]
    ResourceConflict(String),
    #[error("convergence timed out after {0}s")]
    Timeout(u64),
    #[error("{0}")]
    Failed(String),
}

impl ApplyError {
    /// Engine loss is fatal for every remaining service in the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApplyError::EngineUnavailable(_))
    }
}

/// Stable machine-readable code for the `--json` error envelope.
pub fn error_code(err: &anyhow::Error) -> &'static str {
    if let Some(e) = err.downcast_ref::<RegistryError>() {
        return match e {
            RegistryError::NotFound(_) => "SERVICE_NOT_FOUND",
            RegistryError::Disabled(_) => "SERVICE_DISABLED",
            RegistryError::Invalid(_) => "STACK_INVALID",
        };
    }
    if let Some(e) = err.downcast_ref::<VaultError>() {
        return match e {
            VaultError::Auth => "VAULT_AUTH",
            VaultError::NoPassphrase => "NO_PASSPHRASE",
            VaultError::MissingSecret(_) => "MISSING_SECRET",
            VaultError::Invalid(_) => "VAULT_INVALID",
            VaultError::Io(_) => "VAULT_IO",
        };
    }
    if let Some(e) = err.downcast_ref::<ApplyError>() {
        return match e {
            ApplyError::EngineUnavailable(_) => "ENGINE_UNAVAILABLE",
            ApplyError::ResourceConflict(_) => "RESOURCE_CONFLICT",
            ApplyError::Timeout(_) => "APPLY_TIMEOUT",
            ApplyError::Failed(_) => "APPLY_FAILED",
        };
    }
    "ERROR"
}
