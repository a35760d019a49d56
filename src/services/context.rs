//! Config resolution: merge built-in defaults, globals and service
//! parameters into one render context, substituting secret references.
//!
//! Merge order (later overrides earlier): built-in defaults < globals <
//! service parameters. Resolution failures are per-service `ConfigError`s
//! and never abort the whole run.

use crate::domain::errors::ConfigError;
use crate::domain::models::{
    CtxValue, GlobalContext, ParamValue, RenderContext, ServiceDefinition,
};
use crate::services::vault::SecretStore;
use std::collections::BTreeMap;

fn builtin_defaults() -> Vec<(String, ParamValue)> {
    vec![
        ("tz".to_string(), ParamValue::String("UTC".to_string())),
        (
            "network_name".to_string(),
            ParamValue::String("homestack".to_string()),
        ),
        ("puid".to_string(), ParamValue::Int(1000)),
        ("pgid".to_string(), ParamValue::Int(1000)),
        (
            "restart_policy".to_string(),
            ParamValue::String("unless-stopped".to_string()),
        ),
    ]
}

pub fn build_context(
    service: &ServiceDefinition,
    globals: &GlobalContext,
    secrets: &SecretStore,
) -> Result<RenderContext, ConfigError> {
    let mut ctx = RenderContext::default();
    for (k, v) in builtin_defaults() {
        ctx.insert(k, resolve_value(&service.name, &v, secrets)?);
    }
    for (k, v) in &globals.vars {
        ctx.insert(k.clone(), resolve_value(&service.name, v, secrets)?);
    }
    for (k, v) in &service.params {
        ctx.insert(k.clone(), resolve_value(&service.name, v, secrets)?);
    }
    ctx.insert(
        "service_name".to_string(),
        CtxValue::Str(service.name.clone()),
    );
    Ok(ctx)
}

/// Check the template's declared required parameter names against the built
/// context. Only top-level names are declarable.
pub fn validate_required(
    service: &str,
    ctx: &RenderContext,
    requires: &[String],
) -> Result<(), ConfigError> {
    for field in requires {
        if !ctx.contains(field) {
            return Err(ConfigError::MissingField {
                service: service.to_string(),
                field: field.clone(),
            });
        }
    }
    Ok(())
}

fn resolve_value(
    service: &str,
    value: &ParamValue,
    secrets: &SecretStore,
) -> Result<CtxValue, ConfigError> {
    match value {
        ParamValue::String(s) => Ok(CtxValue::Str(s.clone())),
        ParamValue::Int(i) => Ok(CtxValue::Str(i.to_string())),
        ParamValue::Bool(b) => Ok(CtxValue::Str(b.to_string())),
        ParamValue::SecretRef(key) => match secrets.resolve(key) {
            Ok(v) => Ok(CtxValue::Str(v.to_string())),
            Err(_) => Err(ConfigError::MissingSecret {
                service: service.to_string(),
                key: key.clone(),
            }),
        },
        ParamValue::Map(entries) => {
            let mut out = BTreeMap::new();
            for (k, v) in entries {
                out.insert(k.clone(), resolve_value(service, v, secrets)?);
            }
            Ok(CtxValue::Map(out))
        }
    }
}
