//! Stack file loading and the service registry.
//!
//! The stack file (`stack.yaml`) has a top-level `globals:` mapping and a
//! `services:` mapping of service name → parameters. Mapping order is the
//! declaration order and is preserved end to end.

use crate::domain::errors::RegistryError;
use crate::domain::models::{GlobalContext, ParamValue, ServiceDefinition};
use std::path::{Path, PathBuf};

pub const STACK_FILE: &str = "stack.yaml";

#[derive(Debug)]
pub struct ServiceRegistry {
    services: Vec<ServiceDefinition>,
}

impl ServiceRegistry {
    /// All declared services in declaration order.
    pub fn list(&self) -> &[ServiceDefinition] {
        &self.services
    }

    /// Hard `NotFound` error for unknown names: a single-service request is
    /// a human asking for exactly one deployment, never a silent no-op.
    pub fn get(&self, name: &str) -> Result<&ServiceDefinition, RegistryError> {
        self.services
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn enabled_only(&self) -> Vec<&ServiceDefinition> {
        self.services.iter().filter(|s| s.enabled).collect()
    }
}

#[derive(Debug)]
pub struct StackFile {
    pub globals: GlobalContext,
    pub registry: ServiceRegistry,
}

pub fn stack_file_path(stack_dir: &Path) -> PathBuf {
    stack_dir.join(STACK_FILE)
}

pub fn load_stack(stack_dir: &Path) -> Result<StackFile, RegistryError> {
    let path = stack_file_path(stack_dir);
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| RegistryError::Invalid(format!("{}: {e}", path.display())))?;
    parse_stack(&raw)
}

pub fn parse_stack(raw: &str) -> Result<StackFile, RegistryError> {
    let doc: serde_yaml::Value =
        serde_yaml::from_str(raw).map_err(|e| RegistryError::Invalid(e.to_string()))?;
    let top = doc
        .as_mapping()
        .ok_or_else(|| RegistryError::Invalid("top level must be a mapping".to_string()))?;

    let mut globals = GlobalContext::default();
    if let Some(g) = top.get("globals") {
        let m = g
            .as_mapping()
            .ok_or_else(|| RegistryError::Invalid("globals must be a mapping".to_string()))?;
        for (k, v) in m {
            globals.vars.push((key_str(k)?, parse_param(v)?));
        }
    }

    let services_val = top
        .get("services")
        .ok_or_else(|| RegistryError::Invalid("missing services mapping".to_string()))?;
    let services_map = services_val
        .as_mapping()
        .ok_or_else(|| RegistryError::Invalid("services must be a mapping".to_string()))?;

    let mut services = Vec::new();
    for (name_val, body) in services_map {
        let name = key_str(name_val)?;
        validate_name(&name)?;
        let body = body.as_mapping().ok_or_else(|| {
            RegistryError::Invalid(format!("service {name} must be a mapping"))
        })?;

        let mut enabled = true;
        let mut params = Vec::new();
        for (k, v) in body {
            let k = key_str(k)?;
            if k == "enabled" {
                enabled = v.as_bool().ok_or_else(|| {
                    RegistryError::Invalid(format!("service {name}: enabled must be a bool"))
                })?;
                continue;
            }
            params.push((k, parse_param(v)?));
        }
        services.push(ServiceDefinition {
            name,
            enabled,
            params,
        });
    }

    Ok(StackFile {
        globals,
        registry: ServiceRegistry { services },
    })
}

/// Service names double as compose project names, so the charset is strict.
fn validate_name(name: &str) -> Result<(), RegistryError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(RegistryError::Invalid(format!(
            "invalid service name: {name} (use lowercase letters, digits, '-', '_')"
        )))
    }
}

fn key_str(v: &serde_yaml::Value) -> Result<String, RegistryError> {
    v.as_str()
        .map(str::to_string)
        .ok_or_else(|| RegistryError::Invalid("mapping keys must be strings".to_string()))
}

fn parse_param(v: &serde_yaml::Value) -> Result<ParamValue, RegistryError> {
    match v {
        serde_yaml::Value::String(s) => Ok(ParamValue::String(s.clone())),
        serde_yaml::Value::Bool(b) => Ok(ParamValue::Bool(*b)),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(ParamValue::Int(i))
            } else {
                Ok(ParamValue::String(n.to_string()))
            }
        }
        serde_yaml::Value::Mapping(m) => {
            let mut out = Vec::new();
            for (k, v) in m {
                out.push((key_str(k)?, parse_param(v)?));
            }
            Ok(ParamValue::Map(out))
        }
        serde_yaml::Value::Tagged(t) => {
            let tag = t.tag.to_string();
            if tag.trim_start_matches('!') == "secret" {
                let key = t.value.as_str().ok_or_else(|| {
                    RegistryError::Invalid("!secret expects a string key".to_string())
                })?;
                Ok(ParamValue::SecretRef(key.to_string()))
            } else {
                Err(RegistryError::Invalid(format!("unknown tag: {tag}")))
            }
        }
        serde_yaml::Value::Null => Ok(ParamValue::String(String::new())),
        serde_yaml::Value::Sequence(_) => Err(RegistryError::Invalid(
            "sequences are not supported as parameter values".to_string(),
        )),
    }
}
