use crate::cli::{Cli, VaultCommands};
use crate::domain::errors::VaultError;
use crate::domain::models::{CheckItem, CheckReport};
use crate::services::context::{build_context, validate_required};
use crate::services::output::{print_one, print_out, print_report};
use crate::services::registry::load_stack;
use crate::services::storage::audit;
use crate::services::template::{load_template, render};
use crate::services::vault;
use std::path::Path;

/// Offline validation: templates resolvable, config complete, secret
/// references covered — without touching the runtime.
pub fn handle_check(cli: &Cli) -> anyhow::Result<bool> {
    let stack_dir = Path::new(&cli.stack);
    let stack = load_stack(stack_dir)?;
    let passphrase = vault::load_passphrase(cli.passphrase_file.as_deref())?;
    let secrets = vault::unlock(stack_dir, passphrase.as_deref())?;

    let mut items = Vec::new();
    for service in stack.registry.enabled_only() {
        let item = match load_template(stack_dir, service.template_id()) {
            Err(e) => CheckItem {
                service: service.name.clone(),
                status: "render_failed".to_string(),
                detail: Some(e.to_string()),
            },
            Ok(template) => {
                let checked = build_context(service, &stack.globals, &secrets)
                    .map_err(|e| e.to_string())
                    .and_then(|ctx| {
                        validate_required(&service.name, &ctx, &template.requires)
                            .map_err(|e| e.to_string())?;
                        render(&template, &service.name, &ctx).map_err(|e| e.to_string())?;
                        Ok(())
                    });
                match checked {
                    Ok(()) => CheckItem {
                        service: service.name.clone(),
                        status: "ok".to_string(),
                        detail: None,
                    },
                    Err(detail) => CheckItem {
                        service: service.name.clone(),
                        status: "failed".to_string(),
                        detail: Some(detail),
                    },
                }
            }
        };
        items.push(item);
    }

    let ok = items.iter().all(|i| i.status == "ok");
    let report = CheckReport {
        overall: if ok { "ok" } else { "failed" }.to_string(),
        items,
    };
    print_report(cli.json, ok, &report, |r| {
        let mut rows: Vec<String> = r
            .items
            .iter()
            .map(|i| match &i.detail {
                Some(d) => format!("{}\t{}\t{}", i.service, i.status, d),
                None => format!("{}\t{}", i.service, i.status),
            })
            .collect();
        rows.push(format!("overall: {}", r.overall));
        rows
    })?;
    Ok(ok)
}

pub fn handle_vault_commands(cli: &Cli, command: &VaultCommands) -> anyhow::Result<bool> {
    let stack_dir = Path::new(&cli.stack);
    match command {
        VaultCommands::Init => {
            let passphrase = require_passphrase(cli)?;
            vault::init(stack_dir, &passphrase)?;
            audit("vault_init", serde_json::json!({}));
            print_one(cli.json, "initialized", |s| s.to_string())?;
        }
        VaultCommands::Set { key, value } => {
            let passphrase = require_passphrase(cli)?;
            vault::set(stack_dir, &passphrase, key, value)?;
            audit("vault_set", serde_json::json!({"key": key}));
            print_one(cli.json, key, |k| format!("set {k}"))?;
        }
        VaultCommands::Unset { key } => {
            let passphrase = require_passphrase(cli)?;
            let removed = vault::unset(stack_dir, &passphrase, key)?;
            audit("vault_unset", serde_json::json!({"key": key, "removed": removed}));
            print_one(cli.json, removed, |r| {
                if *r {
                    format!("unset {key}")
                } else {
                    format!("no such key: {key}")
                }
            })?;
        }
        VaultCommands::Keys => {
            let passphrase = vault::load_passphrase(cli.passphrase_file.as_deref())?;
            let store = vault::unlock(stack_dir, passphrase.as_deref())?;
            let keys = store.keys();
            print_out(cli.json, &keys, |k| k.clone())?;
        }
    }
    Ok(true)
}

fn require_passphrase(cli: &Cli) -> anyhow::Result<String> {
    vault::load_passphrase(cli.passphrase_file.as_deref())?
        .ok_or_else(|| VaultError::NoPassphrase.into())
}
