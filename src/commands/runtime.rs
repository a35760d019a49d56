use crate::cli::Cli;
use crate::domain::models::{Outcome, RunReport, ServiceRow, StatusRow};
use crate::services::artifacts::ArtifactStore;
use crate::services::output::{print_one, print_out, print_report};
use crate::services::reconciler::{ReconcileOpts, Reconciler, Scope};
use crate::services::registry::load_stack;
use crate::services::runtime::{ComposeDriver, RuntimeDriver};
use crate::services::storage::audit;
use crate::services::vault;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub fn handle_reconcile(
    cli: &Cli,
    service: Option<&str>,
    force_pull: bool,
    dry_run: bool,
) -> anyhow::Result<bool> {
    let stack_dir = Path::new(&cli.stack);
    let stack = load_stack(stack_dir)?;

    // Unlock once, before any service is touched: a bad passphrase must
    // abort with zero per-service outcomes.
    let passphrase = vault::load_passphrase(cli.passphrase_file.as_deref())?;
    let secrets = vault::unlock(stack_dir, passphrase.as_deref())?;

    let scope = match service {
        Some(name) => Scope::Single(name.to_string()),
        None => Scope::AllEnabled,
    };
    let driver = ComposeDriver::new(stack.globals.converge_timeout_secs());

    // Ctrl-C stops cleanly between services; the in-flight converge is
    // allowed to finish so the committed artifact stays truthful.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        let _ = ctrlc::set_handler(move || cancel.store(true, Ordering::SeqCst));
    }
    let reconciler = Reconciler {
        stack_dir,
        registry: &stack.registry,
        globals: &stack.globals,
        secrets: &secrets,
        store: ArtifactStore::new(stack_dir),
        driver: &driver,
        cancel: &cancel,
    };

    let report = reconciler.run(&ReconcileOpts {
        scope,
        force_pull,
        dry_run,
    })?;

    audit(
        "reconcile",
        serde_json::json!({
            "scope": service.unwrap_or("all"),
            "dry_run": dry_run,
            "force_pull": force_pull,
            "outcomes": report
                .outcomes
                .iter()
                .map(|o| serde_json::json!({"service": o.service, "status": o.status}))
                .collect::<Vec<_>>(),
            "aborted": report.aborted,
        }),
    );

    let ok = report.success();
    print_report(cli.json, ok, &report, report_rows)?;
    Ok(ok)
}

fn report_rows(report: &&RunReport) -> Vec<String> {
    let mut rows: Vec<String> = report.outcomes.iter().map(outcome_row).collect();
    if let Some(reason) = &report.aborted {
        rows.push(format!("aborted: {reason}"));
    }
    rows
}

fn outcome_row(o: &Outcome) -> String {
    match &o.detail {
        Some(d) => format!("{}\t{}\t{}", o.service, o.status.as_str(), d),
        None => format!("{}\t{}", o.service, o.status.as_str()),
    }
}

pub fn handle_status(cli: &Cli, service: Option<&str>) -> anyhow::Result<bool> {
    let stack_dir = Path::new(&cli.stack);
    let stack = load_stack(stack_dir)?;
    let driver = ComposeDriver::new(stack.globals.converge_timeout_secs());

    let names: Vec<String> = match service {
        Some(name) => vec![stack.registry.get(name)?.name.clone()],
        None => stack
            .registry
            .enabled_only()
            .iter()
            .map(|s| s.name.clone())
            .collect(),
    };

    let mut rows = Vec::new();
    for name in names {
        let state = driver.status(&name)?;
        rows.push(StatusRow {
            service: name,
            state,
        });
    }
    print_out(cli.json, &rows, |r| {
        format!("{}\t{}", r.service, r.state.as_str())
    })?;
    Ok(true)
}

pub fn handle_teardown(cli: &Cli, service: &str) -> anyhow::Result<bool> {
    let stack_dir = Path::new(&cli.stack);
    let stack = load_stack(stack_dir)?;
    let svc = stack.registry.get(service)?;

    let store = ArtifactStore::new(stack_dir);
    let artifact_path = store.artifact_path(&svc.name);
    let compose_file = artifact_path.exists().then_some(artifact_path.as_path());

    let driver = ComposeDriver::new(stack.globals.converge_timeout_secs());
    driver.teardown(&svc.name, compose_file)?;
    audit("teardown", serde_json::json!({"service": svc.name}));

    print_one(cli.json, &svc.name, |n| format!("stopped {n}"))?;
    Ok(true)
}

pub fn handle_list(cli: &Cli) -> anyhow::Result<bool> {
    let stack_dir = Path::new(&cli.stack);
    let stack = load_stack(stack_dir)?;
    let rows: Vec<ServiceRow> = stack
        .registry
        .list()
        .iter()
        .map(|s| ServiceRow {
            service: s.name.clone(),
            enabled: s.enabled,
            template: s.template_id().to_string(),
        })
        .collect();
    print_out(cli.json, &rows, |r| {
        format!("{}\t{}\t{}", r.service, r.enabled, r.template)
    })?;
    Ok(true)
}
