//! The reconciliation core.
//!
//! One pass walks the working set in registry order: build context →
//! render → diff → converge → commit. Per-service failures become that
//! service's outcome and the pass continues; only engine loss or
//! cancellation stops the remaining services. An artifact is committed
//! only after the driver confirmed the apply, so a repeated run with no
//! configuration change performs no runtime mutation.

use crate::domain::errors::RegistryError;
use crate::domain::models::{
    GlobalContext, Outcome, OutcomeStatus, RunReport, ServiceDefinition,
};
use crate::services::artifacts::{ArtifactStore, DiffResult};
use crate::services::context::{build_context, validate_required};
use crate::services::locks;
use crate::services::registry::ServiceRegistry;
use crate::services::runtime::RuntimeDriver;
use crate::services::template::{load_template, render};
use crate::services::vault::SecretStore;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    AllEnabled,
    Single(String),
}

pub struct ReconcileOpts {
    pub scope: Scope,
    pub force_pull: bool,
    pub dry_run: bool,
}

pub struct Reconciler<'a> {
    pub stack_dir: &'a Path,
    pub registry: &'a ServiceRegistry,
    pub globals: &'a GlobalContext,
    pub secrets: &'a SecretStore,
    pub store: ArtifactStore,
    pub driver: &'a dyn RuntimeDriver,
    /// Cooperative cancellation, checked before each service's pipeline.
    pub cancel: &'a AtomicBool,
}

impl<'a> Reconciler<'a> {
    /// Resolve the working set for a scope. `NotFound` and disabled
    /// single-service requests are hard stops before any work happens.
    pub fn working_set(
        registry: &ServiceRegistry,
        scope: &Scope,
    ) -> Result<Vec<String>, RegistryError> {
        match scope {
            Scope::AllEnabled => Ok(registry
                .enabled_only()
                .iter()
                .map(|s| s.name.clone())
                .collect()),
            Scope::Single(name) => {
                let svc = registry.get(name)?;
                if !svc.enabled {
                    return Err(RegistryError::Disabled(name.clone()));
                }
                Ok(vec![svc.name.clone()])
            }
        }
    }

    pub fn run(&self, opts: &ReconcileOpts) -> Result<RunReport, RegistryError> {
        let working_set = Self::working_set(self.registry, &opts.scope)?;
        let mut report = RunReport::default();

        for name in &working_set {
            if self.cancel.load(Ordering::SeqCst) {
                report.aborted = Some("cancelled".to_string());
                break;
            }
            // working_set names come from the registry, so get cannot fail.
            let service = match self.registry.get(name) {
                Ok(s) => s,
                Err(e) => return Err(e),
            };
            let (outcome, fatal) = self.run_service(service, opts);
            report.record(outcome);
            if let Some(reason) = fatal {
                report.aborted = Some(reason);
                break;
            }
        }
        Ok(report)
    }

    /// One service's pipeline. Returns the outcome plus an abort reason
    /// when the failure is fatal for the rest of the run.
    fn run_service(
        &self,
        service: &ServiceDefinition,
        opts: &ReconcileOpts,
    ) -> (Outcome, Option<String>) {
        let template = match load_template(self.stack_dir, service.template_id()) {
            Ok(t) => t,
            Err(e) => {
                return (
                    Outcome::with_detail(&service.name, OutcomeStatus::RenderFailed, e.to_string()),
                    None,
                )
            }
        };

        let ctx = match build_context(service, self.globals, self.secrets) {
            Ok(c) => c,
            Err(e) => {
                return (
                    Outcome::with_detail(&service.name, OutcomeStatus::ConfigFailed, e.to_string()),
                    None,
                )
            }
        };
        if let Err(e) = validate_required(&service.name, &ctx, &template.requires) {
            return (
                Outcome::with_detail(&service.name, OutcomeStatus::ConfigFailed, e.to_string()),
                None,
            );
        }

        let artifact = match render(&template, &service.name, &ctx) {
            Ok(a) => a,
            Err(e) => {
                return (
                    Outcome::with_detail(&service.name, OutcomeStatus::RenderFailed, e.to_string()),
                    None,
                )
            }
        };

        let diff = match self.store.diff(&service.name, &artifact) {
            Ok(d) => d,
            Err(e) => {
                return (
                    Outcome::with_detail(&service.name, OutcomeStatus::ApplyFailed, e.to_string()),
                    None,
                )
            }
        };
        if diff == DiffResult::Unchanged && !opts.force_pull {
            return (Outcome::new(&service.name, OutcomeStatus::Unchanged), None);
        }

        if opts.dry_run {
            return (Outcome::new(&service.name, OutcomeStatus::WouldApply), None);
        }

        let _lock = match locks::acquire(self.store.root(), &service.name) {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                return (
                    Outcome::with_detail(
                        &service.name,
                        OutcomeStatus::ApplyFailed,
                        "convergence already in progress for this service",
                    ),
                    None,
                )
            }
            Err(e) => {
                return (
                    Outcome::with_detail(&service.name, OutcomeStatus::ApplyFailed, e.to_string()),
                    None,
                )
            }
        };

        let staged = match self.store.stage(&artifact) {
            Ok(p) => p,
            Err(e) => {
                return (
                    Outcome::with_detail(&service.name, OutcomeStatus::ApplyFailed, e.to_string()),
                    None,
                )
            }
        };

        match self.driver.converge(&service.name, &staged, opts.force_pull) {
            Ok(()) => match self.store.commit(&service.name) {
                Ok(()) => (Outcome::new(&service.name, OutcomeStatus::Applied), None),
                Err(e) => (
                    Outcome::with_detail(&service.name, OutcomeStatus::ApplyFailed, e.to_string()),
                    None,
                ),
            },
            Err(e) => {
                let _ = self.store.discard_staged(&service.name);
                let fatal = e
                    .is_fatal()
                    .then(|| "container engine unavailable".to_string());
                (
                    Outcome::with_detail(&service.name, OutcomeStatus::ApplyFailed, e.to_string()),
                    fatal,
                )
            }
        }
    }
}
