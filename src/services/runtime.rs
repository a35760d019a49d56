//! Runtime driver boundary.
//!
//! The reconciler only ever talks to a `RuntimeDriver`; the shipped
//! implementation shells out to the `docker compose` CLI with an explicit
//! project name per service, so no invocation can touch another service's
//! containers.

use crate::domain::errors::ApplyError;
use crate::domain::models::RunningState;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub trait RuntimeDriver {
    /// Idempotent create-or-update of one service's containers from its
    /// staged runtime definition.
    fn converge(
        &self,
        service: &str,
        compose_file: &Path,
        force_pull: bool,
    ) -> Result<(), ApplyError>;

    fn teardown(&self, service: &str, compose_file: Option<&Path>) -> Result<(), ApplyError>;

    fn status(&self, service: &str) -> Result<RunningState, ApplyError>;
}

pub struct ComposeDriver {
    timeout: Duration,
}

impl ComposeDriver {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput, ApplyError> {
        let mut child = Command::new("docker")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ApplyError::EngineUnavailable("docker executable not found".to_string())
                } else {
                    ApplyError::Failed(format!("failed to start docker: {e}"))
                }
            })?;

        // Drain both pipes while waiting: compose progress output can exceed
        // the OS pipe buffer, and an undrained pipe blocks the child forever.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        let _ = stdout.join();
                        let _ = stderr.join();
                        return Err(ApplyError::Timeout(self.timeout.as_secs()));
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(ApplyError::Failed(format!("wait failed: {e}"))),
            }
        };

        Ok(CommandOutput {
            success: status.success(),
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }

    fn check(&self, args: &[&str]) -> Result<CommandOutput, ApplyError> {
        let out = self.run(args)?;
        if out.success {
            Ok(out)
        } else {
            Err(classify_failure(&out.stderr))
        }
    }
}

struct CommandOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut r) = pipe {
            let _ = r.read_to_string(&mut buf);
        }
        buf
    })
}

fn classify_failure(stderr: &str) -> ApplyError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("cannot connect to the docker daemon")
        || lower.contains("is the docker daemon running")
    {
        return ApplyError::EngineUnavailable(last_line(stderr));
    }
    if lower.contains("port is already allocated") || lower.contains("address already in use") {
        return ApplyError::ResourceConflict(last_line(stderr));
    }
    ApplyError::Failed(last_line(stderr))
}

fn last_line(s: &str) -> String {
    s.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("command failed")
        .trim()
        .to_string()
}

impl RuntimeDriver for ComposeDriver {
    fn converge(
        &self,
        service: &str,
        compose_file: &Path,
        force_pull: bool,
    ) -> Result<(), ApplyError> {
        let file = compose_file.to_string_lossy();
        let mut args = vec!["compose", "-p", service, "-f", &file, "up", "-d"];
        if force_pull {
            args.extend(["--pull", "always"]);
        }
        args.push("--remove-orphans");
        self.check(&args).map(|_| ())
    }

    fn teardown(&self, service: &str, compose_file: Option<&Path>) -> Result<(), ApplyError> {
        let file = compose_file.map(|p| p.to_string_lossy().to_string());
        let mut args = vec!["compose", "-p", service];
        if let Some(f) = file.as_deref() {
            args.extend(["-f", f]);
        }
        args.extend(["down", "--remove-orphans"]);
        self.check(&args).map(|_| ())
    }

    fn status(&self, service: &str) -> Result<RunningState, ApplyError> {
        let out = self.check(&["compose", "-p", service, "ps", "-a", "--format", "json"])?;
        Ok(parse_ps_states(&out.stdout))
    }
}

/// `docker compose ps --format json` emits either a JSON array or one JSON
/// object per line depending on the compose version; handle both.
fn parse_ps_states(stdout: &str) -> RunningState {
    let mut states: Vec<String> = Vec::new();
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return RunningState::Stopped;
    }
    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(trimmed) {
        for item in items {
            if let Some(s) = item.get("State").and_then(|v| v.as_str()) {
                states.push(s.to_ascii_lowercase());
            }
        }
    } else {
        for line in trimmed.lines() {
            let Ok(item) = serde_json::from_str::<serde_json::Value>(line) else {
                return RunningState::Unknown;
            };
            if let Some(s) = item.get("State").and_then(|v| v.as_str()) {
                states.push(s.to_ascii_lowercase());
            }
        }
    }

    if states.is_empty() {
        return RunningState::Stopped;
    }
    let running = states.iter().filter(|s| s.as_str() == "running").count();
    if running == states.len() {
        RunningState::Running
    } else if running == 0 {
        RunningState::Stopped
    } else {
        RunningState::PartiallyRunning
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_engine_loss_as_fatal() {
        let err = classify_failure("Cannot connect to the Docker daemon at unix:///var/run/docker.sock");
        assert!(matches!(err, ApplyError::EngineUnavailable(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn classifies_bound_port_as_conflict() {
        let err = classify_failure("Error: driver failed: Bind for 0.0.0.0:8096 failed: port is already allocated");
        assert!(matches!(err, ApplyError::ResourceConflict(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn other_failures_keep_last_line() {
        let err = classify_failure("first\nsomething exploded\n");
        assert!(matches!(err, ApplyError::Failed(m) if m == "something exploded"));
    }

    #[test]
    fn ps_json_lines_all_running() {
        let out = "{\"Name\":\"jellyfin-1\",\"State\":\"running\"}\n{\"Name\":\"jellyfin-db-1\",\"State\":\"running\"}\n";
        assert_eq!(parse_ps_states(out), RunningState::Running);
    }

    #[test]
    fn ps_array_mixed_is_partial() {
        let out = r#"[{"State":"running"},{"State":"exited"}]"#;
        assert_eq!(parse_ps_states(out), RunningState::PartiallyRunning);
    }

    #[test]
    fn ps_empty_is_stopped() {
        assert_eq!(parse_ps_states(""), RunningState::Stopped);
        assert_eq!(parse_ps_states("[]"), RunningState::Stopped);
    }

    #[test]
    fn ps_garbage_is_unknown() {
        assert_eq!(parse_ps_states("not json"), RunningState::Unknown);
    }
}
