use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestEnv {
    _tmp: TempDir,
    pub home: PathBuf,
    pub stack: PathBuf,
    bin: PathBuf,
    pub docker_log: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let home = tmp.path().join("home");
        fs::create_dir_all(&home).expect("create isolated home");

        let stack = make_fixture_stack(tmp.path());
        let docker_log = tmp.path().join("docker.log");
        let bin = make_docker_stub(tmp.path());

        Self {
            _tmp: tmp,
            home,
            stack,
            bin,
            docker_log,
        }
    }

    pub fn cmd(&self) -> Command {
        let path = format!(
            "{}:{}",
            self.bin.display(),
            std::env::var("PATH").unwrap_or_default()
        );
        let mut cmd = cargo_bin_cmd!("homestack");
        cmd.env("HOME", &self.home)
            .env("PATH", path)
            .env("HOMESTACK_TEST_DOCKER_LOG", &self.docker_log)
            .env_remove("HOMESTACK_PASSPHRASE")
            .env_remove("HOMESTACK_PASSPHRASE_FILE")
            .arg("--stack")
            .arg(&self.stack);
        cmd
    }

    /// Plain `std::process::Command` for tests that need to manage the child
    /// themselves (signals, concurrent runs).
    pub fn raw_cmd(&self) -> std::process::Command {
        let path = format!(
            "{}:{}",
            self.bin.display(),
            std::env::var("PATH").unwrap_or_default()
        );
        let mut cmd = std::process::Command::new(assert_cmd::cargo::cargo_bin!("homestack"));
        cmd.env("HOME", &self.home)
            .env("PATH", path)
            .env("HOMESTACK_TEST_DOCKER_LOG", &self.docker_log)
            .env_remove("HOMESTACK_PASSPHRASE")
            .env_remove("HOMESTACK_PASSPHRASE_FILE")
            .arg("--stack")
            .arg(&self.stack);
        cmd
    }

    pub fn run_json(&self, args: &[&str]) -> Value {
        let mut cmd = self.cmd();
        let out = cmd
            .arg("--json")
            .args(args)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&out).expect("valid json output")
    }

    /// Run a command expected to exit non-zero but still emit a JSON body
    /// (partial-failure reports, error envelopes).
    pub fn run_json_fail(&self, args: &[&str]) -> Value {
        let mut cmd = self.cmd();
        let out = cmd
            .arg("--json")
            .args(args)
            .assert()
            .failure()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&out).expect("valid json output")
    }

    pub fn docker_log(&self) -> String {
        fs::read_to_string(&self.docker_log).unwrap_or_default()
    }

    pub fn write_stack(&self, contents: &str) {
        fs::write(self.stack.join("stack.yaml"), contents).expect("write stack.yaml");
    }

    pub fn write_template(&self, id: &str, contents: &str) {
        fs::write(
            self.stack.join("templates").join(format!("{id}.tmpl")),
            contents,
        )
        .expect("write template");
    }

    pub fn artifact(&self, service: &str) -> Option<String> {
        fs::read_to_string(self.stack.join("build").join(service).join("compose.yaml")).ok()
    }
}

pub const JELLYFIN_TEMPLATE: &str = r#"#! requires: port
services:
  jellyfin:
    image: jellyfin/jellyfin:latest
    ports:
      - "{{ port }}:8096"
    environment:
      TZ: {{ tz }}
    restart: {{ restart_policy }}
"#;

pub const WHOAMI_TEMPLATE: &str = r#"#! requires: port
services:
  whoami:
    image: traefik/whoami:latest
    ports:
      - "{{ port }}:80"
    restart: {{ restart_policy }}
"#;

pub const DEFAULT_STACK: &str = r#"globals:
  tz: Europe/Berlin
services:
  jellyfin:
    port: 8096
  whoami:
    port: 8080
"#;

fn make_fixture_stack(base: &Path) -> PathBuf {
    let stack = base.join("stack");
    fs::create_dir_all(stack.join("templates")).expect("create templates dir");
    fs::write(stack.join("stack.yaml"), DEFAULT_STACK).expect("write stack.yaml");
    fs::write(stack.join("templates/jellyfin.tmpl"), JELLYFIN_TEMPLATE)
        .expect("write jellyfin template");
    fs::write(stack.join("templates/whoami.tmpl"), WHOAMI_TEMPLATE)
        .expect("write whoami template");
    stack
}

/// Stub `docker` executable: logs every invocation, optionally fails or
/// serves canned `ps` output via env vars.
fn make_docker_stub(base: &Path) -> PathBuf {
    let bin = base.join("bin");
    fs::create_dir_all(&bin).expect("create stub bin dir");
    let script = r#"#!/bin/sh
if [ -n "$HOMESTACK_TEST_DOCKER_LOG" ]; then
  echo "docker $*" >> "$HOMESTACK_TEST_DOCKER_LOG"
fi
if [ -n "$HOMESTACK_TEST_DOCKER_NOISE" ]; then
  head -c "$HOMESTACK_TEST_DOCKER_NOISE" /dev/zero | tr '\0' 'x' >&2
fi
if [ -n "$HOMESTACK_TEST_DOCKER_SLEEP" ]; then
  sleep "$HOMESTACK_TEST_DOCKER_SLEEP"
fi
if [ -n "$HOMESTACK_TEST_DOCKER_FAIL" ]; then
  echo "$HOMESTACK_TEST_DOCKER_FAIL" >&2
  exit 1
fi
for a in "$@"; do
  if [ "$a" = "ps" ]; then
    if [ -n "$HOMESTACK_TEST_PS_FILE" ]; then
      cat "$HOMESTACK_TEST_PS_FILE"
    fi
    exit 0
  fi
done
exit 0
"#;
    let path = bin.join("docker");
    fs::write(&path, script).expect("write docker stub");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&path).expect("stub metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("chmod stub");
    }
    bin
}
