mod common;

use common::TestEnv;

fn statuses(report: &serde_json::Value) -> Vec<(String, String)> {
    report["data"]["outcomes"]
        .as_array()
        .expect("outcomes array")
        .iter()
        .map(|o| {
            (
                o["service"].as_str().unwrap().to_string(),
                o["status"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

#[test]
fn first_reconcile_applies_then_settles_unchanged() {
    let env = TestEnv::new();

    let report = env.run_json(&["reconcile"]);
    assert_eq!(report["ok"], true);
    assert_eq!(
        statuses(&report),
        vec![
            ("jellyfin".to_string(), "applied".to_string()),
            ("whoami".to_string(), "applied".to_string()),
        ]
    );
    let log = env.docker_log();
    assert!(log.contains("compose -p jellyfin"));
    assert!(log.contains("compose -p whoami"));
    assert!(log.contains("up -d"));

    let artifact = env.artifact("jellyfin").expect("committed artifact");
    assert!(artifact.contains("\"8096:8096\""));
    assert!(artifact.contains("TZ: Europe/Berlin"));

    // Second run: nothing changed, the runtime must not be touched.
    std::fs::write(&env.docker_log, "").unwrap();
    let report = env.run_json(&["reconcile"]);
    assert_eq!(
        statuses(&report),
        vec![
            ("jellyfin".to_string(), "unchanged".to_string()),
            ("whoami".to_string(), "unchanged".to_string()),
        ]
    );
    assert_eq!(env.docker_log(), "");
}

#[test]
fn changed_port_reapplies_only_that_service() {
    let env = TestEnv::new();
    env.run_json(&["reconcile"]);

    env.write_stack(
        r#"globals:
  tz: Europe/Berlin
services:
  jellyfin:
    port: 9096
  whoami:
    port: 8080
"#,
    );
    std::fs::write(&env.docker_log, "").unwrap();

    let report = env.run_json(&["reconcile"]);
    assert_eq!(
        statuses(&report),
        vec![
            ("jellyfin".to_string(), "applied".to_string()),
            ("whoami".to_string(), "unchanged".to_string()),
        ]
    );
    let log = env.docker_log();
    assert!(log.contains("-p jellyfin"));
    assert!(!log.contains("-p whoami"));
    assert!(env.artifact("jellyfin").unwrap().contains("\"9096:8096\""));
}

#[test]
fn broken_service_does_not_block_the_rest() {
    let env = TestEnv::new();
    env.write_stack(
        r#"services:
  broken:
    template: missing
    port: 1
  whoami:
    port: 8080
"#,
    );

    let report = env.run_json_fail(&["reconcile"]);
    assert_eq!(report["ok"], false);
    assert_eq!(
        statuses(&report),
        vec![
            ("broken".to_string(), "render_failed".to_string()),
            ("whoami".to_string(), "applied".to_string()),
        ]
    );
    assert!(env.artifact("whoami").is_some());
    assert!(env.artifact("broken").is_none());
}

#[test]
fn single_service_scope_leaves_others_untouched() {
    let env = TestEnv::new();
    let report = env.run_json(&["reconcile", "--service", "jellyfin"]);
    assert_eq!(
        statuses(&report),
        vec![("jellyfin".to_string(), "applied".to_string())]
    );
    let log = env.docker_log();
    assert!(log.contains("-p jellyfin"));
    assert!(!log.contains("-p whoami"));
    assert!(env.artifact("whoami").is_none());
}

#[test]
fn unknown_service_is_a_hard_error() {
    let env = TestEnv::new();
    let out = env.run_json_fail(&["reconcile", "--service", "nope"]);
    assert_eq!(out["ok"], false);
    assert_eq!(out["error"]["code"], "SERVICE_NOT_FOUND");
    assert!(out.get("data").is_none());
}

#[test]
fn dry_run_reports_without_touching_runtime_or_artifacts() {
    let env = TestEnv::new();
    let report = env.run_json(&["reconcile", "--dry-run"]);
    assert_eq!(
        statuses(&report),
        vec![
            ("jellyfin".to_string(), "would_apply".to_string()),
            ("whoami".to_string(), "would_apply".to_string()),
        ]
    );
    assert_eq!(env.docker_log(), "");
    assert!(env.artifact("jellyfin").is_none());

    // After a real run a dry run reports a steady state.
    env.run_json(&["reconcile"]);
    let report = env.run_json(&["reconcile", "--dry-run"]);
    assert_eq!(
        statuses(&report),
        vec![
            ("jellyfin".to_string(), "unchanged".to_string()),
            ("whoami".to_string(), "unchanged".to_string()),
        ]
    );
}

#[test]
fn force_pull_converges_even_when_unchanged() {
    let env = TestEnv::new();
    env.run_json(&["reconcile"]);
    std::fs::write(&env.docker_log, "").unwrap();

    let report = env.run_json(&["reconcile", "--force-pull"]);
    assert_eq!(
        statuses(&report),
        vec![
            ("jellyfin".to_string(), "applied".to_string()),
            ("whoami".to_string(), "applied".to_string()),
        ]
    );
    assert!(env.docker_log().contains("--pull always"));
}

#[test]
fn engine_loss_aborts_the_run_without_committing() {
    let env = TestEnv::new();
    let report = {
        let mut cmd = env.cmd();
        let out = cmd
            .arg("--json")
            .arg("reconcile")
            .env(
                "HOMESTACK_TEST_DOCKER_FAIL",
                "Cannot connect to the Docker daemon at unix:///var/run/docker.sock",
            )
            .assert()
            .failure()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice::<serde_json::Value>(&out).expect("valid json output")
    };
    assert_eq!(report["ok"], false);
    assert!(report["data"]["aborted"]
        .as_str()
        .expect("aborted reason")
        .contains("engine unavailable"));
    // The first service failed fatally; the second was never attempted.
    assert_eq!(
        statuses(&report),
        vec![("jellyfin".to_string(), "apply_failed".to_string())]
    );
    assert!(env.artifact("jellyfin").is_none());
}

#[test]
fn verbose_engine_output_does_not_stall_convergence() {
    let env = TestEnv::new();
    env.write_stack(
        r#"globals:
  converge_timeout: 5
services:
  jellyfin:
    port: 8096
"#,
    );

    // 1MB of pull-progress chatter, well past the OS pipe buffer.
    let report = {
        let mut cmd = env.cmd();
        let out = cmd
            .arg("--json")
            .arg("reconcile")
            .env("HOMESTACK_TEST_DOCKER_NOISE", "1048576")
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice::<serde_json::Value>(&out).expect("valid json output")
    };
    assert_eq!(
        statuses(&report),
        vec![("jellyfin".to_string(), "applied".to_string())]
    );
    assert!(env.artifact("jellyfin").is_some());
}

#[test]
fn interrupt_stops_between_services() {
    let env = TestEnv::new();
    let mut child = env
        .raw_cmd()
        .env("HOMESTACK_TEST_DOCKER_SLEEP", "2")
        .args(["--json", "reconcile"])
        .stdout(std::process::Stdio::piped())
        .spawn()
        .expect("spawn");

    std::thread::sleep(std::time::Duration::from_millis(500));
    std::process::Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .expect("send SIGINT");

    let out = child.wait_with_output().expect("wait");
    assert!(!out.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("valid json output");
    assert_eq!(report["data"]["aborted"], "cancelled");
    // At most the in-flight service completed; the rest were never started.
    assert!(report["data"]["outcomes"].as_array().expect("outcomes").len() < 2);
}

#[test]
fn vault_secret_flows_into_rendered_artifact() {
    let env = TestEnv::new();
    env.write_stack(
        r#"services:
  gitea:
    port: 3000
    db_password: !secret gitea_db_password
"#,
    );
    env.write_template(
        "gitea",
        r#"#! requires: port, db_password
services:
  gitea:
    image: gitea/gitea:latest
    ports:
      - "{{ port }}:3000"
    environment:
      GITEA__database__PASSWD: {{ db_password }}
"#,
    );

    env.cmd()
        .env("HOMESTACK_PASSPHRASE", "correct horse")
        .args(["vault", "init"])
        .assert()
        .success();
    env.cmd()
        .env("HOMESTACK_PASSPHRASE", "correct horse")
        .args(["vault", "set", "gitea_db_password", "s3cr3t-value"])
        .assert()
        .success();

    env.cmd()
        .env("HOMESTACK_PASSPHRASE", "correct horse")
        .args(["--json", "reconcile"])
        .assert()
        .success();
    assert!(env
        .artifact("gitea")
        .expect("committed artifact")
        .contains("s3cr3t-value"));
}

#[test]
fn wrong_passphrase_aborts_before_any_service() {
    let env = TestEnv::new();
    env.cmd()
        .env("HOMESTACK_PASSPHRASE", "right")
        .args(["vault", "init"])
        .assert()
        .success();

    let out = env
        .cmd()
        .env("HOMESTACK_PASSPHRASE", "wrong")
        .args(["--json", "reconcile"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let envelope: serde_json::Value = serde_json::from_slice(&out).expect("valid json output");
    assert_eq!(envelope["ok"], false);
    assert_eq!(envelope["error"]["code"], "VAULT_AUTH");
    assert!(envelope.get("data").is_none());
    assert_eq!(env.docker_log(), "");
}

#[test]
fn missing_secret_fails_only_the_referencing_service() {
    let env = TestEnv::new();
    env.write_stack(
        r#"services:
  gitea:
    template: jellyfin
    port: 3000
    tz: !secret nowhere
  whoami:
    port: 8080
"#,
    );

    let report = env.run_json_fail(&["reconcile"]);
    assert_eq!(
        statuses(&report),
        vec![
            ("gitea".to_string(), "config_failed".to_string()),
            ("whoami".to_string(), "applied".to_string()),
        ]
    );
    let detail = report["data"]["outcomes"][0]["detail"]
        .as_str()
        .expect("failure detail");
    assert!(detail.contains("nowhere"));
}

#[test]
fn teardown_runs_compose_down_against_committed_artifact() {
    let env = TestEnv::new();
    env.run_json(&["reconcile"]);
    std::fs::write(&env.docker_log, "").unwrap();

    let out = env.run_json(&["teardown", "--service", "jellyfin"]);
    assert_eq!(out["ok"], true);
    let log = env.docker_log();
    assert!(log.contains("compose -p jellyfin"));
    assert!(log.contains("down"));
}

#[test]
fn status_parses_container_states() {
    let env = TestEnv::new();
    let ps_file = env.stack.join("ps.json");
    std::fs::write(
        &ps_file,
        r#"[{"Name":"jellyfin-jellyfin-1","State":"running"}]"#,
    )
    .unwrap();

    let out = {
        let mut cmd = env.cmd();
        let raw = cmd
            .env("HOMESTACK_TEST_PS_FILE", &ps_file)
            .args(["--json", "status", "--service", "jellyfin"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice::<serde_json::Value>(&raw).expect("valid json output")
    };
    assert_eq!(out["data"][0]["service"], "jellyfin");
    assert_eq!(out["data"][0]["state"], "running");
}

#[test]
fn check_validates_offline() {
    let env = TestEnv::new();
    let out = env.run_json(&["check"]);
    assert_eq!(out["data"]["overall"], "ok");
    assert_eq!(env.docker_log(), "");

    env.write_stack(
        r#"services:
  jellyfin: {}
"#,
    );
    let out = env.run_json_fail(&["check"]);
    assert_eq!(out["ok"], false);
    assert_eq!(out["data"]["overall"], "failed");
    assert_eq!(out["data"]["items"][0]["status"], "failed");
}
