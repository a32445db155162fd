use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::io::Write;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Simulated machine, no engagement delay, adjust on every tick
fn write_sim_config(dir: &tempfile::TempDir, extra: &str) -> PathBuf {
    let toml = format!(
        r#"
[link]
mode = "sim"
settle_ms = 0

[control]
poll_hz = 50
min_update_ms = 0
strategy = "none"

[delay]
min_ms = 0
max_ms = 0
default_ms = 0
{extra}
"#
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn closed_port() -> u16 {
    let l = TcpListener::bind("127.0.0.1:0").unwrap();
    l.local_addr().unwrap().port()
}

fn bandsaw() -> Command {
    Command::cargo_bin("bandsaw").unwrap()
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "OK: link up", "stdout")]
#[case(&["emergency-stop"], 0, "setpoints zeroed", "stdout")]
#[case(&["run", "--ticks", "5"], 0, "Run complete: 5 ticks", "stdout")]
#[case(&["run", "--strategy", "pid", "--ticks", "1"], 5, "Invalid configuration", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir, "");

    let mut cmd = bandsaw();
    cmd.arg("--log-level").arg("error").arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert();
    let assert = if exit_code >= 0 {
        assert.code(exit_code)
    } else {
        assert.failure()
    };

    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn expert_run_reports_adjustments_as_json() {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir, "");

    let out = bandsaw()
        .arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("run")
        .arg("--strategy")
        .arg("expert")
        .arg("--ticks")
        .arg("30")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8_lossy(&out);
    let line = stdout
        .lines()
        .find(|l| l.contains("\"ticks\""))
        .unwrap_or("")
        .to_string();
    assert!(!line.is_empty(), "no summary line; stdout was: {stdout}");

    let v: serde_json::Value = serde_json::from_str(&line).expect("valid JSON");
    assert_eq!(v["ticks"], 30);
    assert_eq!(v["missed_reads"], 0);
    assert_eq!(v["active"], "expert");
    assert!(v["adjustments"].as_u64().unwrap() >= 1);
    // the simulated saw draws more than 17 A, so descent goes down
    let descent = v["last_applied"]["descent_speed"].as_f64().unwrap();
    assert!(descent < 40.0 && descent >= 20.0, "descent = {descent}");
    assert!(v["strategies"]["expert"]["runs"].as_u64().unwrap() >= 1);
}

#[rstest]
fn snapshot_prints_decoded_fields() {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir, "");
    let out = bandsaw()
        .arg("--json")
        .arg("--config")
        .arg(&cfg)
        .arg("snapshot")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_str(String::from_utf8_lossy(&out).trim()).unwrap();
    assert_eq!(v["state_code"], 2);
    assert_eq!(v["head_height"], 120.0);
    assert_eq!(v["descent_speed"], 40.0);
    assert!(v.get("vibration_freq_z").is_some());
}

#[rstest]
fn unreachable_controller_exits_with_transport_code() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cfg.toml");
    fs::write(
        &path,
        format!("[link]\nhost = \"127.0.0.1\"\nport = {}\n", closed_port()),
    )
    .unwrap();

    bandsaw()
        .arg("--config")
        .arg(&path)
        .arg("self-check")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("could not be reached"));
}

#[rstest]
fn json_mode_reports_structured_errors() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cfg.toml");
    fs::write(
        &path,
        format!("[link]\nhost = \"127.0.0.1\"\nport = {}\n", closed_port()),
    )
    .unwrap();

    let out = bandsaw()
        .arg("--json")
        .arg("--config")
        .arg(&path)
        .arg("emergency-stop")
        .assert()
        .code(3)
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_str(String::from_utf8_lossy(&out).trim()).unwrap();
    assert_eq!(v["reason"], "TransportFault");
    assert_eq!(v["exit_code"], 3);
}

#[rstest]
#[case("[link]\nmode = \"sim\"\n[control]\npoll_hz = \"fast\"\n", "not valid TOML")]
#[case("[control]\npoll_hz = 10\n", "not valid TOML")]
#[case("[link]\nmode = \"sim\"\n[limits]\ndescent_min = 70.0\n", "Invalid configuration")]
fn bad_config_is_rejected(#[case] toml: &str, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    bandsaw()
        .arg("--config")
        .arg(&path)
        .arg("self-check")
        .assert()
        .code(5)
        .stderr(predicate::str::contains(needle));
}

#[rstest]
fn missing_config_file_is_explained() {
    bandsaw()
        .arg("--config")
        .arg("/nonexistent/bandsaw.toml")
        .arg("self-check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Could not read the config file"));
}

#[rstest]
fn cli_reports_bad_speed_table_header() {
    let dir = tempdir().unwrap();
    let bad_csv = dir.path().join("table.csv");
    let mut f = fs::File::create(&bad_csv).unwrap();
    writeln!(f, "height,cutting,descent").unwrap();
    writeln!(f, "100,90,40").unwrap();
    let cfg = write_sim_config(
        &dir,
        &format!("[linear]\ntable_csv = {:?}\n", bad_csv.display().to_string()),
    );

    bandsaw()
        .arg("--config")
        .arg(&cfg)
        .arg("run")
        .arg("--ticks")
        .arg("1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid headers"));
}

#[rstest]
fn diagnostics_are_written_per_strategy() {
    let dir = tempdir().unwrap();
    let diag = dir.path().join("diag");
    let cfg = write_sim_config(
        &dir,
        &format!("[diagnostics]\ndir = {:?}\n", diag.display().to_string()),
    );

    bandsaw()
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("run")
        .arg("--strategy")
        .arg("linear")
        .arg("--ticks")
        .arg("10")
        .assert()
        .success();

    let entries: Vec<String> = fs::read_dir(&diag)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(
        entries.iter().any(|n| n.contains("linear")),
        "files: {entries:?}"
    );
}
