//! Pipeline scenarios driven through the MockRunner, covering launch-mode
//! behavior and failure semantics without spawning real backends.

use std::collections::BTreeMap;
use std::io::Write;

use recap::RecapError;
use recap::environment::EnvKind;
use recap::launcher::LaunchMode;
use recap::run_cmd::{self, CaptureConfig};
use recap::runner::{MockRunner, RunOutput};

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn snapshot(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn host_stubs(runner: MockRunner) -> MockRunner {
    runner
        .on(["arch"], RunOutput::ok("x86_64\n"))
        .on(["hostname"], RunOutput::ok("node042\n"))
}

fn one_line_script(line: &str) -> tempfile::NamedTempFile {
    let mut script = tempfile::NamedTempFile::new().unwrap();
    writeln!(script, "{line}").unwrap();
    script.flush().unwrap();
    script
}

#[test]
fn shell_mode_uses_the_snapshot_shell_as_prefix_and_backend() {
    let script = one_line_script("env");
    let path = script.path().display().to_string();

    let runner = host_stubs(MockRunner::new())
        .on(["/bin/zsh", "--version"], RunOutput::ok("zsh 5.9\n"))
        .on(["env", "--version"], RunOutput::ok("env (GNU coreutils) 9.4\n"))
        .on(
            vec!["/bin/zsh".to_string(), path.clone()],
            RunOutput::ok("HOME=/root\n"),
        );

    let config = CaptureConfig::new(LaunchMode::Shell, vec![path.clone()]);
    let record = run_cmd::capture_with_env(
        &config,
        &runner,
        snapshot(&[("SHELL", "/bin/zsh")]),
    )
    .unwrap();

    assert_eq!(record.launch_mode.name, "shell");
    assert_eq!(record.launch_mode.version.as_deref(), Some("zsh 5.9"));
    assert_eq!(record.script_output, "HOME=/root\n");
    assert!(
        runner
            .calls()
            .contains(&vec!["/bin/zsh".to_string(), path.clone()])
    );
}

#[test]
fn shell_mode_without_shell_variable_fails_fast() {
    let script = one_line_script("env");
    let runner = host_stubs(MockRunner::new());

    let config = CaptureConfig::new(
        LaunchMode::Shell,
        vec![script.path().display().to_string()],
    );
    let err = run_cmd::capture_with_env(&config, &runner, BTreeMap::new()).unwrap_err();
    assert!(matches!(err, RecapError::EnvironmentMisconfigured(_)));
}

#[test]
fn slurm_mode_submits_through_sbatch() {
    let script = one_line_script("hostname");
    let path = script.path().display().to_string();

    let runner = host_stubs(MockRunner::new())
        .on(["sinfo", "-V"], RunOutput::ok("slurm 23.11.4\n"))
        .on(["hostname", "--version"], RunOutput::ok("hostname 3.23\n"))
        .on(
            vec!["sbatch".to_string(), path.clone()],
            RunOutput::ok("Submitted batch job 42\n"),
        );

    let config = CaptureConfig::new(LaunchMode::Slurm, vec![path.clone()]);
    let record = run_cmd::capture_with_env(&config, &runner, BTreeMap::new()).unwrap();

    assert_eq!(record.launch_mode.version.as_deref(), Some("slurm 23.11.4"));
    assert_eq!(record.script_output, "Submitted batch job 42\n");
    assert!(runner.calls().contains(&vec!["sbatch".to_string(), path]));
}

#[test]
fn sge_mode_submits_through_qsub_with_first_line_version() {
    let script = one_line_script("qstat -f");
    let path = script.path().display().to_string();

    let runner = host_stubs(MockRunner::new())
        .on(
            ["qstat", "--help"],
            RunOutput::ok("SGE 8.1.9\nusage: qstat [options]\n"),
        )
        .on(
            vec!["qsub".to_string(), path.clone()],
            RunOutput::ok("Your job 7 has been submitted\n"),
        );

    let config = CaptureConfig::new(LaunchMode::Sge, vec![path.clone()])
        .with_verbose_version(true);
    let record = run_cmd::capture_with_env(&config, &runner, BTreeMap::new()).unwrap();

    // verbose flag never widens the sge probe
    assert_eq!(record.launch_mode.version.as_deref(), Some("SGE 8.1.9"));
    // qstat in the script body is probed the same first-line-only way
    assert_eq!(record.executables["qstat"].version, "SGE 8.1.9");
}

#[test]
fn verbose_version_keeps_full_probe_output() {
    let runner = host_stubs(MockRunner::new())
        .on(
            ["echo", "--version"],
            RunOutput::ok("echo (GNU coreutils) 9.4\nCopyright (C) 2023\n"),
        )
        .on(["echo", "hi"], RunOutput::ok("hi\n"));

    let config = CaptureConfig::new(LaunchMode::Cli, args(&["echo", "hi"]))
        .with_verbose_version(true);
    let record = run_cmd::capture_with_env(&config, &runner, BTreeMap::new()).unwrap();
    assert_eq!(
        record.executables["echo"].version,
        "echo (GNU coreutils) 9.4\nCopyright (C) 2023"
    );
}

#[test]
fn unavailable_backend_aborts_before_version_sweep() {
    let script = one_line_script("hostname");

    let runner = host_stubs(MockRunner::new())
        .on(["sinfo", "-V"], RunOutput::failed(127, "command not found"));

    let config = CaptureConfig::new(
        LaunchMode::Slurm,
        vec![script.path().display().to_string()],
    );
    let err = run_cmd::capture_with_env(&config, &runner, BTreeMap::new()).unwrap_err();
    assert!(matches!(err, RecapError::BackendUnavailable { .. }));
    // nothing past the backend probe ran
    let programs: Vec<String> = runner.calls().iter().map(|c| c[0].clone()).collect();
    assert_eq!(programs, vec!["arch", "hostname", "sinfo"]);
}

#[test]
fn failed_job_discards_all_captured_work() {
    let runner = host_stubs(MockRunner::new())
        .on(["cat", "--version"], RunOutput::ok("cat 9.4\n"))
        .on(["cat", "/no/such/input"], RunOutput::failed(1, "No such file"));

    let config = CaptureConfig::new(LaunchMode::Cli, args(&["cat", "/no/such/input"]));
    let err = run_cmd::capture_with_env(&config, &runner, BTreeMap::new()).unwrap_err();
    assert!(matches!(err, RecapError::JobExecution { status, .. } if status == "code 1"));
}
