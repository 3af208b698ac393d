//! Version probes for external executables.
//!
//! Almost every tool answers `<tool> --version`; SGE's `qstat` is the one
//! exception (no machine-parsable full-version output), so it is probed with
//! `qstat --help` and always reduced to the first line.

use crate::runner::ProcessRunner;

/// Build the probe argv for `command`.
///
/// Returns the argv and whether the output must be reduced to its first line
/// regardless of the verbose flag (the qstat exception).
pub fn probe_argv(command: &str) -> (Vec<String>, bool) {
    if command == "qstat" {
        (vec![command.to_string(), "--help".to_string()], true)
    } else {
        (vec![command.to_string(), "--version".to_string()], false)
    }
}

/// Run the version probe for `command` and return the captured version text.
///
/// `verbose` keeps the full output; otherwise only the first line is kept.
/// A spawn failure or non-zero exit is returned as a reason string for the
/// caller to wrap into its own failure kind.
pub fn run_probe(
    runner: &dyn ProcessRunner,
    command: &str,
    verbose: bool,
) -> Result<String, String> {
    let (argv, first_line_only) = probe_argv(command);
    let output = runner.run(&argv).map_err(|e| e.to_string())?;

    if !output.success() {
        return Err(match output.code {
            Some(code) => format!("probe `{}` exited with code {code}", argv.join(" ")),
            None => format!("probe `{}` was killed by a signal", argv.join(" ")),
        });
    }

    let text = output.stdout;
    if first_line_only || !verbose {
        Ok(text.lines().next().unwrap_or_default().to_string())
    } else {
        Ok(text.trim_end().to_string())
    }
}
