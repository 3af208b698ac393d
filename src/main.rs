#![forbid(unsafe_code)]

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

use recap::environment::EnvKind;
use recap::launcher::LaunchMode;
use recap::run_cmd::{self, CaptureConfig};

#[derive(Parser, Debug)]
#[command(name = "recap", version)]
#[command(about = "Runs a job under a launch backend and records its runtime environment", long_about = None)]
struct Cli {
    /// Runtime launcher for the script or command
    #[arg(short, long, default_value = "cli", value_parser = ["cli", "shell", "bash", "slurm", "sge"])]
    launcher: String,

    /// Record name (defaults to recap-HH-MM-SS)
    #[arg(short, long)]
    name: Option<String>,

    /// Capture full version output rather than just the first line
    #[arg(long)]
    verbose_version: bool,

    /// Enable additional logging (or set RECAP_LOG)
    #[arg(short, long)]
    debug: bool,

    /// Environment manager for reproducible provisioning
    #[arg(long, value_enum, requires = "env_file")]
    env_type: Option<CliEnvKind>,

    /// Environment manifest file path
    #[arg(long, requires = "env_type")]
    env_file: Option<std::path::PathBuf>,

    /// Directory the record file is written to
    #[arg(short, long, default_value = ".")]
    output_dir: std::path::PathBuf,

    /// Launch command or script file to run, plus its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    script: Vec<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliEnvKind {
    Spack,
}

impl From<CliEnvKind> for EnvKind {
    fn from(kind: CliEnvKind) -> Self {
        match kind {
            CliEnvKind::Spack => EnvKind::Spack,
        }
    }
}

fn init_tracing(debug: bool) {
    let env = std::env::var("RECAP_LOG").unwrap_or_else(|_| {
        if debug { "recap=debug".to_string() } else { "recap=info".to_string() }
    });
    let _ = tracing_subscriber::fmt()
        .with_span_events(FmtSpan::ACTIVE)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_env_filter(EnvFilter::new(env))
        .try_init();
}

fn main() {
    color_eyre::install().ok();
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let launcher = match LaunchMode::resolve(&cli.launcher) {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let mut config = CaptureConfig::new(launcher, cli.script)
        .with_verbose_version(cli.verbose_version)
        .with_output_dir(cli.output_dir);
    if let Some(name) = cli.name {
        config = config.with_name(name);
    }
    if let (Some(kind), Some(file)) = (cli.env_type, cli.env_file) {
        config = config.with_environment(kind.into(), file);
    }

    if let Err(e) = run_cmd::run(config) {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}
