mod commands;

use bringup_schema::RunMode;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{Session, EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_STORE_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "bringup",
    version,
    about = "Bring up network appliances: switch network modes safely and install services"
)]
struct Cli {
    /// Path to the deployment config file.
    #[arg(short, long, default_value = "bringup.toml", global = true)]
    config: PathBuf,

    /// Target address, overriding target.address from the config.
    #[arg(long, global = true)]
    target: Option<String>,

    /// Local state directory for run logs, snapshot index and locks.
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a deployment against the target.
    Deploy {
        /// Network mode to switch to: forward, reverse or none.
        #[arg(long, default_value = "none")]
        mode: RunMode,
        /// Comma-separated steps (network, verify, dns, runtime, services,
        /// service:<name>, credential) or "all".
        #[arg(long, default_value = "all")]
        steps: String,
    },
    /// Take a configuration snapshot on the target.
    Backup,
    /// Restore a configuration snapshot.
    Restore {
        /// Snapshot id; the target's latest snapshot when omitted.
        snapshot: Option<String>,
        /// Do not ask for confirmation.
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },
    /// Delete a retained snapshot from the target and the local index.
    Cleanup {
        /// Snapshot id.
        snapshot: String,
        /// Do not ask for confirmation.
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },
    /// List known snapshots.
    Snapshots {
        /// Include snapshots of every target, not only the configured one.
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    /// List recorded runs, or show one run's log.
    Runs {
        /// Run id to show in full.
        run_id: Option<String>,
    },
    /// Check target reachability and upstream connectivity without changing anything.
    Verify,
    /// Show the target's current network mode.
    Status,
    /// Run diagnostic checks on this host and the target.
    Doctor,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("BRINGUP_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let result = dispatch(cli);

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("config error:") {
                EXIT_CONFIG_ERROR
            } else if msg.starts_with("store error:") {
                EXIT_STORE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn dispatch(cli: Cli) -> Result<u8, String> {
    let json = cli.json;
    let session = || Session::load(&cli.config, cli.target.as_deref(), cli.state_dir.as_deref());
    match cli.command {
        Commands::Deploy { mode, steps } => commands::deploy::run(&session()?, mode, &steps, json),
        Commands::Backup => commands::backup::run(&session()?, json),
        Commands::Restore { snapshot, yes } => {
            commands::restore::run(&session()?, snapshot.as_deref(), yes, json)
        }
        Commands::Cleanup { snapshot, yes } => {
            commands::cleanup::run(&session()?, &snapshot, yes, json)
        }
        Commands::Snapshots { all } => commands::snapshots::run(&session()?, all, json),
        Commands::Runs { run_id } => commands::runs::run(&session()?, run_id.as_deref(), json),
        Commands::Verify => commands::verify::run(&session()?, json),
        Commands::Status => commands::status::run(&session()?, json),
        Commands::Doctor => commands::doctor::run(&session()?, json),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    }
}
