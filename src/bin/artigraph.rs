//! Bootstraps the artifact metadata graph once and exits.
#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use artigraph::{BootstrapConfig, GraphError, Orchestrator};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "artigraph",
    version,
    about = "Bootstrap the artifact metadata graph and run a smoke test"
)]
struct Cli {
    #[arg(
        long,
        env = "ARTIGRAPH_CONFIG",
        value_name = "FILE",
        help = "Bootstrap configuration file (TOML)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        value_name = "DIR",
        help = "Storage data directory; a scratch directory when omitted"
    )]
    data_dir: Option<PathBuf>,

    #[arg(long, help = "Keyspace holding the graph")]
    keyspace: Option<String>,

    #[arg(long, help = "Close the graph at exit instead of dropping its keyspace")]
    keep_keyspace: bool,
}

fn main() -> ExitCode {
    install_tracing_subscriber();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, code = err.exit_code(), "artigraph.exit");
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<(), GraphError> {
    let mut config = BootstrapConfig::load(cli.config)?;
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = Some(dir);
    }
    if let Some(keyspace) = cli.keyspace {
        config.graph.keyspace = keyspace;
    }
    if cli.keep_keyspace {
        config.graph.keep_keyspace = true;
    }
    config.validate()?;

    let mut orchestrator = Orchestrator::new(config);
    let report = orchestrator.run()?;
    info!(
        endpoint = %report.endpoint,
        keyspace = %report.keyspace,
        created = report.schema.created,
        existing = report.schema.existing,
        index_polls = report.indexes.polls,
        vertex = %report.demo.vertex,
        "artigraph.bootstrap_complete"
    );
    Ok(())
}

fn install_tracing_subscriber() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}
