use std::process::ExitCode;

use clap::Parser;

use cptlookup_server::ServerBuilder;
use cptlookup_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use cptlookup_server::observability;

#[derive(Debug, Parser)]
#[command(name = "cptlookup-server", version, about)]
struct Args {
    /// Configuration file
    #[arg(long, env = "CPTLOOKUP_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    observability::load_dotenv();
    observability::init_tracing("info");

    let args = Args::parse();
    let cfg = match load_config(Some(&args.config)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("cannot load {}: {e}", args.config);
            return ExitCode::from(2);
        }
    };
    observability::set_level(&cfg.logging.level);
    tracing::info!(path = %args.config, "configuration loaded");

    let server = match ServerBuilder::new().with_config(cfg).build().await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            eprintln!("startup failed: {e}");
            return ExitCode::from(2);
        }
    };

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server stopped");
            ExitCode::FAILURE
        }
    }
}
