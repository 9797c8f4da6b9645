mod app;
mod cli;

use anyhow::Result;

use crate::app::run_app;
use crate::cli::Config;
use proto_agent::logging::{init_logging, log_error};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_args();
    init_logging(config.verbose);

    if let Err(e) = run_app(config).await {
        log_error(&format!("{e:#}"));
        return Err(e);
    }

    Ok(())
}
