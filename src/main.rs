use anyhow::Result;
use tracing::{error, info};

use scroll_harvester::cli;
use scroll_harvester::utils::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = cli::parse_args();

    // Initialize logging
    logging::init_logging(args.verbose, None)?;

    info!("Starting Scroll Harvester v{}", env!("CARGO_PKG_VERSION"));

    // Process commands
    match cli::process_command(args).await {
        Ok(_) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {}", e);
            Err(e)
        }
    }
}
