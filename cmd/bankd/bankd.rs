mod cli;
mod initializers;

use std::sync::Arc;

use bankd_config::BankConfig;
use bankd_p2p::Bank;
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli::CLI { opts, command } = cli::CLI::parse();
    initializers::init_tracing(&opts);

    if let Some(command) = command {
        return command.run(&opts);
    }

    let config = BankConfig::load(&opts.config_path)?;
    let store = initializers::init_store(&config)?;
    let bank = Arc::new(Bank::new(config, store));

    let mut server = {
        let bank = bank.clone();
        tokio::spawn(async move {
            bank.open()
                .await
                .inspect_err(|e| error!("Bank failed to start: {e}"))
        })
    };

    tokio::select! {
        // The accept loop only returns early on a fatal startup error.
        result = &mut server => result??,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down by user...");
            bank.close().await;
            let _ = server.await;
        }
    }

    info!("Application is shutting down");
    Ok(())
}
