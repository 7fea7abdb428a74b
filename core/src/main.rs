use std::sync::Arc;

use eyre::WrapErr;
use lightrelay_core::{
    cli::{self, Command},
    extended_rpc::RpcHeaderSource,
    inspect::inspect_headers,
    maintainer::BitcoinDifficultyMaintainer,
    metrics::install_prometheus_exporter,
    relay::{LightRelay, RelayState},
    utils,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let args = cli::get_args_from_cli();

    match &args.command {
        Command::Inspect { headers_file } => {
            let bytes = utils::read_hex_file(headers_file)?;
            let report = inspect_headers(&bytes)
                .wrap_err_with(|| format!("Invalid headers in {}", headers_file.display()))?;
            println!("{report}");
        }
        Command::Maintain => {
            let config = cli::get_configuration(&args)?;

            if let Some(telemetry) = &config.telemetry {
                install_prometheus_exporter(telemetry)?;
            }

            let source = RpcHeaderSource::connect(
                config.bitcoin_rpc_url.clone(),
                &config.bitcoin_rpc_user,
                &config.bitcoin_rpc_password,
                config.maintainer.rpc_retry_count,
            )
            .await
            .wrap_err("Failed to connect to Bitcoin RPC")?;

            let relay = match &config.snapshot_path {
                Some(path) if path.exists() => {
                    tracing::info!("Restoring relay state from {}", path.display());
                    LightRelay::from_snapshot(RelayState::load(path)?, config.network)
                }
                _ => LightRelay::from_config(&config),
            };
            let relay = Arc::new(relay);
            let maintainer = BitcoinDifficultyMaintainer::new(source, relay, &config);
            maintainer
                .genesis_from_source(config.owner, config.genesis_height, config.proof_length)
                .await
                .wrap_err("Relay genesis failed")?;

            maintainer
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for Ctrl-C: {e}");
                    }
                })
                .await;

            let relay = maintainer.relay();
            if let Some(path) = &config.snapshot_path {
                relay.snapshot().save(path)?;
            }
            tracing::info!(
                "Relay stopped at epoch {}, covering blocks {:?}",
                relay.current_epoch()?,
                relay.get_relay_range()?
            );
        }
    }

    Ok(())
}
