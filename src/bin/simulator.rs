//! Synthetic load generator for the ingestion API.
//!
//! Registers each configured device (unless `SIMULATOR_REGISTER=false`) and
//! then posts randomized readings for it on a fixed interval. Devices run one
//! after another; start several processes to simulate devices concurrently.
use anyhow::Result;
use dotenvy::dotenv;
use reqwest::Client;

use infra_telemetry::simulator::Simulator;
use infra_telemetry::{config, logging};

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    logging::init_tracing();

    let cfg = config::load_simulator_from_env()?;
    cfg.log_config();

    let client = Client::builder().timeout(cfg.interval).build()?;

    for device in cfg.devices {
        let simulator = Simulator::new(device, client.clone(), cfg.api_url.as_str());

        if cfg.register && !simulator.register().await {
            tracing::warn!(
                "Could not register {}, its readings may be rejected",
                simulator.device().id
            );
        }

        let accepted = simulator.run(cfg.interval, cfg.duration).await;
        tracing::info!("{}: {} readings accepted", simulator.device().id, accepted);
    }

    Ok(())
}
