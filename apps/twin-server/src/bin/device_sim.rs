use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use twin_server::mode::ModeSignal;
use twin_server::simulator::{run_console, Simulator, SimulatorConfig};

#[derive(Parser, Debug)]
#[command(
    name = "device-sim",
    version,
    about = "Synthetic battery device posting telemetry to twin-server"
)]
struct Args {
    #[arg(long, env = "SIM_SERVER_URL", default_value = "http://127.0.0.1:5000/api/battery-data")]
    server_url: String,
    #[arg(long, env = "SIM_BATTERY_ID", default_value = "EV48V_SIM_01")]
    battery_id: String,
    #[arg(long, default_value_t = 2_000)]
    interval_ms: u64,
    /// Shared with the server's TWIN_MODE_PATH.
    #[arg(long, env = "TWIN_MODE_PATH", default_value = "mode.txt")]
    mode_path: PathBuf,
    #[arg(long, default_value_t = 2_000)]
    request_timeout_ms: u64,
    #[arg(long, default_value_t = 37.7749, allow_hyphen_values = true)]
    latitude: f64,
    #[arg(long, default_value_t = -122.4194, allow_hyphen_values = true)]
    longitude: f64,
    #[arg(long)]
    seed: Option<u64>,
    /// Disable the c/d stdin mode switch.
    #[arg(long, default_value_t = false)]
    no_console: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mode = ModeSignal::new(args.mode_path);
    let simulator = Simulator::new(
        SimulatorConfig {
            server_url: args.server_url,
            battery_id: args.battery_id,
            interval: Duration::from_millis(args.interval_ms.max(1)),
            request_timeout: Duration::from_millis(args.request_timeout_ms.max(1)),
            latitude: args.latitude,
            longitude: args.longitude,
            seed: args.seed,
        },
        mode.clone(),
    )?;

    let cancel = CancellationToken::new();
    if !args.no_console {
        tracing::info!("press c + Enter for charging, d + Enter for driving");
        tokio::spawn(run_console(mode, cancel.clone()));
    }

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    simulator.run(cancel).await;
    if !args.no_console {
        // The blocking stdin read cannot be interrupted; exit instead of waiting on it.
        std::process::exit(0);
    }
    Ok(())
}
