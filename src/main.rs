//! pitkeeper binary: loads the configuration, acquires the Bluetooth
//! adapter, and runs the control loop until a termination signal.

use tracing::info;

use pitkeeper::ble::BleCentral;
use pitkeeper::config::Config;
use pitkeeper::controller::PitController;
use pitkeeper::display::StatusLogger;
use pitkeeper::manager::ProbeManager;
use pitkeeper::motor::NullMotor;
use pitkeeper::orchestrator::Orchestrator;
use pitkeeper::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "pitkeeper.toml".to_string());
    let config = Config::load(&config_path)?;
    info!(
        path = %config_path,
        set_point = config.set_point,
        unit = %config.units,
        "configuration loaded"
    );

    let (events_tx, events_rx) = tokio::sync::mpsc::channel(64);

    let central = BleCentral::new().await?;
    let manager = ProbeManager::new(central, config.units, events_tx);
    let controller = PitController::new(&config);

    let orchestrator = Orchestrator::new(
        controller,
        manager,
        events_rx,
        NullMotor,
        StatusLogger,
        config.fan.reverse,
    );

    orchestrator.run().await
}
