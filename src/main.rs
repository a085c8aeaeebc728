pub mod bus;
pub mod clock;
pub mod config;
pub mod sensor;
pub mod session;

use crate::clock::{open_wall_clock, MonotonicUptime};
use crate::config::{config_path, Config};
use crate::sensor::TouchArray;
use crate::session::controller::{Idle, PollStats, SessionController, SessionSettings};
use crate::session::{DirectoryStorage, EventLog, GpioTrigger, LogStorage, Trigger};
use color_eyre::{eyre::eyre, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let uptime = MonotonicUptime::start();
    setup()?;

    let config = Config::load().await?;
    setup_logging(&config);
    info!("Using configuration {}", config_path().display());

    // Every failure below leaves the rig unable to record and needs an operator
    let wall_clock = open_wall_clock(&config.clock).inspect_err(|e| error!("{}", e))?;
    let sensors = TouchArray::open(&config.sensors)?;
    let storage = DirectoryStorage::new(&config.storage);
    storage.check().inspect_err(|e| error!("{}", e))?;
    let mut trigger = GpioTrigger::open(config.session.trigger_pin).inspect_err(|e| error!("{}", e))?;
    info!("System ready.");

    let controller = SessionController::<Idle>::create(
        SessionSettings::from(&config),
        sensors,
        EventLog::new(Box::new(storage)),
        wall_clock,
        Box::new(uptime),
    );

    let cancel = CancellationToken::new();
    let session_cancel = cancel.clone();
    let mut session =
        tokio::task::spawn_blocking(move || run_session(controller, &mut trigger, &session_cancel));

    let outcome = tokio::select! {
        outcome = &mut session => outcome,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, stopping session");
            cancel.cancel();
            session.await
        }
    };

    match outcome.map_err(|e| eyre!("Session task failed: {}", e))? {
        Some(stats) => info!(
            "Session ended after {} cycles with {} events",
            stats.cycles, stats.events
        ),
        None => info!("No session was started"),
    }
    Ok(())
}

// Idle → Initializing → Polling on the blocking thread
fn run_session(
    controller: SessionController<Idle>,
    trigger: &mut dyn Trigger,
    cancel: &CancellationToken,
) -> Option<PollStats> {
    let polling = controller.wait_for_trigger(trigger, cancel)?.initialize();
    Some(polling.run(cancel))
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging(config: &Config) {
    FmtSubscriber::builder()
        .with_max_level(config.logging.max_level())
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
