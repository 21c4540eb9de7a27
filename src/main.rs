use eventkit::demo::{
    spawn_notification_expiry, CounterControls, CounterDisplay, CounterLogger, NotificationCenter,
};
use eventkit::{
    event_bus, init_event_bus, init_logging, names, show_notification, NotificationKind, Settings,
};
use std::path::PathBuf;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;

    // Initialize logging
    init_logging(&settings.logging)?;
    tracing::info!(
        version = eventkit::VERSION,
        built = eventkit::BUILD_DATE,
        "Starting EventKit demo"
    );

    init_event_bus(settings.bus_config());
    let bus = event_bus();
    bus.set_failure_handler(|failure| tracing::warn!("Listener failure reported: {}", failure));

    let counter_display = CounterDisplay::new(&bus)?;
    let logger = CounterLogger::new(&bus)?;
    let mut controls = CounterControls::new(&bus);

    controls.increment()?;
    controls.increment()?;
    controls.decrement()?;
    controls.reset()?;
    controls.increment()?;
    tracing::info!(value = counter_display.value(), "Counter display");
    for line in logger.entries().iter().rev() {
        tracing::info!("{}", line);
    }

    let notifications = NotificationCenter::new(&bus)?;
    let expiry = spawn_notification_expiry(&bus);

    show_notification(&bus, "Counter demo finished", NotificationKind::Success, Some(200))?;
    show_notification(&bus, "This one stays", NotificationKind::Info, None)?;
    bus.publish_empty(names::APP_INITIALIZED)?;
    tracing::info!(active = notifications.active().len(), "Notifications shown");

    tokio::time::sleep(Duration::from_millis(300)).await;
    tracing::info!(active = notifications.active().len(), "Notifications after expiry");

    expiry.abort();
    Ok(())
}
