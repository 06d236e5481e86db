//! Demo binary: wires up a small tree (two inputs, one observation
//! routed from one of them) and pushes a few samples through it,
//! exercising coercion, filtering, and handler dispatch end to end.

use anyhow::Context;
use data_hub::{DataHub, DataType, HubConfig, JsonFileBackupStore, Sample};

fn main() -> anyhow::Result<()> {
    data_hub::logging::init_logging(0, false).ok();

    let backup_dir = std::env::temp_dir().join("data_hub_demo_backups");
    let mut hub = DataHub::new(
        HubConfig::default(),
        Box::new(JsonFileBackupStore::new(backup_dir)),
    );
    let root = hub.root();

    let temperature = hub
        .get_input(root, "/sensors/outside/temperature", DataType::Numeric, "degC")
        .context("create temperature input")?;
    let alarm = hub
        .get_output(root, "/actuators/alarm", DataType::Boolean, "")
        .context("create alarm output")?;

    let smoothed = hub
        .get_observation(root, "/obs/outside/temperature_mean")
        .context("create observation")?;
    hub.set_source(smoothed, Some(temperature))?;
    hub.with_observation_mut(smoothed, |o| {
        o.set_buffer_max_count(8);
        o.set_transform(data_hub::TransformKind::Mean, Vec::new());
    });

    hub.add_handler(alarm, DataType::Boolean, |sample| {
        tracing::info!(value = ?sample.as_boolean(), "alarm state changed");
    })?;

    for (ts, value) in [(0.0, 18.0), (1.0, 19.5), (2.0, 40.0)] {
        hub.push(temperature, Sample::numeric(ts, value))?;
    }
    hub.push(alarm, Sample::boolean(3.0, true))?;

    if let Ok(mean) = hub.get_current_value(smoothed) {
        println!("smoothed temperature: {:?}", mean.as_numeric());
    }

    Ok(())
}
