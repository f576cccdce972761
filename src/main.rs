//! Main entry point for the fan controller

use anyhow::Context;
use clap::Parser;
use dellfan::{
    actuator::IpmiActuator,
    args::Args,
    curve,
    daemon::{self, FanDaemon, ShutdownSignals},
    logging,
    sensor::HwmonSensor,
    supervisor::{NoSupervisor, Supervisor, SystemdNotifier},
    ControllerConfig,
};
use log::{info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Print version and build metadata for binary identity verification
    eprintln!(
        "dellfan v{} (git {}) built {}",
        env!("CARGO_PKG_VERSION"),
        option_env!("DELLFAN_GIT_HASH").unwrap_or("unknown"),
        option_env!("DELLFAN_BUILD_TIME").unwrap_or("unknown"),
    );
    let args = Args::parse();

    logging::setup(args.verbose).context("failed to set up logging")?;

    if args.dump_curve {
        // Useful for debugging
        let stdout = std::io::stdout();
        curve::dump(&mut stdout.lock(), curve::DUMP_RANGE).context("failed to print curve")?;
        return Ok(());
    }

    let actuator = IpmiActuator::new(&args.ipmitool).with_args(&args.ipmi_args);

    if args.cleanup {
        println!("Enabling automatic fan control");
        daemon::cleanup(&actuator).context("failed to re-enable automatic fan control")?;
        return Ok(());
    }

    let (config, warnings) = ControllerConfig::new(args.poll_rate, args.min_speed);
    for warning in &warnings {
        warn!("{}", warning);
    }
    info!(
        "Poll rate {:?}, minimum speed {}",
        config.poll_interval(),
        config.min_speed()
    );

    let signals = ShutdownSignals::install().context("failed to install signal handlers")?;

    let sensor = HwmonSensor::discover(&args.hwmon_root, &args.sensor_chip)
        .context("failed to find a temperature sensor")?;
    info!(
        "Reading '{}' channels: {}",
        sensor.chip(),
        sensor.channel_ids().collect::<Vec<_>>().join(", ")
    );

    let supervisor: Box<dyn Supervisor> = match SystemdNotifier::from_env() {
        Ok(Some(notifier)) => Box::new(notifier),
        Ok(None) => Box::new(NoSupervisor),
        Err(e) => {
            warn!("Not reporting to systemd: {}", e);
            Box::new(NoSupervisor)
        }
    };

    FanDaemon::new(config, sensor, actuator, supervisor)
        .with_print(args.print)
        .run(async {
            signals.recv().await;
        })
        .await
        .context("fan control loop failed")?;

    info!("daemon exited from loop");
    Ok(())
}
