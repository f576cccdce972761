//! The fan control loop

use crate::{
    actuator::Actuator,
    config::ControllerConfig,
    curve::{self, FanSpeed},
    errors::{DellFanError, Result},
    sensor::{self, Sensor},
    supervisor::Supervisor,
};
use log::{debug, error, info, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

mod signals;

pub use self::signals::ShutdownSignals;

/// Outcome of one sense, decide, act cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub channel: String,
    pub temperature: f64,
    pub speed: FanSpeed,
}

impl CycleReport {
    /// `--print` output: temperature and speed fraction
    pub fn print_line(&self) -> String {
        format!("{:?} {:?}", self.temperature, self.speed.fraction())
    }

    /// Text handed to the supervisor as the unit status
    pub fn status(&self) -> String {
        format!(
            "Temperature={}°C Fan Speed={}%",
            self.temperature,
            self.speed.percent()
        )
    }
}

/// Fixed-rate schedule that never stacks up missed ticks
///
/// Deadlines advance by whole periods from the previous deadline, so short
/// cycles do not drift. When a cycle overruns past the next deadline the
/// following cycle fires at once and the schedule restarts from that moment.
#[derive(Debug, Clone)]
pub struct Cadence {
    period: Duration,
    next: Instant,
}

impl Cadence {
    /// The first deadline is `start`, so the first cycle runs immediately
    pub fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            next: start,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.next
    }

    /// Called when a cycle fires at `now`; returns the deadline of the one after
    pub fn advance(&mut self, now: Instant) -> Instant {
        let next = self.next + self.period;
        self.next = if next > now { next } else { now + self.period };
        self.next
    }
}

/// Holds the BMC in manual fan mode until released
///
/// `release` hands control back to the BMC and reports the result. If the
/// guard is dropped without being released, automatic control is restored
/// anyway and any error is only logged.
pub struct ManualFanControl<A: Actuator> {
    actuator: A,
    released: bool,
}

impl<A: Actuator> ManualFanControl<A> {
    /// Disable automatic control. On failure nothing needs undoing.
    pub fn acquire(actuator: A) -> Result<Self> {
        info!("Disabling automatic fan control");
        actuator.disable_automatic_control()?;
        Ok(Self {
            actuator,
            released: false,
        })
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn release(mut self) -> Result<()> {
        self.released = true;
        info!("Enabling automatic fan control");
        self.actuator.enable_automatic_control()
    }
}

impl<A: Actuator> Drop for ManualFanControl<A> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!("Fan control dropped without release, enabling automatic fan control");
        if let Err(e) = self.actuator.enable_automatic_control() {
            error!("Failed to enable automatic fan control: {}", e);
        }
    }
}

/// One-shot `--cleanup`: give fan control back to the BMC
pub fn cleanup<A: Actuator>(actuator: &A) -> Result<()> {
    actuator.enable_automatic_control()
}

/// Main daemon structure
pub struct FanDaemon<S, A, V> {
    config: ControllerConfig,
    sensor: S,
    actuator: A,
    supervisor: V,
    print: bool,
}

impl<S: Sensor, A: Actuator, V: Supervisor> FanDaemon<S, A, V> {
    pub fn new(config: ControllerConfig, sensor: S, actuator: A, supervisor: V) -> Self {
        Self {
            config,
            sensor,
            actuator,
            supervisor,
            print: false,
        }
    }

    /// Print `temperature speed` to stdout after every cycle
    pub fn with_print(mut self, print: bool) -> Self {
        self.print = print;
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Read the hottest channel, apply the curve, command the fans
    pub fn step(&self) -> Result<CycleReport> {
        let readings = self.sensor.read_temperatures()?;
        let hottest = sensor::hottest(&readings)?;
        let speed = curve::target_speed(hottest.celsius, self.config.min_speed());

        debug!(
            "{} at {}°C -> {} ({} channels)",
            hottest.channel,
            hottest.celsius,
            speed,
            readings.len()
        );
        self.actuator.set_fan_speed_percent(speed.percent())?;

        Ok(CycleReport {
            channel: hottest.channel.clone(),
            temperature: hottest.celsius,
            speed,
        })
    }

    fn report(&self, cycle: &CycleReport) {
        if self.print {
            println!("{}", cycle.print_line());
        }

        if let Err(e) = self.supervisor.notify_watchdog() {
            debug!("Watchdog notification failed: {}", e);
        }
        if let Err(e) = self.supervisor.notify_status(&cycle.status()) {
            debug!("Status notification failed: {}", e);
        }
    }

    /// Run until `shutdown` resolves or a cycle fails
    ///
    /// Automatic fan control is disabled first; failing that is returned as
    /// is. Once it has been disabled it is always re-enabled before this
    /// returns, whether the loop stopped on request or on error.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let period = self.config.poll_interval();
        if let Some(timeout) = self.supervisor.watchdog_timeout() {
            if period * 2 > timeout {
                warn!(
                    "Poll rate {:?} is more than half the watchdog timeout {:?}",
                    period, timeout
                );
            }
        }

        let control = ManualFanControl::acquire(&self.actuator)?;

        if let Err(e) = self.supervisor.notify_ready() {
            warn!("Failed to notify supervisor of readiness: {}", e);
        }

        info!("Entering the feedback loop");
        let outcome = self.drive(period, shutdown).await;
        if let Err(ref e) = outcome {
            error!("Control loop failed: {}", e);
        }

        if let Err(e) = self.supervisor.notify_stopping() {
            debug!("Stopping notification failed: {}", e);
        }
        let released = control.release();
        if let Err(ref e) = released {
            error!("Failed to enable automatic fan control: {}", e);
        }

        match (outcome, released) {
            (Err(cause), Err(release)) => Err(DellFanError::ReleaseFailed {
                cause: Box::new(cause),
                release: Box::new(release),
            }),
            (outcome, released) => outcome.and(released),
        }
    }

    async fn drive<F>(&self, period: Duration, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut cadence = Cadence::new(period, Instant::now());

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                _ = sleep_until(cadence.deadline()) => {}
            }
            cadence.advance(Instant::now());

            let cycle = self.step()?;
            self.report(&cycle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::TemperatureReading;
    use crate::supervisor::NoSupervisor;
    use std::cell::RefCell;

    fn daemon<S: Sensor>(sensor: S) -> FanDaemon<S, Recorder, NoSupervisor> {
        FanDaemon::new(
            ControllerConfig::default(),
            sensor,
            Recorder::default(),
            NoSupervisor,
        )
    }

    #[derive(Default)]
    struct Recorder(RefCell<Vec<String>>);

    impl Actuator for Recorder {
        fn disable_automatic_control(&self) -> Result<()> {
            self.0.borrow_mut().push("disable".into());
            Ok(())
        }

        fn enable_automatic_control(&self) -> Result<()> {
            self.0.borrow_mut().push("enable".into());
            Ok(())
        }

        fn set_fan_speed_percent(&self, percent: u8) -> Result<()> {
            self.0.borrow_mut().push(format!("set {}", percent));
            Ok(())
        }
    }

    struct Fixed(Vec<f64>);

    impl Sensor for Fixed {
        fn read_temperatures(&self) -> Result<Vec<TemperatureReading>> {
            Ok(self
                .0
                .iter()
                .enumerate()
                .map(|(i, t)| TemperatureReading::new(format!("Core {}", i), *t))
                .collect())
        }
    }

    struct Broken;

    impl Sensor for Broken {
        fn read_temperatures(&self) -> Result<Vec<TemperatureReading>> {
            Err(DellFanError::SensorUnavailable("unplugged".into()))
        }
    }

    #[test]
    fn test_cadence_keeps_phase_for_short_cycles() {
        let start = Instant::now();
        let period = Duration::from_secs(10);
        let mut cadence = Cadence::new(period, start);
        assert_eq!(cadence.deadline(), start);

        // Fired on time
        assert_eq!(cadence.advance(start), start + period);
        assert_eq!(cadence.deadline(), start + period);

        // Woke 50ms late; still anchored to the previous deadline
        let late = start + period + Duration::from_millis(50);
        assert_eq!(cadence.advance(late), start + period * 2);
    }

    #[test]
    fn test_cadence_fires_immediately_after_overrun() {
        let start = Instant::now();
        let period = Duration::from_secs(10);
        let mut cadence = Cadence::new(period, start);
        cadence.advance(start);

        // The cycle at t=0 ran for 25s, so the t=10 deadline is long past
        let now = start + Duration::from_secs(25);
        assert!(cadence.deadline() <= now);
        assert_eq!(cadence.advance(now), now + period);
    }

    #[test]
    fn test_step_uses_hottest_channel_and_floor() {
        let hot = daemon(Fixed(vec![38.0, 55.0, 47.0]));

        let report = hot.step().unwrap();
        assert_eq!(report.channel, "Core 1");
        assert_eq!(report.speed.percent(), 25);
        assert_eq!(report.status(), "Temperature=55°C Fan Speed=25%");
        assert_eq!(report.print_line(), "55.0 0.25");

        let cold = daemon(Fixed(vec![25.0]));
        let report = cold.step().unwrap();
        assert_eq!(report.speed.percent(), 18);
        assert_eq!(report.print_line(), "25.0 0.18");
        assert_eq!(*cold.actuator.0.borrow(), vec!["set 18".to_string()]);
    }

    #[test]
    fn test_step_propagates_sensor_failure_without_actuating() {
        let broken = daemon(Broken);
        assert!(matches!(broken.step(), Err(DellFanError::SensorUnavailable(_))));
        assert!(broken.actuator.0.borrow().is_empty());
    }

    #[test]
    fn test_guard_release_enables_once() {
        let actuator = Recorder::default();
        let control = ManualFanControl::acquire(&actuator).unwrap();
        control.release().unwrap();
        assert_eq!(*actuator.0.borrow(), vec!["disable", "enable"]);
    }

    #[test]
    fn test_guard_drop_enables() {
        let actuator = Recorder::default();
        {
            let control = ManualFanControl::acquire(&actuator).unwrap();
            control.actuator().set_fan_speed_percent(40).unwrap();
        }
        assert_eq!(*actuator.0.borrow(), vec!["disable", "set 40", "enable"]);
    }

    #[test]
    fn test_cleanup_only_enables() {
        let actuator = Recorder::default();
        cleanup(&actuator).unwrap();
        assert_eq!(*actuator.0.borrow(), vec!["enable"]);
    }
}
