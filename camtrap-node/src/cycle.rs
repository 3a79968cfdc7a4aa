//! One wake cycle, start to power-off
//!
//! ```text
//! ATE0 -> probe until reachable -> settle -> open broker session
//!      -> observe channel  ||  read modem clock
//!      -> reconcile (live pair, else both from store)
//!      -> publish retained + save
//!      -> decide
//!         SleepFor(d):  flush broker, power off for d
//!         CaptureNow:   capture, telemetry, advance last wake,
//!                       flush broker, power off for one interval
//! ```
//!
//! The power controller write is always the last action: the supply can
//! drop as soon as it is accepted.

use std::time::Duration;

use camtrap_connectors::{
    ConnectorError, Modem, PowerController, ReachabilityMonitor, ScheduleChannel,
};
use camtrap_core::constants::time::{
    CAPTURE_SETTLE, OBSERVATION_WINDOW, REGISTRATION_SETTLE, US_PER_SECOND,
};
use camtrap_core::{
    decide, CommandLink, EnvironmentSensor, FileScheduleStore, PeripheralBus,
    ScheduleObservation, ScheduleResult, ScheduleState, SensorQuery, Timestamp, WakeDecision,
};
use tokio::time::sleep;

use crate::capture::CapturePipeline;
use crate::error::CycleError;

/// Where the schedule used for this cycle came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleSource {
    /// Both values arrived on the time channel
    Live,
    /// Both values were loaded from the fallback store
    Fallback,
}

/// What a finished cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Schedule the decision was made against
    pub schedule: ScheduleState,
    /// Live or fallback
    pub source: ScheduleSource,
    /// Modem clock at the start of the cycle, if it answered
    pub clock: Option<Timestamp>,
    /// Decision taken against `schedule` and `clock`
    pub decision: WakeDecision,
    /// Duration handed to the power controller
    pub sleep_micros: u64,
}

/// Pick the schedule for this cycle
///
/// A complete, well-formed observation wins. Anything else loads *both*
/// values from the store; a live value is never paired with a stored one.
pub fn reconcile(
    observation: ScheduleObservation,
    store: &FileScheduleStore,
) -> ScheduleResult<(ScheduleState, ScheduleSource)> {
    match observation.resolve() {
        Ok(schedule) => {
            log::info!(
                "Using live schedule: last wake {}, every {}h",
                schedule.last_wake,
                schedule.interval
            );
            Ok((schedule, ScheduleSource::Live))
        }
        Err(e) => {
            log::warn!("No usable live schedule ({e}), loading fallback");
            let schedule = store.load()?;
            log::info!(
                "Using fallback schedule: last wake {}, every {}h",
                schedule.last_wake,
                schedule.interval
            );
            Ok((schedule, ScheduleSource::Fallback))
        }
    }
}

/// The wake-cycle orchestrator
///
/// Owns every device handle for the duration of one cycle.
pub struct WakeCycle<L, C, B> {
    modem: Modem<L>,
    monitor: ReachabilityMonitor,
    channel: C,
    power: PowerController<B>,
    store: FileScheduleStore,
    sensor: Box<dyn EnvironmentSensor>,
    capture: Box<dyn CapturePipeline>,
}

impl<L, C, B> WakeCycle<L, C, B>
where
    L: CommandLink,
    C: ScheduleChannel,
    B: PeripheralBus,
{
    /// Cycle with the default reachability monitor
    ///
    /// The channel must not have been connected yet; `run` opens it once
    /// the network is reachable.
    pub fn new(
        modem: Modem<L>,
        channel: C,
        power: PowerController<B>,
        store: FileScheduleStore,
        sensor: Box<dyn EnvironmentSensor>,
        capture: Box<dyn CapturePipeline>,
    ) -> Self {
        Self {
            modem,
            monitor: ReachabilityMonitor::default(),
            channel,
            power,
            store,
            sensor,
            capture,
        }
    }

    /// Replace the default probe budget and backoff
    pub fn with_monitor(mut self, monitor: ReachabilityMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    /// The modem handle
    pub fn modem(&self) -> &Modem<L> {
        &self.modem
    }

    /// The schedule channel
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// The power controller
    pub fn power(&self) -> &PowerController<B> {
        &self.power
    }

    /// Run the cycle to the power-off command
    pub async fn run(&mut self) -> Result<CycleReport, CycleError> {
        match self.modem.init().await {
            Ok(()) => {}
            Err(ConnectorError::CommandRejected { response, .. }) => {
                log::warn!("Modem refused echo-off: {response:?}");
            }
            Err(e) => return Err(e.into()),
        }

        self.monitor.wait_until_reachable(&mut self.modem).await?;
        sleep(REGISTRATION_SETTLE).await;

        if let Err(e) = self.channel.connect().await {
            log::warn!("Broker session failed to open: {e}");
        }

        let (observation, clock) = tokio::join!(
            self.channel.observe(OBSERVATION_WINDOW),
            self.modem.read_clock()
        );
        let observation = observation.unwrap_or_else(|e| {
            log::warn!("Time channel unavailable: {e}");
            ScheduleObservation::default()
        });
        let clock = clock.unwrap_or_else(|e| {
            log::warn!("Modem clock unreadable: {e}");
            None
        });

        let (schedule, source) = reconcile(observation, &self.store)?;
        if let Err(e) = self.channel.publish_schedule(&schedule).await {
            log::warn!("Failed to publish schedule: {e}");
        }
        self.persist(&schedule);

        let decision = match &clock {
            Some(now) => decide(now, &schedule),
            None => {
                log::error!("No authoritative clock, skipping capture");
                WakeDecision::SleepFor(schedule.interval.as_duration())
            }
        };
        log::info!("Decision: {decision:?} (clock {clock:?}, source {source:?})");

        let sleep_for = match (decision, &clock) {
            (WakeDecision::CaptureNow, Some(now)) => {
                self.capture_and_publish(&schedule, now).await;
                schedule.interval.as_duration()
            }
            (WakeDecision::SleepFor(d), _) => d,
            (WakeDecision::CaptureNow, None) => schedule.interval.as_duration(),
        };

        if let Err(e) = self.channel.shutdown().await {
            log::warn!("Broker shutdown failed: {e}");
        }

        let sleep_micros = micros(sleep_for);
        log::info!("Sleeping for {}s", sleep_for.as_secs());
        self.power.schedule_sleep(sleep_micros).await?;

        Ok(CycleReport {
            schedule,
            source,
            clock,
            decision,
            sleep_micros,
        })
    }

    async fn capture_and_publish(&mut self, schedule: &ScheduleState, now: &Timestamp) {
        let detections = match self.capture.capture().await {
            Ok(output) => Some(output),
            Err(e) => {
                log::error!("Capture failed: {e}");
                None
            }
        };
        sleep(CAPTURE_SETTLE).await;

        if let Err(e) = self.channel.publish_last_wake(now).await {
            log::warn!("Failed to publish last wake: {e}");
        }
        for query in SensorQuery::ALL {
            let value = match self.sensor.read(query) {
                Ok(v) => Some(v),
                Err(e) => {
                    log::warn!("Sensor read {query:?} failed: {e}");
                    None
                }
            };
            if let Err(e) = self.channel.publish_telemetry(query, value).await {
                log::warn!("Failed to publish {query:?}: {e}");
            }
        }
        if let Some(output) = detections {
            if let Err(e) = self.channel.publish_detections(&output).await {
                log::warn!("Failed to publish detections: {e}");
            }
        }

        self.persist(&schedule.advanced_to(now.clone()));
    }

    fn persist(&self, schedule: &ScheduleState) {
        if let Err(e) = self.store.save(schedule) {
            log::error!("Failed to persist schedule: {e}");
        }
    }
}

fn micros(duration: Duration) -> u64 {
    duration.as_secs().saturating_mul(US_PER_SECOND)
}
