//! Cellular modem: reachability probe and clock reader
//!
//! Both run over the single [`AtTransport`] from the control thread.

use std::time::Duration;

use camtrap_core::constants::modem::{CMD_CLOCK, CMD_ECHO_OFF, CMD_REGISTRATION, CMD_SIGNAL_QUALITY};
use camtrap_core::constants::time::{
    CLOCK_SETTLE, COMMAND_TIMEOUT, DEFAULT_MAX_PROBES, PROBE_BACKOFF,
};
use camtrap_core::modem::{is_registered, parse_signal_quality, signal_in_range};
use camtrap_core::{CommandLink, ReachabilityPolicy, ReachabilityStatus, Timestamp};
use tokio::time::sleep;

use crate::transport::AtTransport;
use crate::ConnectorError;

/// Anything that can answer "is the network usable right now?"
#[async_trait::async_trait]
pub trait Probe: Send {
    /// Run one probe
    async fn probe(&mut self) -> ReachabilityStatus;
}

/// The modem behind an AT transport
pub struct Modem<L> {
    transport: AtTransport<L>,
    policy: ReachabilityPolicy,
    command_timeout: Duration,
    clock_settle: Duration,
}

impl<L: CommandLink> Modem<L> {
    /// Modem with default timings and registration-only reachability
    pub fn new(transport: AtTransport<L>) -> Self {
        Self {
            transport,
            policy: ReachabilityPolicy::default(),
            command_timeout: COMMAND_TIMEOUT,
            clock_settle: CLOCK_SETTLE,
        }
    }

    /// Choose how registration and signal quality combine
    pub fn with_policy(mut self, policy: ReachabilityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Upper bound for each AT exchange
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Transport, e.g. to install a reconnect hook
    pub fn transport_mut(&mut self) -> &mut AtTransport<L> {
        &mut self.transport
    }

    /// Transport, read-only
    pub fn transport(&self) -> &AtTransport<L> {
        &self.transport
    }

    /// Turn off command echo
    pub async fn init(&mut self) -> Result<(), ConnectorError> {
        self.transport
            .send_checked(CMD_ECHO_OFF, self.command_timeout)
            .await
            .map(|_| ())
    }

    /// Check registration and signal quality
    ///
    /// Both queries are always sent. A transport failure on the
    /// registration query makes the probe a `TransportError`; a failed
    /// signal query only counts as "no signal reading".
    pub async fn check_reachability(&mut self) -> ReachabilityStatus {
        let registration = self.transport.send(CMD_REGISTRATION, self.command_timeout).await;
        let signal = self.transport.send(CMD_SIGNAL_QUALITY, self.command_timeout).await;

        let rssi = match &signal {
            Ok(result) if result.success => parse_signal_quality(&result.response),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Signal quality query failed: {e}");
                None
            }
        };
        match rssi {
            Some(n) if signal_in_range(n) => log::info!("Signal quality is {n}"),
            Some(n) => log::warn!("No usable signal (rssi index {n})"),
            None => log::warn!("Signal quality unavailable"),
        }

        let registered = match registration {
            Ok(result) => is_registered(&result.response),
            Err(e) => {
                log::error!("Registration query failed: {e}");
                return ReachabilityStatus::TransportError;
            }
        };

        if self.policy.combine(registered, rssi) {
            log::info!("Network registered and reachable");
            ReachabilityStatus::Reachable
        } else {
            log::warn!(
                "Network not reachable (registered: {registered}, policy: {:?})",
                self.policy
            );
            ReachabilityStatus::Unreachable
        }
    }

    /// Read the modem RTC
    ///
    /// `Ok(None)` means the reply held no single well-formed timestamp.
    /// Callers must not substitute another clock.
    pub async fn read_clock(&mut self) -> Result<Option<Timestamp>, ConnectorError> {
        let response = self.transport.query_buffered(CMD_CLOCK, self.clock_settle).await?;
        let clock = Timestamp::extract(&response);
        match &clock {
            Some(ts) => log::info!("Clock response: {ts}"),
            None => log::warn!("Clock response held no timestamp: {response:?}"),
        }
        Ok(clock)
    }
}

#[async_trait::async_trait]
impl<L: CommandLink> Probe for Modem<L> {
    async fn probe(&mut self) -> ReachabilityStatus {
        self.check_reachability().await
    }
}

/// Bounded retry loop around a [`Probe`]
#[derive(Debug, Clone, Copy)]
pub struct ReachabilityMonitor {
    max_attempts: u32,
    backoff: Duration,
}

impl Default for ReachabilityMonitor {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_PROBES,
            backoff: PROBE_BACKOFF,
        }
    }
}

impl ReachabilityMonitor {
    /// Monitor giving up after `max_attempts` probes (at least one)
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Probe budget
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Probe until reachable, sleeping `backoff` between failures
    ///
    /// Returns the number of probes used, or `ReachabilityExhausted` after
    /// exactly `max_attempts` failed probes.
    pub async fn wait_until_reachable<P>(&self, probe: &mut P) -> Result<u32, ConnectorError>
    where
        P: Probe + ?Sized,
    {
        for attempt in 1..=self.max_attempts {
            let status = probe.probe().await;
            if status.is_reachable() {
                log::info!("Network reachable after {attempt} probe(s)");
                return Ok(attempt);
            }
            log::warn!("Probe {attempt}/{} failed: {status:?}", self.max_attempts);
            if attempt < self.max_attempts {
                sleep(self.backoff).await;
            }
        }
        Err(ConnectorError::ReachabilityExhausted {
            attempts: self.max_attempts,
        })
    }
}
