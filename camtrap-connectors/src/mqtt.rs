//! MQTT time channel
//!
//! The broker holds the fleet schedule as two retained messages:
//!
//! ```text
//! <owner>/<device>/rtc       "24/01/15,09:00:00"   retained
//! <owner>/<device>/interval  "6"                   retained
//! ```
//!
//! Constructing a channel opens nothing. The session starts on
//! [`ScheduleChannel::connect`], which the wake cycle calls only once the
//! network is reachable. Network I/O then runs on a background task that
//! writes schedule messages into a latest-value inbox, stamped with their
//! arrival time. The control flow reads the inbox once, after the
//! observation window, and ignores anything stamped later. Telemetry goes
//! out non-retained on `temp`, `humid`, `pressure` and `data` under the
//! same prefix.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camtrap_core::constants::time::{BROKER_RETRY_DELAY, MQTT_KEEP_ALIVE, PUBLISH_FLUSH};
use camtrap_core::{ReconnectHook, ScheduleObservation, ScheduleState, SensorQuery, Timestamp};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};

use crate::{telemetry_payload, AsyncConnector, ConnectionStats, ConnectorError, ScheduleChannel};

/// Requests queued on the rumqttc client before `publish` waits
const REQUEST_CAPACITY: usize = 20;

/// How long shutdown waits for the driver after disconnecting
const DRIVER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Broker connection settings
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Broker host name or address
    pub broker: String,
    /// Broker port
    pub port: u16,
    /// MQTT client identifier
    pub client_id: String,
    /// Keep-alive interval
    pub keep_alive: Duration,
}

impl MqttConfig {
    /// Configuration with the default keep-alive
    pub fn new(broker: impl Into<String>, port: u16, client_id: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            port,
            client_id: client_id.into(),
            keep_alive: MQTT_KEEP_ALIVE,
        }
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.broker, self.port);
        options.set_keep_alive(self.keep_alive);
        options
    }
}

/// Topic names for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleTopics {
    prefix: String,
    rtc: String,
    interval: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScheduleField {
    Rtc,
    Interval,
}

impl ScheduleTopics {
    /// Topics under `<owner>/<device>`
    pub fn new(owner: &str, device: &str) -> Self {
        let prefix = format!("{owner}/{device}");
        Self {
            rtc: format!("{prefix}/rtc"),
            interval: format!("{prefix}/interval"),
            prefix,
        }
    }

    /// Retained last-wake topic
    pub fn rtc(&self) -> &str {
        &self.rtc
    }

    /// Retained interval topic
    pub fn interval(&self) -> &str {
        &self.interval
    }

    /// Telemetry topic for one sensor quantity
    pub fn telemetry(&self, query: SensorQuery) -> String {
        format!("{}/{}", self.prefix, query.topic_suffix())
    }

    /// Detector output topic
    pub fn detections(&self) -> String {
        format!("{}/data", self.prefix)
    }

    fn field(&self, topic: &str) -> Option<ScheduleField> {
        if topic == self.rtc {
            Some(ScheduleField::Rtc)
        } else if topic == self.interval {
            Some(ScheduleField::Interval)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Window {
    /// Accepting; the deadline is set once `observe` starts
    Open(Option<Instant>),
    Closed,
}

#[derive(Debug)]
struct Slots {
    window: Window,
    rtc: Option<String>,
    interval: Option<String>,
}

/// Latest payload per schedule topic
///
/// A new message replaces the previous one on the same topic, so nothing
/// is ever dropped for lack of space. Messages stamped after the window
/// deadline, or arriving once it is closed, are ignored.
#[derive(Debug)]
struct ScheduleInbox {
    slots: Mutex<Slots>,
}

impl Default for ScheduleInbox {
    fn default() -> Self {
        Self {
            slots: Mutex::new(Slots {
                window: Window::Open(None),
                rtc: None,
                interval: None,
            }),
        }
    }
}

impl ScheduleInbox {
    /// Stop accepting anything stamped after `deadline`
    fn set_deadline(&self, deadline: Instant) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.window = Window::Open(Some(deadline));
        }
    }

    /// Store `payload` unless the window has passed. Returns whether it was kept.
    fn record(&self, field: ScheduleField, payload: String, received_at: Instant) -> bool {
        let Ok(mut slots) = self.slots.lock() else {
            return false;
        };
        let accepted = match slots.window {
            Window::Open(None) => true,
            Window::Open(Some(deadline)) => received_at <= deadline,
            Window::Closed => false,
        };
        if accepted {
            match field {
                ScheduleField::Rtc => slots.rtc = Some(payload),
                ScheduleField::Interval => slots.interval = Some(payload),
            }
        }
        accepted
    }

    /// Close the window and take what it collected
    fn close(&self) -> ScheduleObservation {
        match self.slots.lock() {
            Ok(mut slots) => {
                slots.window = Window::Closed;
                ScheduleObservation {
                    rtc: slots.rtc.take(),
                    interval: slots.interval.take(),
                }
            }
            Err(_) => ScheduleObservation::default(),
        }
    }
}

#[derive(Debug)]
enum Control {
    Resubscribe,
}

#[derive(Default)]
struct Shared {
    stats: Mutex<ConnectionStats>,
    connected: AtomicBool,
    inbox: ScheduleInbox,
}

impl Shared {
    fn record<F: FnOnce(&mut ConnectionStats)>(&self, f: F) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }
}

/// Reconnect hook handed to the AT transport
///
/// Asks the driver to re-establish the schedule subscriptions so the
/// retained values are delivered again on the new session.
#[derive(Clone)]
pub struct ReconnectHandle {
    control: mpsc::UnboundedSender<Control>,
}

impl ReconnectHook for ReconnectHandle {
    fn reconnect(&self) {
        if self.control.send(Control::Resubscribe).is_err() {
            log::warn!("Reconnect requested after the broker channel closed");
        }
    }
}

/// Where the driver sends subscribe requests
trait Subscriber {
    fn subscribe(&self, topic: &str) -> Result<(), String>;
}

impl Subscriber for AsyncClient {
    fn subscribe(&self, topic: &str) -> Result<(), String> {
        self.try_subscribe(topic, QoS::AtLeastOnce)
            .map_err(|e| e.to_string())
    }
}

/// Event handling for the background task, kept apart from the socket
struct Driver<S> {
    subscriber: S,
    topics: ScheduleTopics,
    shared: Arc<Shared>,
}

impl<S: Subscriber> Driver<S> {
    fn subscribe_schedule(&self) {
        for topic in [self.topics.rtc(), self.topics.interval()] {
            if let Err(e) = self.subscriber.subscribe(topic) {
                log::error!("Subscribe to {topic} failed: {e}");
            }
        }
    }

    /// Returns `false` once the session has been closed
    fn handle_event(&self, event: Event) -> bool {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                log::info!("Connected with result code {:?}", ack.code);
                self.shared.connected.store(true, Ordering::SeqCst);
                self.subscribe_schedule();
            }
            Event::Incoming(Packet::Publish(message)) => {
                let payload = String::from_utf8_lossy(&message.payload).into_owned();
                log::info!("Received message on {}: {payload}", message.topic);
                if let Some(field) = self.topics.field(&message.topic) {
                    if !self.shared.inbox.record(field, payload, Instant::now()) {
                        log::debug!("Observation window closed, dropping {field:?}");
                    }
                }
            }
            Event::Outgoing(Outgoing::Disconnect) => {
                log::info!("Disconnected from broker");
                self.shared.connected.store(false, Ordering::SeqCst);
                return false;
            }
            _ => {}
        }
        true
    }

    fn handle_control(&self, control: Control) {
        match control {
            Control::Resubscribe => {
                log::info!("Re-establishing schedule subscriptions");
                self.shared.record(|s| s.reconnections += 1);
                self.subscribe_schedule();
            }
        }
    }

    fn handle_error(&self, error: &rumqttc::ConnectionError) {
        log::warn!("Broker connection error: {error}");
        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.record(|s| s.last_error = Some(error.to_string()));
    }
}

async fn drive(
    mut eventloop: EventLoop,
    driver: Driver<AsyncClient>,
    mut control: mpsc::UnboundedReceiver<Control>,
) {
    loop {
        tokio::select! {
            event = eventloop.poll() => match event {
                Ok(event) => {
                    if !driver.handle_event(event) {
                        break;
                    }
                }
                Err(e) => {
                    driver.handle_error(&e);
                    sleep(BROKER_RETRY_DELAY).await;
                }
            },
            Some(request) = control.recv() => driver.handle_control(request),
        }
    }
}

/// Schedule channel backed by an MQTT broker
pub struct MqttTimeChannel {
    client: AsyncClient,
    topics: ScheduleTopics,
    control: mpsc::UnboundedSender<Control>,
    shared: Arc<Shared>,
    // Mutex only to make the channel Sync (EventLoop is not); accessed via get_mut
    idle: Mutex<Option<(EventLoop, mpsc::UnboundedReceiver<Control>)>>,
    driver: Option<JoinHandle<()>>,
}

impl MqttTimeChannel {
    /// Prepare a session. Nothing touches the network until `connect`.
    pub fn new(config: &MqttConfig, topics: ScheduleTopics) -> Self {
        let (client, eventloop) = AsyncClient::new(config.options(), REQUEST_CAPACITY);
        let (control, control_rx) = mpsc::unbounded_channel();
        log::debug!(
            "Broker session prepared for {}:{} as {}",
            config.broker,
            config.port,
            config.client_id
        );

        Self {
            client,
            topics,
            control,
            shared: Arc::new(Shared::default()),
            idle: Mutex::new(Some((eventloop, control_rx))),
            driver: None,
        }
    }

    /// Hook for the AT transport's connection-lost handling
    ///
    /// Usable before `connect`; requests queue until the driver starts.
    pub fn reconnect_handle(&self) -> ReconnectHandle {
        ReconnectHandle {
            control: self.control.clone(),
        }
    }

    /// Topics this channel uses
    pub fn topics(&self) -> &ScheduleTopics {
        &self.topics
    }

    async fn publish(
        &self,
        topic: &str,
        retain: bool,
        payload: &[u8],
    ) -> Result<(), ConnectorError> {
        if self.driver.is_none() {
            return Err(ConnectorError::NotConnected);
        }
        match self
            .client
            .publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
            .await
        {
            Ok(()) => {
                log::debug!("Published {} bytes to {topic} (retain: {retain})", payload.len());
                self.shared.record(|s| {
                    s.messages_sent += 1;
                    s.bytes_sent += payload.len() as u64;
                });
                Ok(())
            }
            Err(e) => {
                log::error!("Publish to {topic} failed: {e}");
                self.shared.record(|s| {
                    s.messages_failed += 1;
                    s.last_error = Some(e.to_string());
                });
                Err(ConnectorError::ProtocolError(e.to_string()))
            }
        }
    }

    async fn set_schedule_subscription(&self, subscribe: bool) -> Result<(), ConnectorError> {
        for topic in [self.topics.rtc(), self.topics.interval()] {
            let result = if subscribe {
                self.client.subscribe(topic, QoS::AtLeastOnce).await
            } else {
                self.client.unsubscribe(topic).await
            };
            result.map_err(|e| ConnectorError::ProtocolError(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for MqttTimeChannel {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

#[async_trait::async_trait]
impl AsyncConnector for MqttTimeChannel {
    type Error = ConnectorError;

    async fn send(&mut self, topic: &str, data: &[u8]) -> Result<(), Self::Error> {
        self.publish(topic, false, data).await
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn stats(&self) -> ConnectionStats {
        self.shared
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ScheduleChannel for MqttTimeChannel {
    async fn connect(&mut self) -> Result<(), ConnectorError> {
        let Some((eventloop, control_rx)) = self
            .idle
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        else {
            return Ok(());
        };
        log::info!("Opening broker session");
        let driver = Driver {
            subscriber: self.client.clone(),
            topics: self.topics.clone(),
            shared: Arc::clone(&self.shared),
        };
        self.driver = Some(tokio::spawn(drive(eventloop, driver, control_rx)));
        Ok(())
    }

    async fn observe(&mut self, window: Duration) -> Result<ScheduleObservation, ConnectorError> {
        if self.driver.is_none() {
            return Err(ConnectorError::NotConnected);
        }
        let deadline = Instant::now() + window;
        self.shared.inbox.set_deadline(deadline);
        if let Err(e) = self.set_schedule_subscription(true).await {
            self.shared.inbox.close();
            return Err(e);
        }

        sleep_until(deadline).await;

        let observation = self.shared.inbox.close();
        if let Err(e) = self.set_schedule_subscription(false).await {
            log::warn!("Unsubscribe failed: {e}");
        }
        log::info!(
            "Observed rtc {:?}, interval {:?}",
            observation.rtc,
            observation.interval
        );
        Ok(observation)
    }

    async fn publish_schedule(&mut self, state: &ScheduleState) -> Result<(), ConnectorError> {
        self.publish(self.topics.rtc(), true, state.last_wake.as_str().as_bytes())
            .await?;
        self.publish(
            self.topics.interval(),
            true,
            state.interval.to_string().as_bytes(),
        )
        .await
    }

    async fn publish_last_wake(&mut self, at: &Timestamp) -> Result<(), ConnectorError> {
        self.publish(self.topics.rtc(), true, at.as_str().as_bytes()).await
    }

    async fn publish_telemetry(
        &mut self,
        query: SensorQuery,
        value: Option<f32>,
    ) -> Result<(), ConnectorError> {
        let topic = self.topics.telemetry(query);
        self.send(&topic, telemetry_payload(value).as_bytes()).await
    }

    async fn publish_detections(&mut self, payload: &str) -> Result<(), ConnectorError> {
        let topic = self.topics.detections();
        self.send(&topic, payload.as_bytes()).await
    }

    async fn shutdown(&mut self) -> Result<(), ConnectorError> {
        let Some(driver) = self.driver.take() else {
            return Ok(());
        };
        sleep(PUBLISH_FLUSH).await;

        let disconnect = self
            .client
            .disconnect()
            .await
            .map_err(|e| ConnectorError::ProtocolError(e.to_string()));

        let abort = driver.abort_handle();
        if timeout(DRIVER_JOIN_TIMEOUT, driver).await.is_err() {
            log::warn!("Broker driver did not stop, aborting");
            abort.abort();
        }
        let stats = self.stats();
        log::info!(
            "Broker session closed: {} sent, {} failed, {} reconnections",
            stats.messages_sent,
            stats.messages_failed,
            stats.reconnections
        );
        disconnect
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, ConnectReturnCode, Publish};
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct RecordingSubscriber {
        topics: Mutex<Vec<String>>,
    }

    impl Subscriber for RecordingSubscriber {
        fn subscribe(&self, topic: &str) -> Result<(), String> {
            self.topics.lock().unwrap().push(topic.to_owned());
            Ok(())
        }
    }

    fn driver() -> Driver<RecordingSubscriber> {
        Driver {
            subscriber: RecordingSubscriber::default(),
            topics: ScheduleTopics::new("fleet", "trap-07"),
            shared: Arc::new(Shared::default()),
        }
    }

    fn subscribed(driver: &Driver<RecordingSubscriber>) -> Vec<String> {
        driver.subscriber.topics.lock().unwrap().clone()
    }

    fn conn_ack() -> Event {
        Event::Incoming(Packet::ConnAck(ConnAck::new(ConnectReturnCode::Success, false)))
    }

    fn message(topic: &str, payload: &str) -> Event {
        Event::Incoming(Packet::Publish(Publish::new(
            topic,
            QoS::AtLeastOnce,
            payload.as_bytes().to_vec(),
        )))
    }

    #[test]
    fn test_topic_layout() {
        let topics = ScheduleTopics::new("fleet", "trap-07");
        assert_eq!(topics.rtc(), "fleet/trap-07/rtc");
        assert_eq!(topics.interval(), "fleet/trap-07/interval");
        assert_eq!(topics.telemetry(SensorQuery::Temperature), "fleet/trap-07/temp");
        assert_eq!(topics.telemetry(SensorQuery::Humidity), "fleet/trap-07/humid");
        assert_eq!(topics.telemetry(SensorQuery::Pressure), "fleet/trap-07/pressure");
        assert_eq!(topics.detections(), "fleet/trap-07/data");
    }

    #[test]
    fn test_topic_routing() {
        let topics = ScheduleTopics::new("fleet", "trap-07");
        assert_eq!(topics.field("fleet/trap-07/rtc"), Some(ScheduleField::Rtc));
        assert_eq!(topics.field("fleet/trap-07/interval"), Some(ScheduleField::Interval));
        assert_eq!(topics.field("fleet/trap-08/rtc"), None);
        assert_eq!(topics.field("fleet/trap-07/temp"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conn_ack_subscribes_both_topics() {
        let driver = driver();
        assert!(driver.handle_event(conn_ack()));
        assert!(driver.shared.connected.load(Ordering::SeqCst));
        assert_eq!(
            subscribed(&driver),
            vec!["fleet/trap-07/rtc", "fleet/trap-07/interval"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribe_repeats_both_topics() {
        let driver = driver();
        driver.handle_event(conn_ack());
        driver.handle_control(Control::Resubscribe);

        assert_eq!(
            subscribed(&driver),
            vec![
                "fleet/trap-07/rtc",
                "fleet/trap-07/interval",
                "fleet/trap-07/rtc",
                "fleet/trap-07/interval",
            ]
        );
        assert_eq!(driver.shared.stats.lock().unwrap().reconnections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_handle_reaches_driver() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ReconnectHandle { control: tx };
        let driver = driver();

        handle.reconnect();
        let request = rx.try_recv().unwrap();
        driver.handle_control(request);
        assert_eq!(subscribed(&driver).len(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_messages_reach_inbox() {
        let driver = driver();
        driver.handle_event(message("fleet/trap-07/rtc", "24/01/15,09:00:00"));
        driver.handle_event(message("fleet/trap-07/interval", "2"));
        driver.handle_event(message("fleet/trap-07/temp", "21.5"));

        let obs = driver.shared.inbox.close();
        assert_eq!(obs.rtc.as_deref(), Some("24/01/15,09:00:00"));
        assert_eq!(obs.interval.as_deref(), Some("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_after_window_never_reach_inbox() {
        let driver = driver();
        driver.handle_event(message("fleet/trap-07/rtc", "24/01/15,09:00:00"));
        let first = driver.shared.inbox.close();
        assert!(first.rtc.is_some());

        driver.handle_event(message("fleet/trap-07/interval", "2"));
        driver.handle_event(message("fleet/trap-07/rtc", "24/01/15,10:00:00"));
        assert_eq!(driver.shared.inbox.close(), ScheduleObservation::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_driver() {
        let driver = driver();
        driver.handle_event(conn_ack());
        assert!(!driver.handle_event(Event::Outgoing(Outgoing::Disconnect)));
        assert!(!driver.shared.connected.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbox_last_value_wins() {
        let inbox = ScheduleInbox::default();
        let now = Instant::now();
        inbox.set_deadline(now + Duration::from_secs(5));
        for hours in 1..=40 {
            assert!(inbox.record(ScheduleField::Interval, hours.to_string(), now));
        }
        inbox.record(ScheduleField::Rtc, "24/01/15,09:00:00".into(), now);

        let obs = inbox.close();
        assert_eq!(obs.interval.as_deref(), Some("40"));
        assert_eq!(obs.rtc.as_deref(), Some("24/01/15,09:00:00"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbox_ignores_late_stamps() {
        let inbox = ScheduleInbox::default();
        let deadline = Instant::now() + Duration::from_secs(5);
        inbox.set_deadline(deadline);

        assert!(inbox.record(ScheduleField::Rtc, "24/01/15,09:00:00".into(), deadline));
        assert!(!inbox.record(
            ScheduleField::Interval,
            "2".into(),
            deadline + Duration::from_millis(1),
        ));

        let obs = inbox.close();
        assert_eq!(obs.rtc.as_deref(), Some("24/01/15,09:00:00"));
        assert_eq!(obs.interval, None);
    }

    #[test]
    fn test_reconnect_after_close_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        ReconnectHandle { control: tx }.reconnect();
    }

    #[tokio::test]
    async fn test_new_opens_no_connection_until_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = MqttConfig::new("127.0.0.1", port, "trap-07");

        let mut channel = MqttTimeChannel::new(&config, ScheduleTopics::new("fleet", "trap-07"));
        let early = tokio::time::timeout(Duration::from_millis(500), listener.accept()).await;
        assert!(early.is_err(), "broker contacted before connect()");

        channel.connect().await.unwrap();
        let accepted = tokio::time::timeout(Duration::from_secs(5), listener.accept()).await;
        assert!(accepted.is_ok(), "connect() did not reach the broker");
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_before_connect_is_refused() {
        let config = MqttConfig::new("127.0.0.1", 1883, "trap-07");
        let mut channel = MqttTimeChannel::new(&config, ScheduleTopics::new("fleet", "trap-07"));
        assert!(matches!(
            channel.observe(Duration::from_secs(5)).await,
            Err(ConnectorError::NotConnected)
        ));
        assert!(matches!(
            channel.publish_detections("cat").await,
            Err(ConnectorError::NotConnected)
        ));
        // Nothing to flush
        channel.shutdown().await.unwrap();
    }
}
