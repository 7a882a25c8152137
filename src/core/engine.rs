use crate::core::config_store::{ConfigStore, DEFAULT_NAMESPACE};
use crate::core::link::{LinkMonitor, LinkTransition};
use crate::core::protocol::{CommandProtocol, NumericPolicy, Outcome};
use crate::core::scheduler::{PersistenceScheduler, DEFAULT_SAVE_INTERVAL};
use crate::core::{ActuatorBank, Configuration, KeyValueStore, ServoDriver};
use crate::domain::ports::{AdvertisingIdentity, ChannelEvent, CommandChannel};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

pub const DEVICE_NAME: &str = "Servo Mask";
pub const SERVICE_UUID: &str = "4fafc201-1fb5-459e-8fcc-c5c9c331914c";
pub const CHARACTERISTIC_UUID: &str = "beb5483e-36e1-4688-b7f5-ea07361b26a9";

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub identity: AdvertisingIdentity,
    pub namespace: String,
    pub save_interval: Duration,
    pub retry_failed_saves: bool,
    pub numeric_policy: NumericPolicy,
    pub loop_interval: Duration,
    pub readvertise_delay: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            identity: AdvertisingIdentity {
                device_name: DEVICE_NAME.to_string(),
                service_uuid: SERVICE_UUID.to_string(),
                characteristic_uuid: CHARACTERISTIC_UUID.to_string(),
            },
            namespace: DEFAULT_NAMESPACE.to_string(),
            save_interval: DEFAULT_SAVE_INTERVAL,
            retry_failed_saves: false,
            numeric_policy: NumericPolicy::Lenient,
            loop_interval: Duration::from_millis(20),
            readvertise_delay: Duration::from_millis(500),
        }
    }
}

/// Owns the one authoritative [`Configuration`] and everything that reads or
/// writes it. All work happens on the task that calls [`ServoMaskEngine::run`].
pub struct ServoMaskEngine<K: KeyValueStore, D: ServoDriver> {
    config: Configuration,
    store: ConfigStore<K>,
    actuators: ActuatorBank<D>,
    scheduler: PersistenceScheduler,
    protocol: CommandProtocol,
    link: LinkMonitor,
    settings: EngineSettings,
}

impl<K: KeyValueStore, D: ServoDriver> ServoMaskEngine<K, D> {
    /// Loads the stored configuration, centres the servos and then moves
    /// them to the active pose.
    pub fn new(store: K, driver: D, settings: EngineSettings) -> Self {
        let store = ConfigStore::new(store, settings.namespace.clone());
        let config = store.load();

        let mut actuators = ActuatorBank::new(driver);
        actuators.home();
        actuators.apply(&config, config.current_pose());

        tracing::info!(
            "Servo control ready on '{}' (pose {} active)",
            settings.identity.device_name,
            config.current_pose()
        );

        Self {
            config,
            store,
            actuators,
            scheduler: PersistenceScheduler::new(settings.save_interval, Instant::now()),
            protocol: CommandProtocol::new(settings.numeric_policy),
            link: LinkMonitor::new(),
            settings,
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn scheduler(&self) -> &PersistenceScheduler {
        &self.scheduler
    }

    /// Handles one write to the control characteristic. Returns the payload
    /// to notify back, if the command produces one.
    pub fn handle_write(&mut self, payload: &[u8]) -> Option<String> {
        if payload.is_empty() {
            return None;
        }

        let line = String::from_utf8_lossy(payload);
        tracing::info!("Received command: {}", line);

        let outcome = self.protocol.handle(
            &line,
            &mut self.config,
            &mut self.actuators,
            &mut self.scheduler,
        );

        match outcome {
            Ok(Outcome::Config(snapshot)) => match serde_json::to_string(&snapshot) {
                Ok(json) => {
                    tracing::debug!("Sending config: {}", json);
                    Some(json)
                }
                Err(e) => {
                    tracing::error!("Failed to serialize config: {}", e);
                    None
                }
            },
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("{}", e);
                None
            }
        }
    }

    /// Periodic persistence check. Returns true when a write was attempted.
    pub async fn persist_if_due(&mut self, now: Instant) -> bool {
        if !self.scheduler.tick(now) {
            return false;
        }
        self.write_config().await;
        true
    }

    /// Writes a pending change immediately, ignoring the debounce interval.
    pub async fn flush(&mut self) -> bool {
        if !self.scheduler.take_pending(Instant::now()) {
            return false;
        }
        self.write_config().await;
        true
    }

    async fn write_config(&mut self) {
        if let Err(e) = self.store.save(&self.config).await {
            tracing::error!(
                "Error saving config: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::debug!("Recovery suggestion: {}", e.recovery_suggestion());
            if self.settings.retry_failed_saves {
                self.scheduler.request_save();
            }
        }
    }

    /// Returns false when `shutdown` resolved during the re-advertise delay.
    async fn service_link<C, F>(&mut self, channel: &mut C, shutdown: Pin<&mut F>) -> bool
    where
        C: CommandChannel,
        F: Future<Output = ()>,
    {
        match self.link.poll() {
            LinkTransition::Lost => {
                tokio::select! {
                    _ = shutdown => return false,
                    _ = tokio::time::sleep(self.settings.readvertise_delay) => {}
                }
                match channel.start_advertising(&self.settings.identity).await {
                    Ok(()) => tracing::info!("Restarting advertising"),
                    Err(e) => tracing::error!("Failed to restart advertising: {}", e),
                }
            }
            LinkTransition::Established => tracing::info!("New device connected"),
            LinkTransition::Unchanged => {}
        }
        true
    }

    /// Cooperative control loop: channel events as they arrive, and on every
    /// loop tick the link transitions followed by the persistence check.
    /// Ends when the channel closes or `shutdown` resolves, after a final flush.
    pub async fn run<C, F>(&mut self, channel: &mut C, shutdown: F)
    where
        C: CommandChannel,
        F: Future<Output = ()>,
    {
        match channel.start_advertising(&self.settings.identity).await {
            Ok(()) => tracing::info!(
                "Advertising '{}' (service {})",
                self.settings.identity.device_name,
                self.settings.identity.service_uuid
            ),
            Err(e) => tracing::error!("Failed to start advertising: {}", e),
        }

        let mut ticker = tokio::time::interval(self.settings.loop_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                event = channel.next_event() => match event {
                    ChannelEvent::Connected => self.link.on_connect(),
                    ChannelEvent::Disconnected => self.link.on_disconnect(),
                    ChannelEvent::Write(bytes) => {
                        if let Some(response) = self.handle_write(&bytes) {
                            if let Err(e) = channel.notify(response.as_bytes()).await {
                                tracing::warn!("Failed to notify config: {}", e);
                            }
                        }
                    }
                    ChannelEvent::Closed => {
                        tracing::info!("Control channel closed");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if !self.service_link(channel, shutdown.as_mut()).await {
                        tracing::info!("Shutdown requested");
                        break;
                    }
                    self.persist_if_due(Instant::now()).await;
                }
            }
        }

        self.flush().await;
    }
}
