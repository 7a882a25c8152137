use crate::utils::error::Result;
use async_trait::async_trait;

/// Namespace-scoped key/value storage, shaped after the preferences API of
/// microcontroller flash stores.
pub trait KeyValueStore: Send + Sync {
    type Session: KeyValueSession;

    fn open(&self, namespace: &str, read_only: bool) -> Result<Self::Session>;
}

/// An open namespace. Dropping the session releases it on every path;
/// [`KeyValueSession::end`] additionally commits buffered writes.
pub trait KeyValueSession: Send {
    fn get_i32(&self, key: &str) -> Result<Option<i32>>;
    fn get_string(&self, key: &str) -> Result<Option<String>>;
    fn put_i32(&mut self, key: &str, value: i32) -> Result<()>;
    fn put_string(&mut self, key: &str, value: &str) -> Result<()>;
    fn end(self) -> Result<()>;
}

/// A single "set angle" primitive per actuator channel.
pub trait ServoDriver: Send {
    fn write_angle(&mut self, channel: usize, degrees: u8) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Write(Vec<u8>),
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingIdentity {
    pub device_name: String,
    pub service_uuid: String,
    pub characteristic_uuid: String,
}

/// The wireless control characteristic as seen by the device: connection
/// events and written command bytes in, notifications out.
#[async_trait]
pub trait CommandChannel: Send {
    async fn next_event(&mut self) -> ChannelEvent;
    async fn notify(&mut self, payload: &[u8]) -> Result<()>;
    async fn start_advertising(&mut self, identity: &AdvertisingIdentity) -> Result<()>;
}
