use crate::domain::ports::{AdvertisingIdentity, ChannelEvent, CommandChannel};
use crate::utils::error::{Result, ServoMaskError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::mpsc;

/// In-process channel: a [`ChannelHandle`] plays the central device.
pub struct MpscChannel {
    events: mpsc::Receiver<ChannelEvent>,
    notifications: mpsc::UnboundedSender<Vec<u8>>,
    advertisements: Arc<AtomicUsize>,
    advertising_fault: Arc<AtomicBool>,
}

pub struct ChannelHandle {
    events: mpsc::Sender<ChannelEvent>,
    notifications: mpsc::UnboundedReceiver<Vec<u8>>,
    advertisements: Arc<AtomicUsize>,
    advertising_fault: Arc<AtomicBool>,
}

pub fn mpsc_channel(buffer: usize) -> (MpscChannel, ChannelHandle) {
    let (event_tx, event_rx) = mpsc::channel(buffer);
    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    let advertisements = Arc::new(AtomicUsize::new(0));
    let advertising_fault = Arc::new(AtomicBool::new(false));

    (
        MpscChannel {
            events: event_rx,
            notifications: notify_tx,
            advertisements: advertisements.clone(),
            advertising_fault: advertising_fault.clone(),
        },
        ChannelHandle {
            events: event_tx,
            notifications: notify_rx,
            advertisements,
            advertising_fault,
        },
    )
}

impl ChannelHandle {
    async fn send(&self, event: ChannelEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| ServoMaskError::ChannelError {
                message: "device side of the channel is gone".to_string(),
            })
    }

    pub async fn connect(&self) -> Result<()> {
        self.send(ChannelEvent::Connected).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.send(ChannelEvent::Disconnected).await
    }

    pub async fn write(&self, command: &str) -> Result<()> {
        self.send(ChannelEvent::Write(command.as_bytes().to_vec()))
            .await
    }

    pub async fn close(&self) -> Result<()> {
        self.send(ChannelEvent::Closed).await
    }

    pub async fn next_notification(&mut self) -> Option<Vec<u8>> {
        self.notifications.recv().await
    }

    pub fn try_notification(&mut self) -> Option<Vec<u8>> {
        self.notifications.try_recv().ok()
    }

    /// Successful advertising starts so far.
    pub fn advertisement_count(&self) -> usize {
        self.advertisements.load(Ordering::Relaxed)
    }

    pub fn fail_advertising(&self, fail: bool) {
        self.advertising_fault.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl CommandChannel for MpscChannel {
    async fn next_event(&mut self) -> ChannelEvent {
        self.events.recv().await.unwrap_or(ChannelEvent::Closed)
    }

    async fn notify(&mut self, payload: &[u8]) -> Result<()> {
        self.notifications
            .send(payload.to_vec())
            .map_err(|_| ServoMaskError::ChannelError {
                message: "central side of the channel is gone".to_string(),
            })
    }

    async fn start_advertising(&mut self, identity: &AdvertisingIdentity) -> Result<()> {
        if self.advertising_fault.load(Ordering::Relaxed) {
            return Err(ServoMaskError::ChannelError {
                message: "radio refused to advertise".to_string(),
            });
        }
        tracing::debug!("Advertising {} ({})", identity.device_name, identity.service_uuid);
        self.advertisements.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Line-oriented channel over any async reader/writer pair, used to drive the
/// device from a terminal. Each input line is one characteristic write and
/// each notification is one output line. The session counts as connected
/// from the first read until end of input.
pub struct LineChannel<R, W> {
    lines: Lines<R>,
    writer: W,
    announced: bool,
}

impl LineChannel<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> LineChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            lines: reader.lines(),
            writer,
            announced: false,
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }
}

#[async_trait]
impl<R, W> CommandChannel for LineChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn next_event(&mut self) -> ChannelEvent {
        if !self.announced {
            self.announced = true;
            return ChannelEvent::Connected;
        }

        match self.lines.next_line().await {
            Ok(Some(line)) => ChannelEvent::Write(line.trim_end_matches('\r').as_bytes().to_vec()),
            Ok(None) => ChannelEvent::Closed,
            Err(e) => {
                tracing::error!("Failed to read command line: {}", e);
                ChannelEvent::Closed
            }
        }
    }

    async fn notify(&mut self, payload: &[u8]) -> Result<()> {
        let mut line = Vec::with_capacity(payload.len() + 1);
        line.extend_from_slice(payload);
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn start_advertising(&mut self, identity: &AdvertisingIdentity) -> Result<()> {
        tracing::info!(
            "Listening for commands as '{}' (characteristic {})",
            identity.device_name,
            identity.characteristic_uuid
        );
        Ok(())
    }
}
