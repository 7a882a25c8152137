use crate::domain::model::{MAX_DEGREES, NUM_SERVOS};
use crate::domain::ports::ServoDriver;
use crate::utils::error::{Result, ServoMaskError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Hobby servo PWM parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PwmTiming {
    pub frequency_hz: u32,
    pub min_pulse_us: u32,
    pub max_pulse_us: u32,
}

impl Default for PwmTiming {
    fn default() -> Self {
        Self {
            frequency_hz: 50,
            min_pulse_us: 500,
            max_pulse_us: 2400,
        }
    }
}

impl PwmTiming {
    pub fn period_us(&self) -> u32 {
        1_000_000 / self.frequency_hz.max(1)
    }

    /// Linear map of `0..=180` degrees onto the pulse range.
    pub fn pulse_width_us(&self, degrees: u8) -> u32 {
        let degrees = degrees.min(MAX_DEGREES) as u32;
        self.min_pulse_us + degrees * (self.max_pulse_us - self.min_pulse_us) / MAX_DEGREES as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmOutput {
    pub pin: u8,
    pub pulse_width_us: u32,
}

/// Software model of a bank of PWM outputs, one GPIO pin per channel.
/// Keeps the last pulse width per channel and traces every change.
#[derive(Debug, Clone)]
pub struct PwmServoDriver {
    pins: [u8; NUM_SERVOS],
    timing: PwmTiming,
    outputs: [Option<PwmOutput>; NUM_SERVOS],
}

impl PwmServoDriver {
    pub fn new(pins: [u8; NUM_SERVOS], timing: PwmTiming) -> Self {
        for (channel, pin) in pins.iter().enumerate() {
            tracing::debug!(
                "Attached servo {} to pin {} ({} Hz, {}-{} us)",
                channel,
                pin,
                timing.frequency_hz,
                timing.min_pulse_us,
                timing.max_pulse_us
            );
        }
        Self {
            pins,
            timing,
            outputs: [None; NUM_SERVOS],
        }
    }

    pub fn output(&self, channel: usize) -> Option<PwmOutput> {
        self.outputs.get(channel).copied().flatten()
    }
}

impl ServoDriver for PwmServoDriver {
    fn write_angle(&mut self, channel: usize, degrees: u8) -> Result<()> {
        let pin = *self
            .pins
            .get(channel)
            .ok_or_else(|| ServoMaskError::ActuatorError {
                channel,
                message: "no pin assigned".to_string(),
            })?;

        let pulse_width_us = self.timing.pulse_width_us(degrees);
        tracing::debug!(
            "Servo {} (pin {}) -> {} deg, {} us",
            channel,
            pin,
            degrees,
            pulse_width_us
        );
        self.outputs[channel] = Some(PwmOutput {
            pin,
            pulse_width_us,
        });
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Recording {
    writes: Vec<(usize, u8)>,
    failing_channel: Option<usize>,
}

/// Records every angle written. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingServoDriver {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingServoDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn writes(&self) -> Vec<(usize, u8)> {
        self.inner().writes.clone()
    }

    /// Last angle written to `channel`.
    pub fn angle(&self, channel: usize) -> Option<u8> {
        self.inner()
            .writes
            .iter()
            .rev()
            .find(|(c, _)| *c == channel)
            .map(|(_, degrees)| *degrees)
    }

    pub fn angles(&self) -> [Option<u8>; NUM_SERVOS] {
        std::array::from_fn(|channel| self.angle(channel))
    }

    pub fn clear(&self) {
        self.inner().writes.clear();
    }

    pub fn fail_channel(&self, channel: Option<usize>) {
        self.inner().failing_channel = channel;
    }
}

impl ServoDriver for RecordingServoDriver {
    fn write_angle(&mut self, channel: usize, degrees: u8) -> Result<()> {
        let mut inner = self.inner();
        if inner.failing_channel == Some(channel) {
            return Err(ServoMaskError::ActuatorError {
                channel,
                message: "injected driver fault".to_string(),
            });
        }
        inner.writes.push((channel, degrees));
        Ok(())
    }
}
