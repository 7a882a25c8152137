use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Clean,
    Dirty,
}

impl SaveState {
    /// Pure debounce transition: returns the next state and whether a storage
    /// write has to happen now.
    pub fn tick(
        self,
        last_save: Instant,
        now: Instant,
        interval: Duration,
    ) -> (SaveState, bool) {
        match self {
            SaveState::Dirty if now.saturating_duration_since(last_save) >= interval => {
                (SaveState::Clean, true)
            }
            state => (state, false),
        }
    }
}

/// Coalesces save requests so that storage sees at most one write per interval.
#[derive(Debug, Clone)]
pub struct PersistenceScheduler {
    state: SaveState,
    last_save: Instant,
    interval: Duration,
}

impl PersistenceScheduler {
    pub fn new(interval: Duration, started_at: Instant) -> Self {
        Self {
            state: SaveState::Clean,
            last_save: started_at,
            interval,
        }
    }

    pub fn request_save(&mut self) {
        self.state = SaveState::Dirty;
    }

    pub fn tick(&mut self, now: Instant) -> bool {
        let (state, write_now) = self.state.tick(self.last_save, now, self.interval);
        self.state = state;
        if write_now {
            self.last_save = now;
        }
        write_now
    }

    /// Shutdown path: takes a pending write regardless of the interval.
    pub fn take_pending(&mut self, now: Instant) -> bool {
        if self.state == SaveState::Dirty {
            self.state = SaveState::Clean;
            self.last_save = now;
            true
        } else {
            false
        }
    }

    pub fn state(&self) -> SaveState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.state == SaveState::Dirty
    }

    pub fn last_save(&self) -> Instant {
        self.last_save
    }
}
