/// Edge detection over the wireless link state. The channel reports raw
/// connect/disconnect events; the control loop acts on transitions.
#[derive(Debug, Clone, Default)]
pub struct LinkMonitor {
    connected: bool,
    was_connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTransition {
    Unchanged,
    Established,
    Lost,
}

impl LinkMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(&mut self) {
        tracing::info!("Device connected");
        self.connected = true;
    }

    pub fn on_disconnect(&mut self) {
        tracing::info!("Device disconnected");
        self.connected = false;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn poll(&mut self) -> LinkTransition {
        let transition = match (self.connected, self.was_connected) {
            (true, false) => LinkTransition::Established,
            (false, true) => LinkTransition::Lost,
            _ => LinkTransition::Unchanged,
        };
        self.was_connected = self.connected;
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_fire_once() {
        let mut link = LinkMonitor::new();
        assert_eq!(link.poll(), LinkTransition::Unchanged);

        link.on_connect();
        assert_eq!(link.poll(), LinkTransition::Established);
        assert_eq!(link.poll(), LinkTransition::Unchanged);

        link.on_disconnect();
        assert_eq!(link.poll(), LinkTransition::Lost);
        assert_eq!(link.poll(), LinkTransition::Unchanged);
        assert!(!link.is_connected());
    }

    #[test]
    fn test_blip_between_polls_is_unchanged() {
        let mut link = LinkMonitor::new();
        link.on_connect();
        link.on_disconnect();
        assert_eq!(link.poll(), LinkTransition::Unchanged);
    }
}
