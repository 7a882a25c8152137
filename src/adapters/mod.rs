// Adapters layer: concrete implementations of the domain ports (storage, servo outputs, control channel).

pub mod channel;
pub mod servo;
pub mod storage;
