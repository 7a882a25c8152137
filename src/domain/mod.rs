// Domain layer: configuration model and the ports to storage, servos and the wireless channel.

pub mod model;
pub mod ports;
