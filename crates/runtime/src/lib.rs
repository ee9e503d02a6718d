pub mod deferred;
pub mod signal_bus;

pub use deferred::*;
pub use signal_bus::*;
