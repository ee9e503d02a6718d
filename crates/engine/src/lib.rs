pub mod binding;
pub mod config;
pub mod controls;
pub mod engine;
pub mod error;
pub mod headless;
pub mod interaction;
pub mod ops;

pub use binding::*;
pub use config::*;
pub use controls::*;
pub use engine::*;
pub use error::*;
pub use interaction::*;
