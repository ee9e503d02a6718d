pub mod session;
pub mod task;

pub use session::*;
pub use task::*;
