pub mod bounds;
pub mod camera;
pub mod math;
pub mod time;
pub mod viewport;

// Foundation crate: pure viewport/camera values and geodesy, no engine state.
pub use bounds::*;
pub use camera::*;
pub use time::*;
pub use viewport::*;
