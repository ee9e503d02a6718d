pub mod dataset;
pub mod expression;
pub mod layer;
pub mod source;
pub mod symbology;

pub use dataset::*;
pub use expression::*;
pub use layer::*;
pub use source::*;
pub use symbology::*;
