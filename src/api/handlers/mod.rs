pub mod model;
pub mod system;

pub use model::*;
pub use system::*;
