pub mod identity;
pub mod remembered;

pub use identity::*;
pub use remembered::*;
