pub mod auth_record;
pub mod error;
pub mod tab;

pub use auth_record::*;
pub use error::*;
pub use tab::*;
