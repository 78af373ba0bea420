pub mod engine;
pub mod memory;
pub mod realtime;
pub mod scheduler;
pub mod store;

pub use engine::*;
pub use memory::*;
pub use realtime::*;
pub use scheduler::*;
pub use store::*;
