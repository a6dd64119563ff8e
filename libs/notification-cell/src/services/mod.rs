pub mod publisher;
pub mod scheduler;
pub mod ticker;

pub use publisher::*;
pub use scheduler::*;
pub use ticker::*;
