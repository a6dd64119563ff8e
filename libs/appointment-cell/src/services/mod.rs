pub mod booking;
pub mod events;
pub mod lifecycle;
pub mod visit;

pub use booking::*;
pub use events::*;
pub use lifecycle::*;
pub use visit::*;
