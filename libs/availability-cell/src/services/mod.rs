pub mod availability;
pub mod overlap;
pub mod suggestion;

pub use availability::*;
pub use overlap::*;
pub use suggestion::*;
