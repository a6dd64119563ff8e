pub mod memory;
pub mod repository;
pub mod supabase;

pub use memory::MemoryStore;
pub use repository::*;
