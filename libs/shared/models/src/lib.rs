pub mod appointment;
pub mod auth;
pub mod availability;
pub mod error;
pub mod events;
pub mod lookup;
pub mod notification;
pub mod settings;

pub use error::{AppError, SchedulingError, StoreError};
