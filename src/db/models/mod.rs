//! Database models split into domain-specific modules.

pub mod account;
pub mod reservation;

pub use account::*;
pub use reservation::*;
