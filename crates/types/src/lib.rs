//! Domain types shared by the registration service crates.
//!
//! Serial numbers and registration codes are opaque strings; the only rule
//! enforced here is that neither may be empty.

pub mod health;
pub mod outcome;
pub mod registration;
pub mod time_service;

pub use health::*;
pub use outcome::*;
pub use registration::*;
pub use time_service::*;
