//! Serial-number registration service.
//!
//! Binds activation serial numbers to machine registration codes on first
//! use, confirms repeated registrations with the same code, rejects
//! mismatches, and resolves codes back to their serial numbers.

pub mod config;
pub mod errors;
pub mod service;

pub use config::*;
pub use errors::*;
pub use service::RegistrationService;
