//! API route modules.

pub mod chunks;
pub mod diagnostics;
pub mod finalize;
pub mod mail;
