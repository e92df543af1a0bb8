//! CLI command implementations

pub mod check;
pub mod generate;
pub mod peers;
pub mod setup;
pub mod status;
