//! Subcommand implementations.

pub mod clean;
pub mod info;
pub mod presets;
pub mod suggest;
