//! Subcommand implementations.

pub mod apply;
pub mod init;
pub mod rank;
pub mod user;
pub mod verify;
