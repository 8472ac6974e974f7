//! CLI commands for Satchel.
//!
//! This module provides operator commands for a deployment's session store:
//! - **Setup**: init
//! - **Inspection**: sessions, show, decode
//! - **Maintenance**: clean

pub mod clean;
pub mod decode;
pub mod init;
pub mod sessions;
pub mod show;

pub use clean::CleanCommand;
pub use decode::DecodeCommand;
pub use init::InitCommand;
pub use sessions::SessionsCommand;
pub use show::ShowCommand;
