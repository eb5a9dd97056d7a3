//! Interactive terminal assistant that lets a chat model diagnose a server.
//!
//! The model proposes shell commands tagged `[cmd:query]` or `[cmd:modify]`; nothing runs before
//! the user confirms it, and modifying commands are confirmed twice. Command output goes back to
//! the model for another round of analysis until it stops proposing commands or the depth limit
//! is reached.

pub mod logging;

pub mod blacklist;
pub mod commands;
pub mod config;
pub mod confirm;
pub mod error_handling;
pub mod execution;
pub mod i18n;
pub mod prompts;
pub mod providers;
pub mod session;
pub mod spinner;
pub mod sysinfo;
pub mod truncate;
