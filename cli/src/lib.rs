//! aiwhisper-cli library: argument types and command implementations,
//! exposed for unit tests.

pub mod commands;
pub mod error;
