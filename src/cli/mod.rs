//! CLI module - interactive front end
//!
//! Contains the REPL, slash commands and the terminal approval prompt.

pub mod commands;
pub mod repl;

pub use repl::{Repl, StdinApprover};
