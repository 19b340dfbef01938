pub mod adb;
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod files;
pub mod output;
pub mod progress;

#[cfg(test)]
pub mod testing;
