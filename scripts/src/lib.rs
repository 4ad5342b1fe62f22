//! Scripts for deploying option tokens and listing them on the options AMM.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod abi;
pub mod cli;
pub mod client;
mod commands;
pub mod config;
pub mod constants;
pub mod errors;
pub mod orchestrator;
pub mod types;
pub mod utils;
