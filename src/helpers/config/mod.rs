//! Layered configuration: entry defaults, then `cool-socket.toml`, then command line arguments

use super::*;

mod build_config;
mod config_builder;
mod config_entries;
mod load_toml;
mod master_config;
mod parse_args;
#[cfg(test)]
mod tests;

pub use build_config::{build_config, build_config_with};
pub use config_builder::ConfigEntry;
pub use master_config::{MasterConfig, NetConfig};

use config_builder::*;
use config_entries::*;
use load_toml::*;
use parse_args::*;
