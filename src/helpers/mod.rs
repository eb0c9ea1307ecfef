//! General useful bits and bobs

use super::*;

mod config;
mod filesystem;
mod ids;
mod or_log;
#[cfg(test)]
pub mod test_helpers;
mod thin_ptr;

pub use config::{build_config, build_config_with, ConfigEntry, MasterConfig, NetConfig};
pub use filesystem::{real_filesystem, Filesystem, FilesystemTrait};
pub use ids::{random_call_id, random_uuid};
pub use or_log::OrLog;
#[cfg(test)]
pub use test_helpers::*;
pub use thin_ptr::ThinPtr;
