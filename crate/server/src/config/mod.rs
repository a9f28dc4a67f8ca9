mod clap_config;
mod params;

pub use clap_config::{ClapConfig, Command, HsmConfig, HttpConfig, SocketConfig};
pub use params::{ServerParams, SocketParams};
