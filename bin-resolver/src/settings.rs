use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::net::Ipv4Addr;

/// Base name of the optional settings file, looked up in the working
/// directory with any extension the `config` crate understands.
const SETTINGS_BASENAME: &str = "resolver";

/// Optional settings file.  Everything here has a default, so running
/// without a file is fine.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Default)]
pub struct Settings {
    /// The root nameserver to start resolution from.
    #[serde(default)]
    pub root_server: Option<Ipv4Addr>,
    /// The port the root nameserver listens on.
    #[serde(default)]
    pub root_port: Option<u16>,
    /// Deadline, in seconds, for each UDP exchange.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Desired maximum number of cached records.
    #[serde(default)]
    pub cache_size: Option<usize>,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(SETTINGS_BASENAME).required(false))
            .build()?
            .try_deserialize()
    }
}
