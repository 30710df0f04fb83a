//! The built-in collectors.
//!
//! Each probe reads one corner of the host (mostly `/proc` and `/sys`) and
//! knows nothing about scheduling or shipping. They are registered by name in
//! `Catalog::builtin`.

mod arp;
mod conntrack;
mod dnsmasq;
mod file_watcher;
mod internal;
mod leases;
mod load;
mod memory;
mod network;

pub use self::arp::Arp;
pub use self::conntrack::Conntrack;
pub use self::dnsmasq::Dnsmasq;
pub use self::internal::Internal;
pub use self::leases::Leases;
pub use self::load::Load;
pub use self::memory::Memory;
pub use self::network::Network;

use crate::collector::Config;
use crate::constants;
use crate::error::Error;
use crate::measures::Measures;
use std::fs;
use std::path::Path;

/// Read all of `path`, reporting failure as `SourceUnavailable`.
pub fn read_source(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path).map_err(|e| Error::unavailable(path.display().to_string(), e))
}

/// The `Measures` every probe starts with.
fn measures(config: &Config) -> Measures {
    Measures::new(config.client.clone(), constants::COUNT_MAX_AGE_SAMPLE)
}
