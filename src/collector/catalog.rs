use super::{Collector, Config, Options, Probe};
use crate::error::Error;
use crate::probes;
use std::time::Duration;

/// How to build one kind of collector.
#[derive(Clone, Copy)]
pub struct Entry {
    /// The configured name.
    pub name: &'static str,
    /// Interval used when the configuration sets none.
    pub default_interval: Duration,
    /// Every option the collector understands, with defaults.
    pub default_options: fn() -> Options,
    /// Fallible constructor.
    pub build: fn(Config) -> Result<Box<dyn Collector>, Error>,
}

fn build<P: Probe>(config: Config) -> Result<Box<dyn Collector>, Error> {
    Ok(Box::new(P::new(config)?))
}

/// The set of collectors pigeon knows how to build, by name.
#[derive(Clone, Default)]
pub struct Catalog {
    entries: Vec<Entry>,
}

impl Catalog {
    /// An empty catalog.
    pub fn new() -> Catalog {
        Catalog::default()
    }

    /// The built-in probes.
    pub fn builtin() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.register::<probes::Load>();
        catalog.register::<probes::Memory>();
        catalog.register::<probes::Network>();
        catalog.register::<probes::Conntrack>();
        catalog.register::<probes::Leases>();
        catalog.register::<probes::Arp>();
        catalog.register::<probes::Dnsmasq>();
        catalog.register::<probes::Internal>();
        catalog
    }

    /// Add `P`, replacing any entry registered under the same name.
    pub fn register<P: Probe>(&mut self) {
        self.insert(Entry {
            name: P::NAME,
            default_interval: P::default_collect_interval(),
            default_options: P::default_options,
            build: build::<P>,
        });
    }

    /// Add a hand-built entry, replacing any under the same name.
    pub fn insert(&mut self, entry: Entry) {
        self.entries.retain(|e| e.name != entry.name);
        self.entries.push(entry);
    }

    /// The entry registered under `name`.
    pub fn lookup(&self, name: &str) -> Result<&Entry, Error> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::ConfigInvalid(format!("unknown collector {:?}", name)))
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name).collect()
    }
}
