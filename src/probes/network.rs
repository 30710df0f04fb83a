use super::read_source;
use crate::collector::{options, Collector, Config, Options, Probe};
use crate::error::Error;
use crate::measures::Measures;
use crate::metric::Sample;
use crate::thread::Shutdown;
use crate::time;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const STATS: &[&str] = &[
    "rx_bytes",
    "tx_bytes",
    "rx_packets",
    "tx_packets",
    "rx_errors",
    "tx_errors",
    "rx_dropped",
    "tx_dropped",
];

/// Per-interface traffic counters from `/sys/class/net`.
///
/// Interface counters reset when a link is re-created, so a decrease rebases
/// the counter instead of failing the collect.
pub struct Network {
    config: Config,
    measures: Measures,
    root: PathBuf,
    exclude: BTreeSet<String>,
    known: BTreeSet<String>,
}

impl Network {
    fn sample(&self, iface: &str, stat: &str, value: f64) -> Sample {
        Sample::new(format!("system.net.{}", stat), value)
            .host(self.config.host.as_str())
            .tags(self.config.tags.iter().cloned())
            .tag("iface", iface)
    }

    fn interfaces(&self) -> Result<BTreeSet<String>, Error> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| Error::unavailable(self.root.display().to_string(), e))?;
        let mut ifaces = BTreeSet::new();
        for entry in entries {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if !self.exclude.contains(&name) {
                ifaces.insert(name);
            }
        }
        Ok(ifaces)
    }
}

impl Collector for Network {
    fn name(&self) -> &'static str {
        Network::NAME
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn collect(&mut self, _shutdown: &mut Shutdown) -> Result<(), Error> {
        let ifaces = self.interfaces()?;
        let now = time::now();
        for iface in &ifaces {
            for stat in STATS {
                let path = self.root.join(iface).join("statistics").join(stat);
                let raw = match read_source(&path) {
                    Ok(raw) => raw,
                    Err(e) => {
                        debug!("{}", e);
                        continue;
                    }
                };
                let value: f64 = match raw.trim().parse() {
                    Ok(value) => value,
                    Err(_) => {
                        error!("{}: not a counter: {:?}", path.display(), raw.trim());
                        continue;
                    }
                };
                let sample = self.sample(iface, stat, value).time(now);
                match self.measures.count_with_negative_reset(sample) {
                    Ok(_) => {}
                    Err(Error::NonPositiveInterval) => {
                        debug!("{} sampled twice within a second", iface)
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        for gone in self.known.difference(&ifaces) {
            debug!("interface {} vanished", gone);
            for stat in STATS {
                let sample = self.sample(gone, stat, 0.0);
                self.measures.delete(sample);
            }
        }
        self.known = ifaces;
        self.measures.purge();
        Ok(())
    }
}

impl Probe for Network {
    const NAME: &'static str = "network";

    fn default_options() -> Options {
        options::defaults(&[("path", "/sys/class/net"), ("exclude", "lo")])
    }

    fn default_collect_interval() -> Duration {
        Duration::from_secs(15)
    }

    fn new(config: Config) -> Result<Network, Error> {
        let root = options::path(&config.options, "path")?;
        let exclude = options::get(&config.options, "exclude")?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(Network {
            measures: super::measures(&config),
            config: config,
            root: root,
            exclude: exclude,
            known: BTreeSet::new(),
        })
    }
}
