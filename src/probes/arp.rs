use super::read_source;
use crate::collector::{options, Collector, Config, Options, Probe};
use crate::error::Error;
use crate::measures::Measures;
use crate::metric::{Sample, Tag};
use crate::thread::Shutdown;
use crate::time;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

const INCOMPLETE: &str = "00:00:00:00:00:00";

/// Neighbors from the kernel ARP table.
pub struct Arp {
    config: Config,
    measures: Measures,
    path: PathBuf,
}

#[derive(Debug, PartialEq)]
struct Neighbor<'a> {
    ip: &'a str,
    mac: &'a str,
    device: &'a str,
}

/// `IP address  HW type  Flags  HW address  Mask  Device`, header skipped by
/// the caller. Incomplete entries yield `None`.
fn parse(line: &str) -> Result<Option<Neighbor>, Error> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 6 {
        return Err(Error::Parse(format!("arp: {:?}", line)));
    }
    if fields[2] == "0x0" || fields[3] == INCOMPLETE {
        return Ok(None);
    }
    Ok(Some(Neighbor {
        ip: fields[0],
        mac: fields[3],
        device: fields[5],
    }))
}

impl Collector for Arp {
    fn name(&self) -> &'static str {
        Arp::NAME
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn collect(&mut self, _shutdown: &mut Shutdown) -> Result<(), Error> {
        let raw = read_source(&self.path)?;
        let now = time::now();
        let mut per_device: BTreeMap<&str, usize> = BTreeMap::new();
        for line in raw.lines().skip(1).filter(|l| !l.trim().is_empty()) {
            let neighbor = match parse(line) {
                Ok(Some(neighbor)) => neighbor,
                Ok(None) => continue,
                Err(e) => {
                    error!("{}: {}", self.path.display(), e);
                    continue;
                }
            };
            *per_device.entry(neighbor.device).or_insert(0) += 1;

            let tagger = &self.config.tagger;
            tagger.update(neighbor.mac, vec![Tag::new("ip", neighbor.ip)?]);
            tagger.update(neighbor.ip, vec![Tag::new("mac", neighbor.mac)?]);

            let tags = tagger.get_with_default(neighbor.mac, "hostname", "unknown");
            self.measures.gauge(
                Sample::new("net.arp.neighbor", 1.0)
                    .time(now)
                    .host(self.config.host.as_str())
                    .tags(self.config.tags.iter().cloned())
                    .tag("device", neighbor.device)
                    .tags(tags),
            )?;
        }
        for (device, count) in per_device {
            self.measures.gauge(
                Sample::new("net.arp.entries", count as f64)
                    .time(now)
                    .host(self.config.host.as_str())
                    .tags(self.config.tags.iter().cloned())
                    .tag("device", device),
            )?;
        }
        Ok(())
    }
}

impl Probe for Arp {
    const NAME: &'static str = "arp";

    fn default_options() -> Options {
        options::defaults(&[("path", "/proc/self/net/arp")])
    }

    fn default_collect_interval() -> Duration {
        Duration::from_secs(60)
    }

    fn new(config: Config) -> Result<Arp, Error> {
        let path = options::path(&config.options, "path")?;
        Ok(Arp {
            measures: super::measures(&config),
            config: config,
            path: path,
        })
    }
}
