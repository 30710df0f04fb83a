use super::read_source;
use crate::collector::{options, Collector, Config, Options, Probe};
use crate::error::Error;
use crate::measures::Measures;
use crate::metric::Sample;
use crate::thread::Shutdown;
use crate::time;
use std::path::PathBuf;
use std::time::Duration;

const FIELDS: &[(&str, &str)] = &[
    ("MemTotal", "system.mem.total"),
    ("MemFree", "system.mem.free"),
    ("MemAvailable", "system.mem.available"),
    ("Buffers", "system.mem.buffers"),
    ("Cached", "system.mem.cached"),
    ("SwapTotal", "system.swap.total"),
    ("SwapFree", "system.swap.free"),
];

/// Memory usage from `/proc/meminfo`, in bytes.
///
/// Values that have not moved since the last emission are suppressed for up
/// to `max_silence`.
pub struct Memory {
    config: Config,
    measures: Measures,
    path: PathBuf,
    max_silence: Duration,
}

/// `(field, bytes)` for every known field in `raw`.
fn parse(raw: &str) -> Vec<(&'static str, f64)> {
    let mut out = Vec::new();
    for line in raw.lines() {
        let mut parts = line.splitn(2, ':');
        let key = parts.next().unwrap_or("").trim();
        let metric = match FIELDS.iter().find(|&&(field, _)| field == key) {
            Some(&(_, metric)) => metric,
            None => continue,
        };
        let mut value = parts.next().unwrap_or("").split_whitespace();
        let amount: f64 = match value.next().and_then(|v| v.parse().ok()) {
            Some(amount) => amount,
            None => {
                error!("meminfo: skipping malformed line {:?}", line);
                continue;
            }
        };
        let scale = match value.next() {
            Some("kB") => 1024.0,
            _ => 1.0,
        };
        out.push((metric, amount * scale));
    }
    out
}

impl Collector for Memory {
    fn name(&self) -> &'static str {
        Memory::NAME
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn collect(&mut self, _shutdown: &mut Shutdown) -> Result<(), Error> {
        let raw = read_source(&self.path)?;
        let now = time::now();
        for (metric, bytes) in parse(&raw) {
            self.measures.gauge_deviation(
                Sample::new(metric, bytes)
                    .time(now)
                    .host(self.config.host.as_str())
                    .tags(self.config.tags.iter().cloned()),
                self.max_silence,
            )?;
        }
        self.measures.purge();
        Ok(())
    }
}

impl Probe for Memory {
    const NAME: &'static str = "memory";

    fn default_options() -> Options {
        options::defaults(&[("path", "/proc/meminfo"), ("max_silence", "5m")])
    }

    fn default_collect_interval() -> Duration {
        Duration::from_secs(30)
    }

    fn new(config: Config) -> Result<Memory, Error> {
        let path = options::path(&config.options, "path")?;
        let max_silence = options::duration(&config.options, "max_silence")?;
        Ok(Memory {
            measures: super::measures(&config),
            config: config,
            path: path,
            max_silence: max_silence,
        })
    }
}
