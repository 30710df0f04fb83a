use super::read_source;
use crate::collector::{options, Collector, Config, Options, Probe};
use crate::error::Error;
use crate::measures::Measures;
use crate::metric::Sample;
use crate::thread::Shutdown;
use crate::time;
use std::path::PathBuf;
use std::time::Duration;

/// Load averages and process counts from `/proc/loadavg`.
pub struct Load {
    config: Config,
    measures: Measures,
    path: PathBuf,
}

struct LoadAvg {
    one: f64,
    five: f64,
    fifteen: f64,
    running: f64,
    total: f64,
}

fn parse_float(field: Option<&str>, line: &str) -> Result<f64, Error> {
    field
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| Error::Parse(format!("loadavg: {:?}", line)))
}

fn parse(line: &str) -> Result<LoadAvg, Error> {
    let mut fields = line.split_whitespace();
    let one = parse_float(fields.next(), line)?;
    let five = parse_float(fields.next(), line)?;
    let fifteen = parse_float(fields.next(), line)?;
    let mut procs = fields.next().unwrap_or("").splitn(2, '/');
    let running = parse_float(procs.next(), line)?;
    let total = parse_float(procs.next(), line)?;
    Ok(LoadAvg {
        one: one,
        five: five,
        fifteen: fifteen,
        running: running,
        total: total,
    })
}

impl Collector for Load {
    fn name(&self) -> &'static str {
        Load::NAME
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn collect(&mut self, _shutdown: &mut Shutdown) -> Result<(), Error> {
        let raw = read_source(&self.path)?;
        let load = parse(raw.trim())?;
        let now = time::now();
        for &(name, value) in &[
            ("system.load.1", load.one),
            ("system.load.5", load.five),
            ("system.load.15", load.fifteen),
            ("system.procs.running", load.running),
            ("system.procs.total", load.total),
        ] {
            self.measures.gauge(
                Sample::new(name, value)
                    .time(now)
                    .host(self.config.host.as_str())
                    .tags(self.config.tags.iter().cloned()),
            )?;
        }
        Ok(())
    }
}

impl Probe for Load {
    const NAME: &'static str = "load";

    fn default_options() -> Options {
        options::defaults(&[("path", "/proc/loadavg")])
    }

    fn default_collect_interval() -> Duration {
        Duration::from_secs(15)
    }

    fn new(config: Config) -> Result<Load, Error> {
        let path = options::path(&config.options, "path")?;
        Ok(Load {
            measures: super::measures(&config),
            config: config,
            path: path,
        })
    }
}
