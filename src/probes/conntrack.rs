use super::read_source;
use crate::collector::{options, Collector, Config, Options, Probe};
use crate::error::Error;
use crate::measures::Measures;
use crate::metric::Sample;
use crate::thread::Shutdown;
use std::path::PathBuf;
use std::time::Duration;

/// Connection tracking table usage.
pub struct Conntrack {
    config: Config,
    measures: Measures,
    table: PathBuf,
    max: PathBuf,
    max_silence: Duration,
}

impl Conntrack {
    fn emit(&mut self, metric: &str, value: f64) -> Result<(), Error> {
        let sample = Sample::new(metric, value)
            .host(self.config.host.as_str())
            .tags(self.config.tags.iter().cloned());
        self.measures.gauge_deviation(sample, self.max_silence)?;
        Ok(())
    }
}

impl Collector for Conntrack {
    fn name(&self) -> &'static str {
        Conntrack::NAME
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn collect(&mut self, _shutdown: &mut Shutdown) -> Result<(), Error> {
        let table = read_source(&self.table)?;
        let entries = table.lines().filter(|l| !l.trim().is_empty()).count();
        let raw_max = read_source(&self.max)?;
        let max: f64 = raw_max
            .trim()
            .parse()
            .map_err(|_| Error::Parse(format!("conntrack max: {:?}", raw_max.trim())))?;
        self.emit("system.net.conntrack.entries", entries as f64)?;
        self.emit("system.net.conntrack.max", max)?;
        self.measures.purge();
        Ok(())
    }
}

impl Probe for Conntrack {
    const NAME: &'static str = "conntrack";

    fn default_options() -> Options {
        options::defaults(&[
            ("path", "/proc/net/ip_conntrack"),
            ("max_path", "/proc/sys/net/netfilter/nf_conntrack_max"),
            ("max_silence", "5m"),
        ])
    }

    fn default_collect_interval() -> Duration {
        Duration::from_secs(30)
    }

    fn new(config: Config) -> Result<Conntrack, Error> {
        let table = options::path(&config.options, "path")?;
        let max = options::path(&config.options, "max_path")?;
        let max_silence = options::duration(&config.options, "max_silence")?;
        Ok(Conntrack {
            measures: super::measures(&config),
            config: config,
            table: table,
            max: max,
            max_silence: max_silence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test;
    use super::*;
    use std::fs;
    use tempdir::TempDir;

    #[test]
    fn counts_table_entries() {
        let dir = TempDir::new("pigeon-conntrack").unwrap();
        let table = dir.path().join("ip_conntrack");
        let max = dir.path().join("nf_conntrack_max");
        fs::write(
            &table,
            "tcp 6 431999 ESTABLISHED src=10.0.0.2 dst=1.1.1.1\n\
             udp 17 29 src=10.0.0.3 dst=8.8.8.8\n",
        ).unwrap();
        fs::write(&max, "16384\n").unwrap();
        let mut opts = Conntrack::default_options();
        opts.insert("path".to_string(), table.display().to_string());
        opts.insert("max_path".to_string(), max.display().to_string());
        let (config, recv) = test::config(opts);
        let mut probe = Conntrack::new(config).unwrap();
        let (mut shutdown, _trigger) = Shutdown::pair().unwrap();
        probe.collect(&mut shutdown).unwrap();
        let got = test::drain(&recv);
        assert_eq!(2.0, got["system.net.conntrack.entries"][0].points[0].1);
        assert_eq!(16384.0, got["system.net.conntrack.max"][0].points[0].1);

        fs::write(&max, "many\n").unwrap();
        assert!(probe.collect(&mut shutdown).is_err());
    }
}
