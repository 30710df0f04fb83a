use super::file_watcher::FileWatcher;
use crate::collector::{options, Collector, Config, Options, Probe};
use crate::error::Error;
use crate::measures::Measures;
use crate::metric::Sample;
use crate::thread::Shutdown;
use crate::time::{self, Ticker};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::BTreeMap;
use std::mem;
use std::path::PathBuf;
use std::time::Duration;

lazy_static! {
    static ref QUERY: Regex = Regex::new(r"query\[(\w+)\] (\S+) from (\S+)").unwrap();
}

const POLL: Duration = Duration::from_millis(500);

type Key = (String, String);

/// DNS queries per client, from the dnsmasq query log.
///
/// Runs as a daemon: it tails the log for as long as the agent runs and
/// folds the per-client query counts into `dns.queries` once per
/// `flush_interval`.
pub struct Dnsmasq {
    config: Config,
    measures: Measures,
    path: PathBuf,
    flush_interval: Duration,
    counts: BTreeMap<Key, u64>,
    last_flush: DateTime<Utc>,
}

/// `(client, query type)` of a query line.
fn parse(line: &str) -> Option<Key> {
    QUERY
        .captures(line)
        .map(|caps| (caps[3].to_string(), caps[1].to_string()))
}

impl Dnsmasq {
    fn record(&mut self, line: &str) {
        if let Some(key) = parse(line) {
            *self.counts.entry(key).or_insert(0) += 1;
        }
    }

    fn flush(&mut self) -> Result<(), Error> {
        let now = time::now();
        let since = mem::replace(&mut self.last_flush, now);
        let counts = mem::replace(&mut self.counts, BTreeMap::new());
        for (key, count) in counts {
            let (client, qtype) = (&key.0, &key.1);
            let mut template = Sample::new("dns.queries", 0.0)
                .host(self.config.host.as_str())
                .tags(self.config.tags.iter().cloned())
                .tag("client", client)
                .tag("qtype", qtype)
                .tags(
                    self.config
                        .tagger
                        .get_with_default(client, "hostname", "unknown"),
                );
            // a new or purged identity needs a baseline before its first increment
            if !self.measures.contains(&mut template) {
                self.measures.incr(template.clone().time(since))?;
            }
            let mut sample = template.time(now);
            sample.value = count as f64;
            match self.measures.incr(sample) {
                Ok(_) => {}
                Err(Error::NonPositiveInterval) => {
                    warn!(
                        "dnsmasq flushed twice within a second, carrying {} queries of {} over",
                        count, client
                    );
                    *self.counts.entry(key).or_insert(0) += count;
                }
                Err(e) => return Err(e),
            }
        }
        self.measures.purge();
        Ok(())
    }
}

impl Collector for Dnsmasq {
    fn name(&self) -> &'static str {
        Dnsmasq::NAME
    }

    fn is_daemon(&self) -> bool {
        true
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn collect(&mut self, shutdown: &mut Shutdown) -> Result<(), Error> {
        let mut watcher = FileWatcher::new(self.path.clone())
            .map_err(|e| Error::unavailable(self.path.display().to_string(), e))?;
        let mut window = Ticker::new(self.flush_interval);
        self.last_flush = time::now();
        let mut line = String::new();
        let mut missing = false;
        loop {
            if watcher.dead() != missing {
                missing = !missing;
                if missing {
                    warn!("{} is missing, waiting for it", self.path.display());
                } else {
                    info!("{} is back", self.path.display());
                }
            }
            loop {
                line.clear();
                match watcher.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => self.record(&line),
                    Err(e) => {
                        warn!("{}: {}", self.path.display(), e);
                        break;
                    }
                }
            }
            if window.is_due() {
                window.advance();
                self.flush()?;
            }
            shutdown.sleep(POLL)?;
        }
    }
}

impl Probe for Dnsmasq {
    const NAME: &'static str = "dnsmasq";

    fn default_options() -> Options {
        options::defaults(&[("path", "/tmp/dnsmasq.log"), ("flush_interval", "60s")])
    }

    fn default_collect_interval() -> Duration {
        Duration::from_secs(60)
    }

    fn new(config: Config) -> Result<Dnsmasq, Error> {
        let path = options::path(&config.options, "path")?;
        let flush_interval = options::duration(&config.options, "flush_interval")?;
        if flush_interval < Duration::from_secs(1) {
            return Err(Error::ConfigInvalid(format!(
                "dnsmasq flush_interval {:?} is below one second",
                flush_interval
            )));
        }
        Ok(Dnsmasq {
            measures: super::measures(&config),
            config: config,
            path: path,
            flush_interval: flush_interval,
            counts: BTreeMap::new(),
            last_flush: time::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test;
    use super::*;
    use crate::metric::parse_all;
    use crate::thread;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempdir::TempDir;

    #[test]
    fn parses_query_lines() {
        assert_eq!(
            Some(("10.0.0.2".to_string(), "AAAA".to_string())),
            parse("Jan  1 00:00:00 dnsmasq[412]: query[AAAA] example.com from 10.0.0.2")
        );
        assert_eq!(
            None,
            parse("Jan  1 00:00:00 dnsmasq[412]: reply example.com is 1.2.3.4")
        );
    }

    #[test]
    fn folds_queries_per_client() {
        let (config, recv) = test::config(Dnsmasq::default_options());
        config
            .tagger
            .add("10.0.0.2", parse_all(&["hostname:laptop"]).unwrap());
        let mut probe = Dnsmasq::new(config).unwrap();
        probe.last_flush = time::now() - chrono::Duration::seconds(60);
        for _ in 0..3 {
            probe.record("dnsmasq[1]: query[A] a.com from 10.0.0.2");
        }
        probe.record("dnsmasq[1]: query[A] b.com from 10.0.0.3");
        probe.record("dnsmasq[1]: forwarded a.com to 1.1.1.1");
        probe.flush().unwrap();

        let got = test::drain(&recv);
        let queries = &got["dns.queries"];
        assert_eq!(2, queries.len());
        assert_eq!(3.0, queries[0].points[0].1);
        assert_eq!(Some(60), queries[0].interval);
        assert!(queries[0].tags.contains(&"hostname:laptop".to_string()));
        assert!(queries[0].tags.contains(&"qtype:A".to_string()));
        assert!(queries[1].tags.contains(&"hostname:unknown".to_string()));
        assert!(probe.counts.is_empty());
    }

    fn queries(recv: &::std::sync::mpsc::Receiver<crate::metric::Series>) -> Vec<f64> {
        recv.try_iter()
            .filter(|s| s.metric == "dns.queries")
            .map(|s| s.points[0].1)
            .collect()
    }

    #[test]
    fn purged_client_gets_a_new_baseline() {
        let (config, recv) = test::config(Dnsmasq::default_options());
        let mut probe = Dnsmasq::new(config).unwrap();
        probe.last_flush = time::now() - chrono::Duration::seconds(60);
        probe.record("dnsmasq[1]: query[A] a.com from 10.0.0.2");
        probe.flush().unwrap();
        assert_eq!(vec![1.0], queries(&recv));

        let later = time::now() + chrono::Duration::hours(49);
        assert_eq!(1, probe.measures.purge_at(later));

        probe.last_flush = time::now() - chrono::Duration::seconds(60);
        for _ in 0..5 {
            probe.record("dnsmasq[1]: query[A] a.com from 10.0.0.2");
        }
        probe.flush().unwrap();
        assert_eq!(vec![5.0], queries(&recv));
    }

    #[test]
    fn same_second_flush_carries_counts_over() {
        let (config, recv) = test::config(Dnsmasq::default_options());
        let mut probe = Dnsmasq::new(config).unwrap();
        probe.last_flush = time::now() - chrono::Duration::seconds(60);
        probe.record("dnsmasq[1]: query[A] a.com from 10.0.0.2");
        probe.flush().unwrap();
        assert_eq!(vec![1.0], queries(&recv));

        probe.record("dnsmasq[1]: query[A] a.com from 10.0.0.2");
        probe.record("dnsmasq[1]: query[MX] a.com from 10.0.0.2");
        probe.flush().unwrap();
        let key = ("10.0.0.2".to_string(), "A".to_string());
        assert_eq!(Some(&1), probe.counts.get(&key));

        ::std::thread::sleep(Duration::from_millis(1100));
        probe.flush().unwrap();
        let mut got = queries(&recv);
        got.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(vec![1.0, 1.0], got);
        assert!(probe.counts.is_empty());
    }

    #[test]
    fn tails_until_shutdown() {
        let dir = TempDir::new("pigeon-dnsmasq").unwrap();
        let path = dir.path().join("dnsmasq.log");
        let mut opts = Dnsmasq::default_options();
        opts.insert("path".to_string(), path.display().to_string());
        opts.insert("flush_interval".to_string(), "1s".to_string());
        let (config, recv) = test::config(opts);
        let mut probe = Dnsmasq::new(config).unwrap();
        assert!(probe.is_daemon());
        let worker = thread::spawn("dnsmasq", move |mut shutdown| {
            probe.collect(&mut shutdown)
        }).unwrap();

        ::std::thread::sleep(Duration::from_millis(700));
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .unwrap();
        for _ in 0..4 {
            writeln!(log, "dnsmasq[1]: query[A] a.com from 10.0.0.2").unwrap();
        }
        drop(log);
        ::std::thread::sleep(Duration::from_millis(2500));
        let result = worker.shutdown().unwrap();
        assert!(result.unwrap_err().is_cancelled());

        let total: f64 = recv
            .try_iter()
            .filter(|s| s.metric == "dns.queries")
            .map(|s| s.points[0].1)
            .sum();
        assert_eq!(4.0, total);
    }
}
