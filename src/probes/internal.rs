//! Self-telemetry.
//!
//! 'Internal' lets pigeon report on itself through the same path as every
//! other collector: the uplink counters become counts and the tagger size
//! becomes gauges.

use crate::collector::{options, Collector, Config, Options, Probe};
use crate::error::Error;
use crate::measures::Measures;
use crate::metric::Sample;
use crate::thread::Shutdown;
use crate::time;
use std::time::Duration;

/// The configuration-free self-telemetry collector.
pub struct Internal {
    config: Config,
    measures: Measures,
}

impl Internal {
    fn sample(&self, name: &str, value: f64) -> Sample {
        Sample::new(name, value)
            .host(self.config.host.as_str())
            .tags(self.config.tags.iter().cloned())
    }
}

impl Collector for Internal {
    fn name(&self) -> &'static str {
        Internal::NAME
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn collect(&mut self, _shutdown: &mut Shutdown) -> Result<(), Error> {
        let now = time::now();
        let stats = self.config.client.stats().snapshot();
        for &(name, value) in &[
            ("client.metrics.sent_bytes", stats.sent_series_bytes),
            ("client.metrics.sent", stats.sent_series),
            ("client.metrics.errors", stats.sent_series_errors),
            ("client.store.aggregations", stats.store_aggregations),
            ("client.logs.sent_bytes", stats.sent_logs_bytes),
            ("client.logs.errors", stats.sent_logs_errors),
        ] {
            let sample = self.sample(name, value as f64).time(now);
            self.measures.count_with_negative_reset(sample)?;
        }

        let (entities, keys, tags) = self.config.tagger.stats();
        for &(name, value) in &[
            ("tagger.entities", entities),
            ("tagger.keys", keys),
            ("tagger.tags", tags),
        ] {
            let sample = self.sample(name, value as f64).time(now);
            self.measures.gauge(sample)?;
        }
        self.measures.purge();
        Ok(())
    }
}

impl Probe for Internal {
    const NAME: &'static str = "internal";

    fn default_options() -> Options {
        options::defaults(&[])
    }

    fn default_collect_interval() -> Duration {
        Duration::from_secs(60)
    }

    fn new(config: Config) -> Result<Internal, Error> {
        Ok(Internal {
            measures: super::measures(&config),
            config: config,
        })
    }
}
