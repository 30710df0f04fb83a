//! The uplink client.
//!
//! Collectors hold a cloneable `Handle` and push `Series` into a bounded
//! channel. The `Client` owns the receiving end on its own thread: it folds
//! everything received into `Buckets` and, on every send tick, submits the
//! store as one batch. A batch that fails is kept and retried on the next
//! tick. After `ceil(DROP_WINDOW / send_interval)` consecutive failures the
//! batch is dropped. The client is the only place series are ever dropped;
//! producers block when the channel is full.

mod api;
mod logs;
mod stats;
mod transport;

pub use self::api::Api;
pub use self::logs::{LogShipper, LogSink};
pub use self::stats::{Snapshot, Stats};
pub use self::transport::{Http, Method, Request, Transport};

#[cfg(test)]
pub use self::api::test;

use crate::buckets::Buckets;
use crate::constants;
use crate::error::Error;
use crate::metric::Series;
use crate::thread::Shutdown;
use crate::time::{self, Ticker};
use std::cmp;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often the run loop checks for shutdown while series keep arriving.
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// The write-only face of the uplink, handed to every collector.
#[derive(Clone)]
pub struct Handle {
    chan: SyncSender<Series>,
    stats: Stats,
    host: String,
}

impl Handle {
    /// A handle and the receiver it feeds, without a `Client` behind it.
    pub fn pair<S>(capacity: usize, host: S) -> (Handle, Receiver<Series>)
    where
        S: Into<String>,
    {
        Handle::with_stats(capacity, host, Stats::new())
    }

    fn with_stats<S>(capacity: usize, host: S, stats: Stats) -> (Handle, Receiver<Series>)
    where
        S: Into<String>,
    {
        let (chan, recv) = mpsc::sync_channel(capacity);
        let handle = Handle {
            chan: chan,
            stats: stats,
            host: host.into(),
        };
        (handle, recv)
    }

    /// Queue `series` for the uplink, blocking while the channel is full.
    pub fn send(&self, series: Series) -> Result<(), Error> {
        self.chan.send(series).map_err(|_| Error::ChannelClosed)
    }

    /// The host label series are reported under.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The uplink counters.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    fn lifecycle(&self, metric: &str, host: &str, tags: &[String]) -> Result<(), Error> {
        self.send(Series::count(
            metric,
            time::now().timestamp(),
            1.0,
            0,
            host.to_string(),
            tags.to_vec(),
        ))
    }

    /// Report that the agent started.
    pub fn metric_client_up(&self, host: &str, tags: &[String]) -> Result<(), Error> {
        self.lifecycle("client.up", host, tags)
    }

    /// Report that the agent is shutting down. Send before the uplink is
    /// stopped so that it goes out with the final batch.
    pub fn metric_client_shutdown(&self, host: &str, tags: &[String]) -> Result<(), Error> {
        self.lifecycle("client.shutdown", host, tags)
    }
}

/// Outcome of one send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// Nothing was stored.
    Idle,
    /// This many series were accepted.
    Sent(usize),
    /// The attempt failed and the store was kept. Carries the number of
    /// consecutive failures so far.
    Retained(usize),
    /// The attempt failed, the threshold was reached and this many series
    /// were discarded.
    Dropped(usize),
}

/// The uplink: owns the receiving end of the series channel and the store.
pub struct Client {
    api: Arc<Api>,
    recv: Receiver<Series>,
    store: Buckets,
    stats: Stats,
    send_interval: Duration,
    drop_threshold: usize,
    failures: usize,
}

/// Consecutive failures tolerated before the store is dropped.
pub fn drop_threshold(send_interval: Duration) -> usize {
    let window = constants::DROP_WINDOW.as_millis();
    let interval = cmp::max(send_interval.as_millis(), 1);
    cmp::max((window + interval - 1) / interval, 1) as usize
}

impl Client {
    /// Build the uplink and the handle collectors write into.
    ///
    /// Fails with `ConfigInvalid` if `send_interval` is below
    /// `MIN_SEND_INTERVAL`.
    pub fn new<S>(
        api: Arc<Api>,
        host: S,
        send_interval: Duration,
        stats: Stats,
    ) -> Result<(Client, Handle), Error>
    where
        S: Into<String>,
    {
        if send_interval < constants::MIN_SEND_INTERVAL {
            return Err(Error::ConfigInvalid(format!(
                "send interval {:?} is below the minimum of {:?}",
                send_interval,
                constants::MIN_SEND_INTERVAL
            )));
        }
        let (handle, recv) = Handle::with_stats(constants::CHANNEL_CAPACITY, host, stats.clone());
        let client = Client {
            api: api,
            recv: recv,
            store: Buckets::default(),
            stats: stats,
            send_interval: send_interval,
            drop_threshold: drop_threshold(send_interval),
            failures: 0,
        };
        Ok((client, handle))
    }

    /// Consecutive failures tolerated before the store is dropped.
    pub fn drop_threshold(&self) -> usize {
        self.drop_threshold
    }

    /// Number of distinct series waiting for the next send.
    pub fn pending(&self) -> usize {
        self.store.len()
    }

    /// Fold a received series into the store.
    pub fn receive(&mut self, series: Series) {
        let hit = self.store.aggregate(series) as u64;
        if hit > 0 {
            self.stats.update(|s| s.store_aggregations += hit);
        }
    }

    /// Perform one send-cadence tick.
    pub fn tick(&mut self) -> Flush {
        let timeout = self.send_interval;
        self.flush(timeout)
    }

    fn flush(&mut self, timeout: Duration) -> Flush {
        if self.store.is_empty() {
            return Flush::Idle;
        }
        let series = self.store.series();
        match self.api.send_series(&series, timeout) {
            Ok(bytes) => {
                let sent = series.len();
                self.store.reset();
                self.failures = 0;
                self.stats.update(|s| {
                    s.sent_series += sent as u64;
                    s.sent_series_bytes += bytes as u64;
                });
                trace!("sent {} series in {} bytes", sent, bytes);
                Flush::Sent(sent)
            }
            Err(e) => {
                self.failures += 1;
                if self.failures >= self.drop_threshold {
                    let dropped = series.len();
                    self.store.reset();
                    self.failures = 0;
                    self.stats
                        .update(|s| s.sent_series_errors += dropped as u64);
                    warn!("{}: last error: {}", Error::UplinkExhausted(dropped), e);
                    Flush::Dropped(dropped)
                } else {
                    warn!(
                        "failed to send {} series ({}/{}): {}",
                        series.len(),
                        self.failures,
                        self.drop_threshold,
                        e
                    );
                    Flush::Retained(self.failures)
                }
            }
        }
    }

    fn drain(&mut self) -> Flush {
        while let Ok(series) = self.recv.try_recv() {
            self.receive(series);
        }
        let flush = self.flush(constants::SHUTDOWN_DRAIN_TIMEOUT);
        info!("uplink stopped after final flush: {:?}", flush);
        flush
    }

    /// Run until shutdown is requested or every `Handle` is gone, then drain
    /// the channel and make one last bounded send.
    pub fn run(mut self, mut shutdown: Shutdown) -> Flush {
        let mut ticker = Ticker::new(self.send_interval);
        let mut last_check = Instant::now();
        info!(
            "uplink running, sending every {:?}, dropping after {} failures",
            self.send_interval, self.drop_threshold
        );
        loop {
            let wait = cmp::min(ticker.remaining(), SHUTDOWN_POLL);
            match self.recv.recv_timeout(wait) {
                Ok(series) => self.receive(series),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return self.drain(),
            }
            if last_check.elapsed() >= SHUTDOWN_POLL {
                last_check = Instant::now();
                if shutdown.is_requested() {
                    return self.drain();
                }
            }
            if ticker.is_due() {
                ticker.advance();
                self.tick();
            }
        }
    }
}
