//! Drives a single collector on its worker thread.

use crate::collector::{Collector, State, Status};
use crate::error::Error;
use crate::metric::{Sample, Series};
use crate::thread::Shutdown;
use crate::time::{self, Ticker};
use std::time::Instant;

/// Run `collector` until shutdown.
///
/// A daemon collector is called once and its result returned. A periodic one
/// is called on every tick of its collect interval, the first tick one
/// interval after start. Its failures are logged and recorded in
/// `collector.runs`, never returned. Returns `Cancelled` once shutdown is
/// observed.
pub fn run_collection(
    collector: &mut dyn Collector,
    shutdown: &mut Shutdown,
    status: &Status,
) -> Result<(), Error> {
    status.set(State::Running);
    let result = if collector.is_daemon() {
        run_daemon(collector, shutdown, status)
    } else {
        run_periodic(collector, shutdown, status)
    };
    status.set(State::Stopped);
    result
}

fn run_daemon(
    collector: &mut dyn Collector,
    shutdown: &mut Shutdown,
    status: &Status,
) -> Result<(), Error> {
    info!("daemon collector {} starting", collector.name());
    let result = collector.collect(shutdown);
    if shutdown.is_requested() {
        status.set(State::Stopping);
        return Err(Error::Cancelled);
    }
    match result {
        Ok(()) => {
            warn!("daemon collector {} returned", collector.name());
            Ok(())
        }
        Err(e) => {
            error!("daemon collector {} failed: {}", collector.name(), e);
            Err(e)
        }
    }
}

fn run_periodic(
    collector: &mut dyn Collector,
    shutdown: &mut Shutdown,
    status: &Status,
) -> Result<(), Error> {
    let interval = collector.config().collect_interval;
    let mut ticker = Ticker::new(interval);
    info!(
        "collector {} starting, collecting every {:?}",
        collector.name(),
        interval
    );
    loop {
        if shutdown.wait(ticker.remaining()) {
            status.set(State::Stopping);
            return Err(Error::Cancelled);
        }
        if !ticker.is_due() {
            continue;
        }
        ticker.advance();

        let t0 = time::now();
        let start = Instant::now();
        let success = match collector.collect(shutdown) {
            Ok(()) => true,
            Err(ref e) if e.is_cancelled() => {
                status.set(State::Stopping);
                return Err(Error::Cancelled);
            }
            Err(e) => {
                error!("collector {} failed: {}", collector.name(), e);
                false
            }
        };
        let elapsed = time::as_secs_f64(start.elapsed());

        let config = collector.config();
        let mut tags = vec![
            format!("collector:{}", collector.name()),
            format!("success:{}", success),
        ];
        tags.extend(collector.tags().iter().cloned());
        let runs = Series::count(
            "collector.runs",
            t0.timestamp(),
            1.0,
            interval.as_secs(),
            config.host.clone(),
            tags.clone(),
        );
        let duration = Series::gauge(
            Sample::new("collector.duration", elapsed)
                .time(t0)
                .host(config.host.as_str())
                .tags(tags),
        );
        for series in vec![runs, duration] {
            if let Err(e) = config.client.send(series) {
                warn!("collector {} telemetry lost: {}", collector.name(), e);
            }
        }
    }
}
