//! Forwarding of the agent's own log output to the remote logs endpoint.
//!
//! `LogSink` is handed to the logger as a plain writer. It only ever appends
//! to an in-memory buffer and, when the buffer is large or old enough, hands
//! the whole buffer over to the `LogShipper` thread, which does the network
//! I/O. A log call never blocks on the network.

use super::api::Api;
use super::stats::Stats;
use crate::constants;
use crate::thread::Shutdown;
use std::io::{self, Write};
use std::mem;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const SHIP_TIMEOUT: Duration = Duration::from_secs(10);
const PENDING_SHIPMENTS: usize = 4;

struct Buffer {
    bytes: Vec<u8>,
    last_flush: Instant,
}

impl Buffer {
    fn take(&mut self) -> Option<Vec<u8>> {
        self.last_flush = Instant::now();
        if self.bytes.is_empty() {
            None
        } else {
            Some(mem::replace(&mut self.bytes, Vec::new()))
        }
    }
}

type Shared = Arc<Mutex<Buffer>>;

fn lock(buffer: &Shared) -> MutexGuard<Buffer> {
    buffer.lock().unwrap_or_else(|e| e.into_inner())
}

/// The logger-facing half: a buffering `Write`.
#[derive(Clone)]
pub struct LogSink {
    buffer: Shared,
    chan: SyncSender<Vec<u8>>,
    trigger: usize,
    period: Duration,
}

/// The network-facing half. Run it on its own thread.
pub struct LogShipper {
    api: Arc<Api>,
    stats: Stats,
    buffer: Shared,
    recv: Receiver<Vec<u8>>,
    period: Duration,
}

impl LogSink {
    /// A sink shipping through `api` with the default size and age triggers.
    pub fn new(api: Arc<Api>, stats: Stats) -> (LogSink, LogShipper) {
        LogSink::with_limits(
            api,
            stats,
            constants::BUFFER_SYNC_TRIGGER,
            constants::LOG_FLUSH_PERIOD,
        )
    }

    /// A sink that ships once `trigger` bytes are buffered or the buffer was
    /// last shipped more than `period` ago.
    pub fn with_limits(
        api: Arc<Api>,
        stats: Stats,
        trigger: usize,
        period: Duration,
    ) -> (LogSink, LogShipper) {
        let buffer = Arc::new(Mutex::new(Buffer {
            bytes: Vec::new(),
            last_flush: Instant::now(),
        }));
        let (chan, recv) = mpsc::sync_channel(PENDING_SHIPMENTS);
        let sink = LogSink {
            buffer: Arc::clone(&buffer),
            chan: chan,
            trigger: trigger,
            period: period,
        };
        let shipper = LogShipper {
            api: api,
            stats: stats,
            buffer: buffer,
            recv: recv,
            period: period,
        };
        (sink, shipper)
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let ready = {
            let mut buffer = lock(&self.buffer);
            buffer.bytes.extend_from_slice(buf);
            if buffer.bytes.len() >= self.trigger || buffer.last_flush.elapsed() >= self.period {
                buffer.take()
            } else {
                None
            }
        };
        if let Some(bytes) = ready {
            match self.chan.try_send(bytes) {
                Ok(()) => {}
                Err(TrySendError::Full(bytes)) => {
                    // shipper is behind, keep the bytes in order for the next try
                    let mut buffer = lock(&self.buffer);
                    let tail = mem::replace(&mut buffer.bytes, bytes);
                    buffer.bytes.extend(tail);
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogShipper {
    fn ship(&self, bytes: &[u8]) {
        match self.api.send_logs(bytes, SHIP_TIMEOUT) {
            Ok(sent) => self.stats.update(|s| s.sent_logs_bytes += sent as u64),
            Err(e) => {
                self.stats.update(|s| s.sent_logs_errors += 1);
                warn!("dropped {} bytes of log output: {}", bytes.len(), e);
            }
        }
    }

    fn take_stale(&self) -> Option<Vec<u8>> {
        let mut buffer = lock(&self.buffer);
        if buffer.last_flush.elapsed() >= self.period {
            buffer.take()
        } else {
            None
        }
    }

    /// Ship buffers until shutdown, then ship whatever is left.
    pub fn run(self, mut shutdown: Shutdown) {
        loop {
            match self.recv.recv_timeout(Duration::from_secs(1)) {
                Ok(bytes) => self.ship(&bytes),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if let Some(bytes) = self.take_stale() {
                self.ship(&bytes);
            }
            if shutdown.is_requested() {
                break;
            }
        }
        self.close();
    }

    /// Ship everything pending, queued and buffered.
    pub fn close(&self) {
        while let Ok(bytes) = self.recv.try_recv() {
            self.ship(&bytes);
        }
        let rest = lock(&self.buffer).take();
        if let Some(bytes) = rest {
            self.ship(&bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test::{api, Recorder};
    use super::*;
    use crate::thread;

    fn shipped(recorder: &Recorder) -> Vec<u8> {
        recorder
            .requests()
            .into_iter()
            .flat_map(|r| r.body.into_iter())
            .collect()
    }

    #[test]
    fn ships_on_size_trigger() {
        let recorder = Recorder::new(200);
        let stats = Stats::new();
        let (mut sink, shipper) = LogSink::with_limits(
            Arc::new(api(&recorder)),
            stats.clone(),
            16,
            Duration::from_secs(3600),
        );
        sink.write_all(b"short\n").unwrap();
        assert!(shipper.recv.try_recv().is_err());
        sink.write_all(b"long enough line\n").unwrap();
        let bytes = shipper.recv.try_recv().unwrap();
        assert_eq!(&b"short\nlong enough line\n"[..], &bytes[..]);
        shipper.ship(&bytes);
        assert_eq!(23, stats.snapshot().sent_logs_bytes);
        assert_eq!(bytes, shipped(&recorder));
    }

    #[test]
    fn close_flushes_everything_in_order() {
        let recorder = Recorder::new(200);
        let stats = Stats::new();
        let (mut sink, shipper) = LogSink::with_limits(
            Arc::new(api(&recorder)),
            stats.clone(),
            8,
            Duration::from_secs(3600),
        );
        let handle = thread::spawn("log-shipper", move |shutdown| shipper.run(shutdown)).unwrap();
        let mut expected = Vec::new();
        for i in 0..50 {
            let line = format!("line {}\n", i);
            expected.extend_from_slice(line.as_bytes());
            sink.write_all(line.as_bytes()).unwrap();
        }
        sink.write_all(b"tail").unwrap();
        expected.extend_from_slice(b"tail");
        handle.shutdown().unwrap();
        assert_eq!(expected, shipped(&recorder));
        assert_eq!(expected.len() as u64, stats.snapshot().sent_logs_bytes);
    }

    #[test]
    fn write_ships_an_old_buffer() {
        let recorder = Recorder::new(200);
        let (mut sink, shipper) = LogSink::with_limits(
            Arc::new(api(&recorder)),
            Stats::new(),
            usize::max_value(),
            Duration::from_millis(50),
        );
        sink.write_all(b"first\n").unwrap();
        assert!(shipper.recv.try_recv().is_err());
        ::std::thread::sleep(Duration::from_millis(80));
        sink.write_all(b"second\n").unwrap();
        let bytes = shipper.recv.try_recv().unwrap();
        assert_eq!(&b"first\nsecond\n"[..], &bytes[..]);
    }

    #[test]
    fn shipper_ships_an_idle_old_buffer() {
        let recorder = Recorder::new(200);
        let stats = Stats::new();
        let (mut sink, shipper) = LogSink::with_limits(
            Arc::new(api(&recorder)),
            stats.clone(),
            usize::max_value(),
            Duration::from_millis(50),
        );
        sink.write_all(b"quiet\n").unwrap();
        let handle = thread::spawn("log-shipper", move |shutdown| shipper.run(shutdown)).unwrap();
        ::std::thread::sleep(Duration::from_millis(1500));
        assert_eq!(b"quiet\n".to_vec(), shipped(&recorder));
        assert_eq!(6, stats.snapshot().sent_logs_bytes);
        handle.shutdown().unwrap();
        assert_eq!(b"quiet\n".to_vec(), shipped(&recorder));
    }

    #[test]
    fn failed_shipments_are_counted() {
        let recorder = Recorder::new(503);
        let stats = Stats::new();
        let (mut sink, shipper) =
            LogSink::with_limits(Arc::new(api(&recorder)), stats.clone(), 1, Duration::from_secs(60));
        sink.write_all(b"x\n").unwrap();
        shipper.close();
        assert_eq!(1, stats.snapshot().sent_logs_errors);
        assert_eq!(0, stats.snapshot().sent_logs_bytes);
    }
}
