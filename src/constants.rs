//! Library level constants
use mio;
use std::time::Duration;

/// MIO token used to distinguish system events
/// from other event sources.
///
/// Note - It is assumed that threads will not register more than 2048
/// addressable event sources, 0 indexed.
pub const SYSTEM: mio::Token = mio::Token(2048);

/// The smallest send cadence the uplink accepts.
pub const MIN_SEND_INTERVAL: Duration = Duration::from_secs(10);

/// The send cadence used when none is configured.
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(35);

/// The span of continuous send failure after which the uplink discards its
/// backlog. The drop threshold is this window divided by the send interval,
/// rounded up.
pub const DROP_WINDOW: Duration = Duration::from_secs(300);

/// Capacity of the channel between collectors and the uplink. Producers block
/// once it is full.
pub const CHANNEL_CAPACITY: usize = 2048;

/// Upper bound on the final uplink flush performed during shutdown.
pub const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default maximum age of per-identity state held in `Measures`. Also the
/// minimum cadence between two effective purges.
pub const COUNT_MAX_AGE_SAMPLE: Duration = Duration::from_secs(48 * 60 * 60);

/// Size, in bytes, past which the log sink hands its buffer to the shipper.
pub const BUFFER_SYNC_TRIGGER: usize = 1_150_000;

/// Maximum time buffered log output waits before being shipped.
pub const LOG_FLUSH_PERIOD: Duration = Duration::from_secs(60);

/// Default base URL of the remote ingest API.
pub const DEFAULT_ENDPOINT: &str = "https://api.datadoghq.com";
