//! The contract every probe satisfies.
//!
//! A `Collector` reads some source of truth about the host, turns what it
//! reads into `Sample`s, pushes those through its `Measures` and possibly
//! teaches the shared `Tagger` something about an entity. How often that
//! happens is the runtime's business, not the collector's.

mod catalog;
pub mod options;

pub use self::catalog::{Catalog, Entry};
pub use self::options::Options;

use crate::client::Handle;
use crate::error::Error;
use crate::tagger::Tagger;
use crate::thread::Shutdown;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Everything a collector is built from.
#[derive(Clone)]
pub struct Config {
    /// The host label samples are reported under.
    pub host: String,
    /// The process-wide tagger.
    pub tagger: Arc<Tagger>,
    /// The uplink.
    pub client: Handle,
    /// Time between two periodic collects.
    pub collect_interval: Duration,
    /// Defaults merged with the user's options.
    pub options: Options,
    /// Tags added to everything the collector emits.
    pub tags: Vec<String>,
}

/// A probe, as seen by the runtime.
pub trait Collector: Send {
    /// The catalog name.
    fn name(&self) -> &'static str;

    /// Daemon collectors are run once and own their loop. Periodic ones are
    /// called on every tick.
    fn is_daemon(&self) -> bool {
        false
    }

    /// The configuration the collector was built from.
    fn config(&self) -> &Config;

    /// Tags added to everything the collector emits.
    fn tags(&self) -> &[String] {
        &self.config().tags
    }

    /// Read the source and emit. A daemon only returns on error or shutdown.
    fn collect(&mut self, shutdown: &mut Shutdown) -> Result<(), Error>;
}

/// A collector that can be registered in a `Catalog`.
pub trait Probe: Collector + Sized + 'static {
    /// The name the collector is configured under.
    const NAME: &'static str;

    /// Every option the probe understands, with its default.
    fn default_options() -> Options;

    /// Used when the configuration does not set an interval.
    fn default_collect_interval() -> Duration;

    /// Build the probe, parsing its options.
    fn new(config: Config) -> Result<Self, Error>;
}

/// Where a collector is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Built, not yet running.
    Unstarted,
    /// Inside the runtime.
    Running,
    /// Shutdown requested, not yet returned.
    Stopping,
    /// Returned from the runtime.
    Stopped,
}

impl State {
    fn from_usize(raw: usize) -> State {
        match raw {
            0 => State::Unstarted,
            1 => State::Running,
            2 => State::Stopping,
            _ => State::Stopped,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            State::Unstarted => "unstarted",
            State::Running => "running",
            State::Stopping => "stopping",
            State::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// A collector's `State`, shared between its worker and the supervisor.
#[derive(Debug, Clone)]
pub struct Status {
    state: Arc<AtomicUsize>,
}

impl Default for Status {
    fn default() -> Status {
        Status {
            state: Arc::new(AtomicUsize::new(State::Unstarted as usize)),
        }
    }
}

impl Status {
    /// A fresh status in `Unstarted`.
    pub fn new() -> Status {
        Status::default()
    }

    /// The current state.
    pub fn get(&self) -> State {
        State::from_usize(self.state.load(Ordering::Acquire))
    }

    /// Move to `state`. States only ever move forward.
    pub fn set(&self, state: State) {
        self.state.fetch_max(state as usize, Ordering::AcqRel);
    }
}
