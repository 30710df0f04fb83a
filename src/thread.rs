//! Mio enabled threading library.
//!
//! Every long-lived pigeon thread is handed a `Shutdown` when it is spawned.
//! The spawner keeps the matching `ThreadHandle` and flips a mio readiness on
//! the SYSTEM token when it wants the thread gone. Threads wait on their
//! `Shutdown` instead of sleeping, so a shutdown request interrupts any wait.

use crate::constants;
use crate::error::Error;
use mio;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

/// The receiving side of a shutdown request.
pub struct Shutdown {
    poll: mio::Poll,
    events: mio::Events,
    _registration: mio::Registration,
    requested: bool,
}

/// The sending side of a shutdown request. Cheap to clone.
#[derive(Clone)]
pub struct Trigger {
    readiness: mio::SetReadiness,
}

impl Trigger {
    /// Ask the paired `Shutdown` to report a shutdown.
    pub fn fire(&self) -> io::Result<()> {
        self.readiness.set_readiness(mio::Ready::readable())
    }
}

impl Shutdown {
    /// Create a `Shutdown` and the `Trigger` that fires it.
    pub fn pair() -> io::Result<(Shutdown, Trigger)> {
        let poll = mio::Poll::new()?;
        let (registration, readiness) = mio::Registration::new2();
        poll.register(
            &registration,
            constants::SYSTEM,
            mio::Ready::readable(),
            mio::PollOpt::edge(),
        )?;
        Ok((
            Shutdown {
                poll: poll,
                events: mio::Events::with_capacity(16),
                _registration: registration,
                requested: false,
            },
            Trigger {
                readiness: readiness,
            },
        ))
    }

    /// Block for at most `timeout`, returning early if shutdown is requested.
    ///
    /// Returns true if shutdown has been requested. Once true, every later
    /// call returns true immediately.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        if self.requested {
            return true;
        }
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.poll.poll(&mut self.events, Some(remaining)) {
                Ok(_) => {
                    if self.events
                        .iter()
                        .any(|event| event.token() == constants::SYSTEM)
                    {
                        self.requested = true;
                        return true;
                    }
                    if Instant::now() >= deadline {
                        return false;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Failed during poll {:?}", e);
                    thread::sleep(remaining);
                    return false;
                }
            }
        }
    }

    /// Check for a shutdown request without blocking.
    pub fn is_requested(&mut self) -> bool {
        self.wait(Duration::from_millis(0))
    }

    /// Like `wait` but reports a shutdown as `Error::Cancelled`, for use with
    /// `?` inside collection loops.
    pub fn sleep(&mut self, timeout: Duration) -> Result<(), Error> {
        if self.wait(timeout) {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Mio enabled thread state.
pub struct ThreadHandle<T> {
    /// JoinHandle for the executing thread.
    handle: thread::JoinHandle<T>,

    /// Readiness signal used to notify the given thread when it should shut
    /// down.
    trigger: Trigger,
}

impl<T> ThreadHandle<T> {
    /// The thread's name, as given to `spawn`.
    pub fn name(&self) -> &str {
        self.handle.thread().name().unwrap_or("unnamed")
    }

    /// A trigger that shuts this thread down when fired.
    pub fn trigger(&self) -> Trigger {
        self.trigger.clone()
    }

    /// Signal shutdown without waiting for the thread to exit.
    pub fn signal(&self) {
        if let Err(e) = self.trigger.fire() {
            error!("Failed to notify {} of shutdown: {}", self.name(), e);
        }
    }

    /// Join the given Thread, blocking until it exits.
    pub fn join(self) -> thread::Result<T> {
        self.handle.join()
    }

    /// Gracefully shutdown the given Thread, blocking until it exits.
    ///
    /// Note - It is the responsability of the developer to ensure
    /// that thread logic waits on its `Shutdown`.
    pub fn shutdown(self) -> thread::Result<T> {
        self.signal();
        self.join()
    }
}

/// Spawns a new named thread executing the provided closure.
pub fn spawn<F, T, S>(name: S, f: F) -> Result<ThreadHandle<T>, Error>
where
    F: FnOnce(Shutdown) -> T + Send + 'static,
    T: Send + 'static,
    S: Into<String>,
{
    let (shutdown, trigger) = Shutdown::pair()?;
    let handle = thread::Builder::new()
        .name(name.into())
        .spawn(move || f(shutdown))?;
    Ok(ThreadHandle {
        handle: handle,
        trigger: trigger,
    })
}
