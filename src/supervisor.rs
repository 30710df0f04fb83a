//! Builds the configured collectors, runs them and the uplink on their own
//! threads, and takes everything down in order.
//!
//! Shutdown order matters: collectors stop first so nothing is produced after
//! the uplink's final flush, `client.shutdown` is queued next so it rides in
//! that flush, and the uplink goes last.

use crate::client::{Api, Client, Flush, Handle, Stats};
use crate::collector::{options, Catalog, Collector, Config, State, Status};
use crate::config::{Args, CollectorSettings};
use crate::error::Error;
use crate::runtime;
use crate::tagger::Tagger;
use crate::thread::{self, ThreadHandle};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::time::Duration;

/// Room in the control channel beyond one failure per collector, for
/// signals.
const CONTROL_SLACK: usize = 8;

/// Requests to the supervisor.
#[derive(Debug)]
pub enum Control {
    /// Stop everything and return.
    Shutdown,
    /// Write the tagger to stdout.
    PrintTagger,
    /// Write worker states and uplink counters to stdout.
    Dump,
    /// A daemon collector failed. The supervisor shuts down.
    Failed(String, Error),
}

/// The part of the configuration the supervisor acts on.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Host label of every series.
    pub hostname: String,
    /// Tags for `client.up`, `client.shutdown` and the host tags update.
    pub host_tags: Vec<String>,
    /// Uplink send cadence.
    pub send_interval: Duration,
    /// Collectors to run.
    pub collectors: BTreeMap<String, CollectorSettings>,
}

impl<'a> From<&'a Args> for Settings {
    fn from(args: &'a Args) -> Settings {
        Settings {
            hostname: args.hostname.clone(),
            host_tags: args.host_tags.clone(),
            send_interval: args.send_interval,
            collectors: args.collectors.clone(),
        }
    }
}

/// Not yet started agent.
pub struct Supervisor {
    catalog: Catalog,
    settings: Settings,
    api: Arc<Api>,
    stats: Stats,
}

struct Worker {
    name: &'static str,
    status: Status,
    handle: ThreadHandle<()>,
}

/// A started agent.
pub struct Running {
    control: SyncSender<Control>,
    control_recv: Receiver<Control>,
    tagger: Arc<Tagger>,
    client: Handle,
    workers: Vec<Worker>,
    uplink: ThreadHandle<Flush>,
    settings: Settings,
}

fn stop_workers(workers: Vec<Worker>) {
    for worker in &workers {
        worker.handle.signal();
    }
    for worker in workers {
        let name = worker.name;
        if worker.handle.join().is_err() {
            error!("collector {} panicked", name);
        }
        debug!("collector {} is {}", name, worker.status.get());
    }
}

impl Supervisor {
    /// Prepare an agent. Nothing runs until `start`.
    pub fn new(catalog: Catalog, settings: Settings, api: Arc<Api>, stats: Stats) -> Supervisor {
        Supervisor {
            catalog: catalog,
            settings: settings,
            api: api,
            stats: stats,
        }
    }

    fn build(&self, tagger: &Arc<Tagger>, client: &Handle) -> Result<Vec<Box<dyn Collector>>, Error> {
        let mut built = Vec::with_capacity(self.settings.collectors.len());
        for (name, settings) in &self.settings.collectors {
            let entry = self.catalog.lookup(name)?;
            let merged = options::merge(name, &(entry.default_options)(), &settings.options)?;
            let config = Config {
                host: self.settings.hostname.clone(),
                tagger: Arc::clone(tagger),
                client: client.clone(),
                collect_interval: settings.interval.unwrap_or(entry.default_interval),
                options: merged,
                tags: settings.tags.clone(),
            };
            built.push((entry.build)(config)?);
        }
        Ok(built)
    }

    /// Build every configured collector, then start the uplink and one worker
    /// per collector.
    ///
    /// Configuration errors surface here, before any thread is started.
    pub fn start(self) -> Result<Running, Error> {
        let tagger = Arc::new(Tagger::new());
        let (client, handle) = Client::new(
            Arc::clone(&self.api),
            self.settings.hostname.as_str(),
            self.settings.send_interval,
            self.stats.clone(),
        )?;
        let collectors = self.build(&tagger, &handle)?;
        let (control, control_recv) = mpsc::sync_channel(collectors.len() + CONTROL_SLACK);

        let uplink = thread::spawn("uplink", move |shutdown| client.run(shutdown))?;
        let mut workers = Vec::with_capacity(collectors.len());
        for mut collector in collectors {
            let name = collector.name();
            let status = Status::new();
            let worker_status = status.clone();
            let failures = control.clone();
            let spawned = thread::spawn(format!("collector-{}", name), move |mut shutdown| {
                match runtime::run_collection(&mut *collector, &mut shutdown, &worker_status) {
                    Ok(()) => {}
                    Err(ref e) if e.is_cancelled() => {}
                    Err(e) => {
                        let _ = failures.try_send(Control::Failed(name.to_string(), e));
                    }
                }
            });
            match spawned {
                Ok(handle) => workers.push(Worker {
                    name: name,
                    status: status,
                    handle: handle,
                }),
                Err(e) => {
                    error!("could not start collector {}: {}", name, e);
                    stop_workers(workers);
                    let _ = uplink.shutdown();
                    return Err(e);
                }
            }
        }
        info!(
            "started {} collectors: {}",
            workers.len(),
            workers
                .iter()
                .map(|w| w.name)
                .collect::<Vec<_>>()
                .join(", ")
        );

        handle.metric_client_up(&self.settings.hostname, &self.settings.host_tags)?;
        if !self.settings.host_tags.is_empty() {
            let api = Arc::clone(&self.api);
            let host = self.settings.hostname.clone();
            let tags = self.settings.host_tags.clone();
            let timeout = self.settings.send_interval;
            let spawned = ::std::thread::Builder::new()
                .name("host-tags".to_string())
                .spawn(move || match api.update_host_tags(&host, &tags, timeout) {
                    Ok(()) => info!("host tags of {} set to {}", host, tags.join(", ")),
                    Err(e) => warn!("could not update host tags: {}", e),
                });
            if let Err(e) = spawned {
                warn!("could not update host tags: {}", e);
            }
        }

        Ok(Running {
            control: control,
            control_recv: control_recv,
            tagger: tagger,
            client: handle,
            workers: workers,
            uplink: uplink,
            settings: self.settings,
        })
    }
}

impl Running {
    /// A sender for control requests, for signal handlers and tests.
    pub fn controller(&self) -> SyncSender<Control> {
        self.control.clone()
    }

    /// The shared tagger.
    pub fn tagger(&self) -> Arc<Tagger> {
        Arc::clone(&self.tagger)
    }

    /// Name and state of every collector.
    pub fn states(&self) -> Vec<(&'static str, State)> {
        self.workers
            .iter()
            .map(|w| (w.name, w.status.get()))
            .collect()
    }

    fn dump(&self, out: &mut dyn Write) -> io::Result<()> {
        for (name, state) in self.states() {
            writeln!(out, "collector {}: {}", name, state)?;
        }
        writeln!(out, "uplink: {:?}", self.client.stats().snapshot())
    }

    /// Serve control requests until shutdown or a daemon failure, then stop
    /// everything. Returns the failure, if there was one.
    pub fn wait(self) -> Result<(), Error> {
        let mut failure = None;
        loop {
            match self.control_recv.recv() {
                Ok(Control::Shutdown) | Err(_) => break,
                Ok(Control::PrintTagger) => {
                    let stdout = io::stdout();
                    if let Err(e) = self.tagger.print(&mut stdout.lock()) {
                        warn!("could not print tagger: {}", e);
                    }
                }
                Ok(Control::Dump) => {
                    let stdout = io::stdout();
                    if let Err(e) = self.dump(&mut stdout.lock()) {
                        warn!("could not dump state: {}", e);
                    }
                }
                Ok(Control::Failed(name, e)) => {
                    error!("collector {} failed, shutting down: {}", name, e);
                    failure = Some(e);
                    break;
                }
            }
        }
        self.stop();
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn stop(self) {
        info!("shutting down {} collectors", self.workers.len());
        stop_workers(self.workers);
        if let Err(e) = self
            .client
            .metric_client_shutdown(&self.settings.hostname, &self.settings.host_tags)
        {
            warn!("could not queue client.shutdown: {}", e);
        }
        match self.uplink.shutdown() {
            Ok(flush) => info!("uplink stopped: {:?}", flush),
            Err(_) => error!("uplink panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test::{api, Recorder};
    use crate::collector::{Options, Probe};
    use crate::metric::Sample;
    use crate::thread::Shutdown;

    struct Beacon {
        config: Config,
    }

    impl Collector for Beacon {
        fn name(&self) -> &'static str {
            Beacon::NAME
        }

        fn config(&self) -> &Config {
            &self.config
        }

        fn collect(&mut self, _shutdown: &mut Shutdown) -> Result<(), Error> {
            let sample = Sample::new("beacon", 1.0)
                .host(self.config.host.as_str())
                .tags(self.config.tags.iter().cloned());
            self.config
                .client
                .send(crate::metric::Series::gauge(sample))
        }
    }

    impl Probe for Beacon {
        const NAME: &'static str = "beacon";

        fn default_options() -> Options {
            options::defaults(&[("color", "red")])
        }

        fn default_collect_interval() -> Duration {
            Duration::from_secs(1)
        }

        fn new(config: Config) -> Result<Beacon, Error> {
            options::get(&config.options, "color")?;
            Ok(Beacon { config: config })
        }
    }

    struct Broken {
        config: Config,
    }

    impl Collector for Broken {
        fn name(&self) -> &'static str {
            Broken::NAME
        }

        fn is_daemon(&self) -> bool {
            true
        }

        fn config(&self) -> &Config {
            &self.config
        }

        fn collect(&mut self, shutdown: &mut Shutdown) -> Result<(), Error> {
            shutdown.sleep(Duration::from_millis(300))?;
            Err(Error::unavailable("/tmp/gone.log", "no such file"))
        }
    }

    impl Probe for Broken {
        const NAME: &'static str = "broken";

        fn default_options() -> Options {
            options::defaults(&[])
        }

        fn default_collect_interval() -> Duration {
            Duration::from_secs(60)
        }

        fn new(config: Config) -> Result<Broken, Error> {
            Ok(Broken { config: config })
        }
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.register::<Beacon>();
        catalog.register::<Broken>();
        catalog
    }

    fn settings(names: &[&str]) -> Settings {
        Settings {
            hostname: "gw".to_string(),
            host_tags: Vec::new(),
            send_interval: Duration::from_secs(10),
            collectors: names
                .iter()
                .map(|name| (name.to_string(), CollectorSettings::default()))
                .collect(),
        }
    }

    fn sent(recorder: &Recorder) -> String {
        recorder
            .requests()
            .iter()
            .filter(|r| r.url.contains("series"))
            .map(|r| String::from_utf8_lossy(&r.body).into_owned())
            .collect()
    }

    #[test]
    fn unknown_collector_fails_start() {
        let recorder = Recorder::new(202);
        let supervisor = Supervisor::new(
            catalog(),
            settings(&["wireless"]),
            Arc::new(api(&recorder)),
            Stats::new(),
        );
        match supervisor.start() {
            Err(Error::ConfigInvalid(_)) => {}
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("started with an unknown collector"),
        }
        assert!(recorder.requests().is_empty());
    }

    #[test]
    fn unknown_option_fails_start() {
        let recorder = Recorder::new(202);
        let mut settings = settings(&["beacon"]);
        settings
            .collectors
            .get_mut("beacon")
            .unwrap()
            .options
            .insert("colour".to_string(), "blue".to_string());
        let supervisor = Supervisor::new(catalog(), settings, Arc::new(api(&recorder)), Stats::new());
        assert!(supervisor.start().is_err());
    }

    #[test]
    fn shutdown_flushes_everything() {
        let recorder = Recorder::new(202);
        let supervisor = Supervisor::new(
            catalog(),
            settings(&["beacon"]),
            Arc::new(api(&recorder)),
            Stats::new(),
        );
        let running = supervisor.start().unwrap();
        ::std::thread::sleep(Duration::from_millis(1500));
        assert_eq!(vec![("beacon", State::Running)], running.states());
        running.controller().send(Control::Dump).unwrap();
        running.controller().send(Control::Shutdown).unwrap();
        running.wait().unwrap();

        let body = sent(&recorder);
        assert!(body.contains("\"client.up\""));
        assert!(body.contains("\"beacon\""));
        assert!(body.contains("\"collector.runs\""));
        assert!(body.contains("\"client.shutdown\""));
    }

    #[test]
    fn daemon_failure_stops_everything() {
        let recorder = Recorder::new(202);
        let supervisor = Supervisor::new(
            catalog(),
            settings(&["beacon", "broken"]),
            Arc::new(api(&recorder)),
            Stats::new(),
        );
        let running = supervisor.start().unwrap();
        match running.wait() {
            Err(Error::SourceUnavailable { ref source, .. }) => assert_eq!("/tmp/gone.log", source),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(sent(&recorder).contains("\"client.shutdown\""));
    }
}
