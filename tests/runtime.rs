mod integration {
    mod runtime {

        use pigeon::client::{Api, Request, Stats, Transport};
        use pigeon::collector::{options, Catalog, Collector, Config, Options, Probe};
        use pigeon::config::parse_config_file;
        use pigeon::error::Error;
        use pigeon::supervisor::{Control, Settings, Supervisor};
        use pigeon::thread::Shutdown;
        use std::fs;
        use std::sync::{Arc, Mutex};
        use std::thread;
        use std::time::Duration;
        use tempdir::TempDir;

        struct Memory {
            status: Mutex<u16>,
            bodies: Mutex<Vec<(String, String)>>,
        }

        impl Memory {
            fn new(status: u16) -> Arc<Memory> {
                Arc::new(Memory {
                    status: Mutex::new(status),
                    bodies: Mutex::new(Vec::new()),
                })
            }

            fn series(&self) -> Vec<serde_json::Value> {
                self.bodies
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|&&(ref url, _)| url.contains("/api/v1/series"))
                    .flat_map(|&(_, ref body)| {
                        let payload: serde_json::Value = serde_json::from_str(body).unwrap();
                        payload["series"].as_array().unwrap().clone()
                    })
                    .collect()
            }
        }

        impl Transport for Memory {
            fn send(&self, request: Request) -> Result<u16, Error> {
                self.bodies.lock().unwrap().push((
                    request.url.clone(),
                    String::from_utf8_lossy(&request.body).into_owned(),
                ));
                Ok(*self.status.lock().unwrap())
            }
        }

        fn api(transport: &Arc<Memory>) -> Arc<Api> {
            Arc::new(Api::new(
                Arc::clone(transport) as Arc<dyn Transport>,
                "http://localhost:8125",
                None,
                "k3y",
                None,
            ))
        }

        struct Stuck {
            config: Config,
        }

        impl Collector for Stuck {
            fn name(&self) -> &'static str {
                Stuck::NAME
            }

            fn is_daemon(&self) -> bool {
                true
            }

            fn config(&self) -> &Config {
                &self.config
            }

            fn collect(&mut self, shutdown: &mut Shutdown) -> Result<(), Error> {
                shutdown.sleep(Duration::from_millis(200))?;
                Err(Error::Parse("garbage in the pipe".to_string()))
            }
        }

        impl Probe for Stuck {
            const NAME: &'static str = "stuck";

            fn default_options() -> Options {
                options::defaults(&[])
            }

            fn default_collect_interval() -> Duration {
                Duration::from_secs(60)
            }

            fn new(config: Config) -> Result<Stuck, Error> {
                Ok(Stuck { config: config })
            }
        }

        fn settings(collector_file: &str) -> Settings {
            Settings {
                hostname: "gw".to_string(),
                host_tags: vec!["site:home".to_string()],
                send_interval: Duration::from_secs(10),
                collectors: parse_config_file(collector_file).unwrap(),
            }
        }

        #[test]
        fn load_is_shipped_on_shutdown() {
            let dir = TempDir::new("pigeon-runtime").unwrap();
            let loadavg = dir.path().join("loadavg");
            fs::write(&loadavg, "0.42 0.30 0.25 2/180 4711\n").unwrap();
            let file = format!(
                "[collectors.load]\ninterval = \"1s\"\ntags = [\"role:router\"]\n\
                 [collectors.load.options]\npath = {:?}\n",
                loadavg.display().to_string()
            );

            let transport = Memory::new(202);
            let supervisor = Supervisor::new(
                Catalog::builtin(),
                settings(&file),
                api(&transport),
                Stats::new(),
            );
            let running = supervisor.start().unwrap();
            thread::sleep(Duration::from_millis(2300));
            running.controller().send(Control::Shutdown).unwrap();
            running.wait().unwrap();

            let series = transport.series();
            let load = series
                .iter()
                .find(|s| s["metric"] == "system.load.1")
                .expect("no system.load.1");
            assert_eq!("gauge", load["type"]);
            assert_eq!("gw", load["host"]);
            assert_eq!(0.42, load["points"][0][1].as_f64().unwrap());
            assert!(load["tags"]
                .as_array()
                .unwrap()
                .iter()
                .any(|t| t == "role:router"));

            let names: Vec<&str> = series
                .iter()
                .filter_map(|s| s["metric"].as_str())
                .collect();
            assert!(names.contains(&"client.up"));
            assert!(names.contains(&"client.shutdown"));
            assert!(names.contains(&"collector.runs"));
            assert!(names.contains(&"collector.duration"));
        }

        #[test]
        fn daemon_failure_ends_the_agent() {
            let transport = Memory::new(202);
            let mut catalog = Catalog::builtin();
            catalog.register::<Stuck>();
            let supervisor = Supervisor::new(
                catalog,
                settings("[collectors.stuck]\n[collectors.internal]\ninterval = \"1s\"\n"),
                api(&transport),
                Stats::new(),
            );
            let running = supervisor.start().unwrap();
            match running.wait() {
                Err(Error::Parse(msg)) => assert_eq!("garbage in the pipe", msg),
                other => panic!("unexpected result {:?}", other),
            }
            let names: Vec<String> = transport
                .series()
                .iter()
                .filter_map(|s| s["metric"].as_str().map(String::from))
                .collect();
            assert!(names.contains(&"client.shutdown".to_string()));
        }

        #[test]
        fn failing_endpoint_does_not_block_shutdown() {
            let transport = Memory::new(503);
            let stats = Stats::new();
            let supervisor = Supervisor::new(
                Catalog::builtin(),
                settings("[collectors.internal]\ninterval = \"1s\"\n"),
                api(&transport),
                stats.clone(),
            );
            let running = supervisor.start().unwrap();
            thread::sleep(Duration::from_millis(1200));
            running.controller().send(Control::Shutdown).unwrap();
            running.wait().unwrap();
            assert!(!transport.series().is_empty());
            assert_eq!(0, stats.snapshot().sent_series);
        }
    }
}
