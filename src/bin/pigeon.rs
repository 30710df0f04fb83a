#![allow(unknown_lints)]

#[macro_use]
extern crate log;

use chan_signal::Signal;
use chrono::{Local, Utc};
use pigeon::client::{Api, Http, LogShipper, LogSink, Stats, Transport};
use pigeon::collector::Catalog;
use pigeon::config::{self, Args, LogOutput, Timezone};
use pigeon::error::Error;
use pigeon::supervisor::{Control, Settings, Supervisor};
use pigeon::thread::{self, ThreadHandle};
use std::fs;
use std::io::{self, Write};
use std::process;
use std::sync::Arc;

fn setup_logging(args: &Args, remote: Option<LogSink>) -> Result<(), Error> {
    let timezone = args.timezone;
    let mut dispatch = fern::Dispatch::new()
        .format(move |out, message, record| {
            let now = match timezone {
                Timezone::Utc => Utc::now().to_rfc3339(),
                Timezone::Local => Local::now().to_rfc3339(),
            };
            out.finish(format_args!(
                "[{}][{}][{}][{}] {}",
                record.module_path().unwrap_or("pigeon"),
                record.line().unwrap_or(0),
                now,
                record.level(),
                message
            ))
        })
        .level(args.log_level)
        .level_for("reqwest", log::LevelFilter::Warn)
        .level_for("hyper", log::LevelFilter::Warn);
    if args.log_outputs.contains(&LogOutput::Stdout) {
        dispatch = dispatch.chain(io::stdout());
    }
    if let Some(sink) = remote {
        dispatch = dispatch.chain(Box::new(sink) as Box<dyn Write + Send>);
    }
    dispatch
        .apply()
        .map_err(|e| Error::ConfigInvalid(format!("logger: {}", e)))
}

fn write_pid(args: &Args) -> Result<(), Error> {
    if let Some(ref path) = args.pid_file {
        fs::write(path, format!("{}\n", process::id()))?;
    }
    Ok(())
}

fn run<F>(args: Args, mut next_signal: F) -> Result<(), Error>
where
    F: FnMut() -> Option<Signal> + Send + 'static,
{
    let transport: Arc<dyn Transport> = Arc::new(Http::new(args.insecure)?);
    let api = Arc::new(Api::new(
        transport,
        args.endpoint.as_str(),
        args.logs_endpoint.clone(),
        args.api_key.as_str(),
        args.app_key.clone(),
    ));
    let stats = Stats::new();

    let (remote, shipper) = if args.log_outputs.contains(&LogOutput::Remote) {
        let (sink, shipper) = LogSink::new(Arc::clone(&api), stats.clone());
        (Some(sink), Some(shipper))
    } else {
        (None, None)
    };
    setup_logging(&args, remote)?;
    info!("pigeon - {}", args.version);
    let shipper: Option<ThreadHandle<()>> = match shipper {
        Some(shipper) => Some(thread::spawn("log-shipper", move |shutdown| {
            LogShipper::run(shipper, shutdown)
        })?),
        None => None,
    };

    write_pid(&args)?;
    let supervisor = Supervisor::new(
        Catalog::builtin(),
        Settings::from(&args),
        api,
        stats,
    );
    let result = match supervisor.start() {
        Ok(running) => {
            let control = running.controller();
            std::thread::Builder::new()
                .name("signals".to_string())
                .spawn(move || {
                    while let Some(sig) = next_signal() {
                        let request = match sig {
                            Signal::INT | Signal::TERM => Control::Shutdown,
                            Signal::USR1 => Control::PrintTagger,
                            Signal::USR2 => Control::Dump,
                            Signal::HUP => {
                                info!("SIGHUP received, configuration is only read at start");
                                continue;
                            }
                            other => {
                                debug!("ignoring {:?}", other);
                                continue;
                            }
                        };
                        if control.send(request).is_err() {
                            return;
                        }
                    }
                })?;
            running.wait()
        }
        Err(e) => Err(e),
    };

    if let Err(ref e) = result {
        error!("pigeon stopped: {}", e);
    } else {
        info!("pigeon stopped");
    }
    if let Some(shipper) = shipper {
        if shipper.shutdown().is_err() {
            eprintln!("log shipper panicked");
        }
    }
    result
}

fn main() {
    openssl_probe::init_ssl_cert_env_vars();
    // before any thread is spawned so every thread inherits the mask
    let signal = chan_signal::notify(&[
        Signal::INT,
        Signal::TERM,
        Signal::USR1,
        Signal::USR2,
        Signal::HUP,
    ]);
    let args = match config::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("pigeon: {}", e);
            process::exit(1);
        }
    };
    match run(args, move || signal.recv()) {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("pigeon: {}", e);
            process::exit(1);
        }
    }
}
