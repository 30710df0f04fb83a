//! Provides the CLI option parser
//!
//! Used to parse the argv/config file into a struct that
//! the agent can consume and use as configuration data.
//!
//! Flags carry everything about the agent itself: credentials, endpoints,
//! cadence, logging. The TOML file only lists the collectors to run:
//!
//! ```toml
//! [collectors.load]
//! interval = "15s"
//! tags = ["role:router"]
//!
//! [collectors.leases.options]
//! path = "/tmp/dnsmasq.leases"
//! ```

use crate::collector::Options;
use crate::constants;
use crate::error::Error;
use crate::metric::parse_all;
use clap::{App, Arg, ArgMatches};
use log::LevelFilter;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use toml;

const VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");

/// Where log output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Standard output.
    Stdout,
    /// The remote logs endpoint.
    Remote,
}

impl FromStr for LogOutput {
    type Err = Error;

    fn from_str(s: &str) -> Result<LogOutput, Error> {
        match s {
            "stdout" => Ok(LogOutput::Stdout),
            "remote" => Ok(LogOutput::Remote),
            other => Err(Error::ConfigInvalid(format!("unknown log output {:?}", other))),
        }
    }
}

/// The timezone log timestamps are rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timezone {
    /// UTC.
    Utc,
    /// The host's local zone.
    Local,
}

impl FromStr for Timezone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Timezone, Error> {
        match s {
            "utc" | "UTC" => Ok(Timezone::Utc),
            "local" => Ok(Timezone::Local),
            other => Err(Error::ConfigInvalid(format!("unknown timezone {:?}", other))),
        }
    }
}

/// One `[collectors.<name>]` table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectorSettings {
    /// Collect interval, if the default is not wanted.
    pub interval: Option<Duration>,
    /// Tags added to everything the collector emits.
    pub tags: Vec<String>,
    /// User options, merged over the collector's defaults later.
    pub options: Options,
}

/// Big configuration struct for the pigeon executable
///
/// This struct is what we construct from parsing the command line and the
/// collector file. Please see documentation on `parse_args` in this module for
/// more details.
#[derive(Debug)]
pub struct Args {
    /// Key for the series and logs endpoints.
    pub api_key: String,
    /// Key for the host tags endpoint. Host tags are not updated without it.
    pub app_key: Option<String>,
    /// Uplink send cadence.
    pub send_interval: Duration,
    /// `key:value` tags set on the host through the remote API.
    pub host_tags: Vec<String>,
    /// The host label of every series.
    pub hostname: String,
    /// Path of the collector file.
    pub config_path: PathBuf,
    /// Maximum log level.
    pub log_level: LevelFilter,
    /// Log destinations.
    pub log_outputs: Vec<LogOutput>,
    /// Log timestamp zone.
    pub timezone: Timezone,
    /// Where to write our PID, if anywhere.
    pub pid_file: Option<PathBuf>,
    /// Base URL of the series API.
    pub endpoint: String,
    /// Base URL of the logs API, if not `endpoint`.
    pub logs_endpoint: Option<String>,
    /// Skip TLS certificate verification.
    pub insecure: bool,
    /// Pigeon version string. This is set automatically.
    pub version: String,
    /// Configured collectors by name.
    pub collectors: BTreeMap<String, CollectorSettings>,
}

fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("pigeon")
        .version(VERSION.unwrap_or("unknown"))
        .about("metrics collection for routers and other small, always-on hosts")
        .arg(
            Arg::with_name("api-key")
                .long("api-key")
                .env("DATADOG_API_KEY")
                .hide_env_values(true)
                .takes_value(true)
                .help("Key for the series and logs endpoints."),
        )
        .arg(
            Arg::with_name("app-key")
                .long("app-key")
                .env("DATADOG_APP_KEY")
                .hide_env_values(true)
                .takes_value(true)
                .help("Application key, needed to update host tags."),
        )
        .arg(
            Arg::with_name("send-interval")
                .long("send-interval")
                .takes_value(true)
                .default_value("35s")
                .help("How often series are sent."),
        )
        .arg(
            Arg::with_name("host-tag")
                .long("host-tag")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .help("A key:value tag for this host. Repeatable."),
        )
        .arg(
            Arg::with_name("hostname")
                .long("hostname")
                .takes_value(true)
                .help("Host label of every series. Defaults to the kernel hostname."),
        )
        .arg(
            Arg::with_name("config-file")
                .long("config")
                .short("C")
                .value_name("config")
                .required(true)
                .takes_value(true)
                .help("The collector file to feed in."),
        )
        .arg(
            Arg::with_name("log-level")
                .long("log-level")
                .takes_value(true)
                .default_value("info")
                .possible_values(&["error", "warn", "info", "debug", "trace"]),
        )
        .arg(
            Arg::with_name("log-output")
                .long("log-output")
                .takes_value(true)
                .default_value("stdout")
                .help("Comma separated list of stdout and remote."),
        )
        .arg(
            Arg::with_name("timezone")
                .long("timezone")
                .takes_value(true)
                .default_value("utc")
                .possible_values(&["utc", "local"]),
        )
        .arg(
            Arg::with_name("pid-file")
                .long("pid-file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("endpoint")
                .long("endpoint")
                .takes_value(true)
                .default_value(constants::DEFAULT_ENDPOINT),
        )
        .arg(
            Arg::with_name("logs-endpoint")
                .long("logs-endpoint")
                .takes_value(true)
                .help("Base URL for logs. Defaults to --endpoint."),
        )
        .arg(
            Arg::with_name("insecure")
                .long("insecure")
                .help("Do not verify TLS certificates."),
        )
}

/// Parse the pigeon configuration arguments
///
/// This function will read the environment arguments and construct an
/// `Args`, reading the collector file named by `--config`. Exits the process
/// on `--help`, `--version` and malformed flags, as clap does.
pub fn parse_args() -> Result<Args, Error> {
    from_matches(&app().get_matches())
}

/// `parse_args` over an explicit argv, reporting every failure as an error.
pub fn parse_args_from<I, T>(argv: I) -> Result<Args, Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = app()
        .get_matches_from_safe(argv)
        .map_err(|e| Error::ConfigInvalid(e.message))?;
    from_matches(&matches)
}

fn duration(flag: &str, raw: &str) -> Result<Duration, Error> {
    humantime::parse_duration(raw)
        .map_err(|e| Error::ConfigInvalid(format!("--{}: {:?}: {}", flag, raw, e)))
}

fn from_matches(matches: &ArgMatches) -> Result<Args, Error> {
    let api_key = match matches.value_of("api-key") {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => {
            return Err(Error::ConfigInvalid(
                "an api key is required, use --api-key or DATADOG_API_KEY".to_string(),
            ))
        }
    };
    let app_key = matches
        .value_of("app-key")
        .filter(|k| !k.is_empty())
        .map(String::from);

    let send_interval = duration("send-interval", matches.value_of("send-interval").unwrap_or("35s"))?;
    if send_interval < constants::MIN_SEND_INTERVAL {
        return Err(Error::ConfigInvalid(format!(
            "--send-interval must be at least {:?}",
            constants::MIN_SEND_INTERVAL
        )));
    }

    let host_tags: Vec<String> = matches
        .values_of("host-tag")
        .map(|v| v.map(String::from).collect())
        .unwrap_or_default();
    parse_all(&host_tags)?;

    let hostname = match matches.value_of("hostname") {
        Some(name) => name.to_string(),
        None => kernel_hostname()?,
    };

    let log_level = matches
        .value_of("log-level")
        .unwrap_or("info")
        .parse::<LevelFilter>()
        .map_err(|e| Error::ConfigInvalid(format!("--log-level: {}", e)))?;
    let log_outputs = matches
        .value_of("log-output")
        .unwrap_or("stdout")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<LogOutput>)
        .collect::<Result<Vec<LogOutput>, Error>>()?;
    let timezone = matches.value_of("timezone").unwrap_or("utc").parse()?;

    let config_path = PathBuf::from(matches.value_of("config-file").unwrap_or_default());
    let buffer = fs::read_to_string(&config_path)
        .map_err(|e| Error::ConfigInvalid(format!("{}: {}", config_path.display(), e)))?;
    let collectors = parse_config_file(&buffer)?;

    Ok(Args {
        api_key: api_key,
        app_key: app_key,
        send_interval: send_interval,
        host_tags: host_tags,
        hostname: hostname,
        config_path: config_path,
        log_level: log_level,
        log_outputs: log_outputs,
        timezone: timezone,
        pid_file: matches.value_of("pid-file").map(PathBuf::from),
        endpoint: matches
            .value_of("endpoint")
            .unwrap_or(constants::DEFAULT_ENDPOINT)
            .to_string(),
        logs_endpoint: matches.value_of("logs-endpoint").map(String::from),
        insecure: matches.is_present("insecure"),
        version: VERSION.unwrap_or("unknown").to_string(),
        collectors: collectors,
    })
}

/// The kernel's idea of this host's name.
pub fn kernel_hostname() -> Result<String, Error> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return Err(Error::Io(::std::io::Error::last_os_error()));
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..len]).into_owned();
    if name.is_empty() {
        return Err(Error::ConfigInvalid(
            "kernel hostname is empty, use --hostname".to_string(),
        ));
    }
    Ok(name)
}

fn invalid<S: Into<String>>(msg: S) -> Error {
    Error::ConfigInvalid(msg.into())
}

fn option_value(collector: &str, key: &str, value: &toml::Value) -> Result<String, Error> {
    match *value {
        toml::Value::String(ref s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        _ => Err(invalid(format!(
            "collectors.{}.options.{} must be a string, number or boolean",
            collector, key
        ))),
    }
}

/// Parse the collector file.
///
/// Collectors absent from the file are not run. Tags are validated here;
/// options are only checked against each collector's defaults when the
/// collector is built.
pub fn parse_config_file(buffer: &str) -> Result<BTreeMap<String, CollectorSettings>, Error> {
    let value: toml::Value =
        toml::from_str(buffer).map_err(|e| invalid(format!("could not parse config file: {}", e)))?;
    let root = value
        .as_table()
        .ok_or_else(|| invalid("config file must be a table"))?;
    for key in root.keys() {
        if key != "collectors" {
            return Err(invalid(format!("unknown top-level key {:?}", key)));
        }
    }

    let mut collectors = BTreeMap::new();
    let tables = match root.get("collectors") {
        Some(tbl) => tbl
            .as_table()
            .ok_or_else(|| invalid("collectors must be a table"))?,
        None => return Ok(collectors),
    };
    for (name, tbl) in tables {
        let tbl = tbl
            .as_table()
            .ok_or_else(|| invalid(format!("collectors.{} must be a table", name)))?;
        let mut settings = CollectorSettings::default();
        for (key, value) in tbl {
            match key.as_str() {
                "interval" => {
                    let raw = value.as_str().ok_or_else(|| {
                        invalid(format!("collectors.{}.interval must be a string", name))
                    })?;
                    let interval = humantime::parse_duration(raw).map_err(|e| {
                        invalid(format!("collectors.{}.interval: {:?}: {}", name, raw, e))
                    })?;
                    if interval == Duration::from_secs(0) {
                        return Err(invalid(format!("collectors.{}.interval is zero", name)));
                    }
                    settings.interval = Some(interval);
                }
                "tags" => {
                    let tags = value
                        .as_array()
                        .ok_or_else(|| invalid(format!("collectors.{}.tags must be an array", name)))?;
                    for tag in tags {
                        let tag = tag.as_str().ok_or_else(|| {
                            invalid(format!("collectors.{}.tags must hold strings", name))
                        })?;
                        settings.tags.push(tag.to_string());
                    }
                    parse_all(&settings.tags)
                        .map_err(|e| invalid(format!("collectors.{}.tags: {}", name, e)))?;
                }
                "options" => {
                    let options = value.as_table().ok_or_else(|| {
                        invalid(format!("collectors.{}.options must be a table", name))
                    })?;
                    for (k, v) in options {
                        settings.options.insert(k.clone(), option_value(name, k, v)?);
                    }
                }
                other => {
                    return Err(invalid(format!("collectors.{} has unknown key {:?}", name, other)))
                }
            }
        }
        collectors.insert(name.clone(), settings);
    }
    Ok(collectors)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use tempdir::TempDir;

    #[test]
    fn config_file_collectors() {
        let config = r#"
[collectors.load]
interval = "15s"
tags = ["role:router"]

[collectors.memory]

[collectors.leases.options]
path = "/tmp/dnsmasq.leases"

[collectors.dnsmasq.options]
flush_interval = 30
"#;
        let collectors = parse_config_file(config).unwrap();
        assert_eq!(4, collectors.len());
        let load = &collectors["load"];
        assert_eq!(Some(Duration::from_secs(15)), load.interval);
        assert_eq!(vec!["role:router"], load.tags);
        assert_eq!(CollectorSettings::default(), collectors["memory"]);
        assert_eq!("/tmp/dnsmasq.leases", collectors["leases"].options["path"]);
        assert_eq!("30", collectors["dnsmasq"].options["flush_interval"]);
    }

    #[test]
    fn config_file_rejects_garbage() {
        assert!(parse_config_file("[collectors.load]\ninterval = \"soon\"\n").is_err());
        assert!(parse_config_file("[collectors.load]\ninterval = \"0s\"\n").is_err());
        assert!(parse_config_file("[collectors.load]\ntags = [\"role\"]\n").is_err());
        assert!(parse_config_file("[collectors.load]\nperiod = \"1s\"\n").is_err());
        assert!(parse_config_file("[sinks.console]\n").is_err());
        assert!(parse_config_file("not toml at all = = =").is_err());
        assert!(parse_config_file("").unwrap().is_empty());
    }

    #[test]
    fn args_from_argv() {
        let dir = TempDir::new("pigeon-config").unwrap();
        let path = dir.path().join("pigeon.toml");
        fs::File::create(&path)
            .unwrap()
            .write_all(b"[collectors.load]\n")
            .unwrap();
        let path = path.display().to_string();
        let args = parse_args_from(vec![
            "pigeon",
            "--api-key",
            "k3y",
            "--config",
            path.as_str(),
            "--hostname",
            "gw",
            "--host-tag",
            "site:home",
            "--host-tag",
            "role:router",
            "--log-output",
            "stdout,remote",
            "--send-interval",
            "1m",
        ]).unwrap();
        assert_eq!("k3y", args.api_key);
        assert_eq!("gw", args.hostname);
        assert_eq!(vec!["site:home", "role:router"], args.host_tags);
        assert_eq!(Duration::from_secs(60), args.send_interval);
        assert_eq!(vec![LogOutput::Stdout, LogOutput::Remote], args.log_outputs);
        assert_eq!(LevelFilter::Info, args.log_level);
        assert_eq!(Timezone::Utc, args.timezone);
        assert_eq!(constants::DEFAULT_ENDPOINT, args.endpoint);
        assert!(!args.insecure);
        assert!(args.collectors.contains_key("load"));

        let short = parse_args_from(vec![
            "pigeon",
            "--api-key",
            "k3y",
            "--config",
            path.as_str(),
            "--send-interval",
            "5s",
        ]);
        assert!(short.is_err());
        let bad_tag = parse_args_from(vec![
            "pigeon",
            "--api-key",
            "k3y",
            "--config",
            path.as_str(),
            "--host-tag",
            "untagged",
        ]);
        assert!(bad_tag.is_err());
    }
}
