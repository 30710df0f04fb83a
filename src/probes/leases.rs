use super::read_source;
use crate::collector::{options, Collector, Config, Options, Probe};
use crate::error::Error;
use crate::measures::Measures;
use crate::metric::{Sample, Tag};
use crate::thread::Shutdown;
use crate::time;
use std::path::PathBuf;
use std::time::Duration;

/// DHCP leases handed out by dnsmasq.
///
/// Every lease teaches the tagger which IP and hostname belong to a MAC, and
/// which MAC and hostname belong to an IP. Other probes use this to label
/// their per-client metrics.
pub struct Leases {
    config: Config,
    measures: Measures,
    path: PathBuf,
}

#[derive(Debug, PartialEq)]
struct Lease<'a> {
    expiry: i64,
    mac: &'a str,
    ip: &'a str,
    hostname: Option<&'a str>,
}

/// `<expiry> <mac> <ip> <hostname|*> <client id>`
fn parse(line: &str) -> Result<Lease, Error> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        return Err(Error::Parse(format!("lease: {:?}", line)));
    }
    let expiry = fields[0]
        .parse()
        .map_err(|_| Error::Parse(format!("lease expiry: {:?}", fields[0])))?;
    Ok(Lease {
        expiry: expiry,
        mac: fields[1],
        ip: fields[2],
        hostname: if fields[3] == "*" {
            None
        } else {
            Some(fields[3])
        },
    })
}

impl Leases {
    fn learn(&self, lease: &Lease) -> Result<(), Error> {
        let tagger = &self.config.tagger;
        let mut for_mac = vec![Tag::new("ip", lease.ip)?];
        let mut for_ip = vec![Tag::new("mac", lease.mac)?];
        if let Some(hostname) = lease.hostname {
            for_mac.push(Tag::new("hostname", hostname)?);
            for_ip.push(Tag::new("hostname", hostname)?);
        }
        tagger.update(lease.mac, for_mac);
        tagger.update(lease.ip, for_ip);
        Ok(())
    }
}

impl Collector for Leases {
    fn name(&self) -> &'static str {
        Leases::NAME
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn collect(&mut self, _shutdown: &mut Shutdown) -> Result<(), Error> {
        let raw = read_source(&self.path)?;
        let now = time::now();
        let mut active = 0;
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            let lease = match parse(line) {
                Ok(lease) => lease,
                Err(e) => {
                    error!("{}: {}", self.path.display(), e);
                    continue;
                }
            };
            if let Err(e) = self.learn(&lease) {
                error!("{}: {}", self.path.display(), e);
                continue;
            }
            active += 1;
            // an expiry of zero is an infinite lease
            if lease.expiry == 0 {
                continue;
            }
            let remaining = (lease.expiry - now.timestamp()).max(0);
            let tags = self
                .config
                .tagger
                .get_with_default(lease.mac, "hostname", "unknown");
            self.measures.gauge(
                Sample::new("dhcp.lease.remaining", remaining as f64)
                    .time(now)
                    .host(self.config.host.as_str())
                    .tags(self.config.tags.iter().cloned())
                    .tags(tags),
            )?;
        }
        self.measures.gauge(
            Sample::new("dhcp.leases", f64::from(active))
                .time(now)
                .host(self.config.host.as_str())
                .tags(self.config.tags.iter().cloned()),
        )?;
        Ok(())
    }
}

impl Probe for Leases {
    const NAME: &'static str = "leases";

    fn default_options() -> Options {
        options::defaults(&[("path", "/tmp/dnsmasq.leases")])
    }

    fn default_collect_interval() -> Duration {
        Duration::from_secs(60)
    }

    fn new(config: Config) -> Result<Leases, Error> {
        let path = options::path(&config.options, "path")?;
        Ok(Leases {
            measures: super::measures(&config),
            config: config,
            path: path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test;
    use super::*;
    use std::fs;
    use tempdir::TempDir;

    #[test]
    fn parses_lease_lines() {
        let lease = parse("1700000000 aa:bb:cc:dd:ee:ff 10.0.0.2 laptop 01:aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(
            Lease {
                expiry: 1_700_000_000,
                mac: "aa:bb:cc:dd:ee:ff",
                ip: "10.0.0.2",
                hostname: Some("laptop"),
            },
            lease
        );
        assert_eq!(None, parse("0 aa:bb 10.0.0.3 * *").unwrap().hostname);
        assert!(parse("soon aa:bb 10.0.0.3 *").is_err());
        assert!(parse("0 aa:bb").is_err());
    }

    #[test]
    fn teaches_the_tagger() {
        let dir = TempDir::new("pigeon-leases").unwrap();
        let path = dir.path().join("dnsmasq.leases");
        let expiry = time::now().timestamp() + 600;
        fs::write(
            &path,
            format!(
                "{} aa:bb:cc:dd:ee:01 10.0.0.2 laptop *\n\
                 0 aa:bb:cc:dd:ee:02 10.0.0.3 * *\n\
                 garbage\n",
                expiry
            ),
        ).unwrap();
        let mut opts = Leases::default_options();
        opts.insert("path".to_string(), path.display().to_string());
        let (config, recv) = test::config(opts);
        let tagger = config.tagger.clone();
        let mut probe = Leases::new(config).unwrap();
        let (mut shutdown, _trigger) = Shutdown::pair().unwrap();
        probe.collect(&mut shutdown).unwrap();

        assert_eq!(
            vec!["hostname:laptop", "ip:10.0.0.2"],
            tagger.get("aa:bb:cc:dd:ee:01")
        );
        assert_eq!(vec!["mac:aa:bb:cc:dd:ee:02"], tagger.get("10.0.0.3"));

        let got = test::drain(&recv);
        assert_eq!(2.0, got["dhcp.leases"][0].points[0].1);
        let remaining = &got["dhcp.lease.remaining"];
        assert_eq!(1, remaining.len());
        assert!(remaining[0].points[0].1 > 500.0);
        assert!(remaining[0].tags.contains(&"hostname:laptop".to_string()));
    }
}
