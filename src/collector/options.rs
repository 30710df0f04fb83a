//! Untyped collector options as they come out of the configuration file.
//!
//! Every probe declares its options and their defaults up front. User values
//! are merged over the defaults and the probe parses the result once, into its
//! own typed record, when it is built.

use crate::error::Error;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Option name to raw value.
pub type Options = BTreeMap<String, String>;

/// Build an `Options` from literal pairs.
pub fn defaults(pairs: &[(&str, &str)]) -> Options {
    pairs
        .iter()
        .map(|&(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Overlay `user` on `defaults`. A user key with no default is rejected.
pub fn merge(collector: &str, defaults: &Options, user: &Options) -> Result<Options, Error> {
    let mut merged = defaults.clone();
    for (key, value) in user {
        if !defaults.contains_key(key) {
            return Err(Error::ConfigInvalid(format!(
                "collector {} has no option {:?}",
                collector, key
            )));
        }
        merged.insert(key.clone(), value.clone());
    }
    Ok(merged)
}

/// The raw value of `key`.
pub fn get<'a>(options: &'a Options, key: &str) -> Result<&'a str, Error> {
    options
        .get(key)
        .map(|v| v.as_str())
        .ok_or_else(|| Error::OptionMissing(key.to_string()))
}

/// `key` as a filesystem path.
pub fn path(options: &Options, key: &str) -> Result<PathBuf, Error> {
    get(options, key).map(PathBuf::from)
}

/// `key` as a humantime duration such as `15s` or `2h`.
pub fn duration(options: &Options, key: &str) -> Result<Duration, Error> {
    let raw = get(options, key)?;
    humantime::parse_duration(raw)
        .map_err(|e| Error::ConfigInvalid(format!("option {}: {:?}: {}", key, raw, e)))
}

/// `key` as `true` or `false`.
pub fn boolean(options: &Options, key: &str) -> Result<bool, Error> {
    let raw = get(options, key)?;
    raw.parse()
        .map_err(|_| Error::ConfigInvalid(format!("option {}: {:?} is not a boolean", key, raw)))
}
