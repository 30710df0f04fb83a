//! Pigeon is a small metrics agent for routers and other always-on devices.
//! It reads what the host already knows about itself, mostly from `/proc`,
//! `/sys` and the logs and lease files of the daemons it runs, and ships the
//! result as gauge and count series to a Datadog-style HTTP API.
//!
//! The pieces, bottom up:
//!
//!  * `metric` holds the `Sample` a collector produces and the `Series` the
//!    uplink ships.
//!  * `measures` turns raw samples into series: plain gauges, deduplicated
//!    gauges and counts derived from monotonic counters.
//!  * `buckets` is the uplink's aggregate store.
//!  * `client` is the uplink: a bounded channel, a send loop and a remote log
//!    sink.
//!  * `tagger` is the process-wide entity to tags map probes enrich each
//!    other's series with.
//!  * `collector`, `runtime` and `supervisor` define, drive and own the
//!    collectors found in `probes`.
#![allow(unknown_lints)]
#![deny(unstable_features, unused_import_braces)]
#![warn(missing_docs, trivial_numeric_casts)]

#[macro_use]
extern crate log;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate serde_derive;

#[cfg(test)]
#[macro_use]
extern crate serde_json;

pub mod buckets;
pub mod client;
pub mod collector;
pub mod config;
pub mod constants;
pub mod error;
pub mod measures;
pub mod metric;
pub mod probes;
pub mod runtime;
pub mod supervisor;
pub mod tagger;
pub mod thread;
pub mod time;
