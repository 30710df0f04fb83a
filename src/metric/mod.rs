//! The metric model: tags, samples and series.
//!
//! Collectors produce `Sample`s. `Measures` turns them into `Series`, which is
//! what travels over the channel to the uplink and on to the remote API.

mod sample;
mod series;
mod tag;

pub use self::sample::Sample;
pub use self::series::{Kind, Payload, Point, Series};
pub use self::tag::{parse_all, Tag};

use fnv::FnvHasher;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;

/// A `HashMap` keyed with FNV, for maps keyed on metric identity hashes.
pub type HashMapFnv<K, V> = HashMap<K, V, BuildHasherDefault<FnvHasher>>;
