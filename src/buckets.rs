//! Buckets are the uplink's internal storage type.
//!
//! Series arriving from collectors between two sends are folded here. Series
//! that share an identity are merged by concatenating their points, so one
//! batch carries each identity once.

use crate::metric::{HashMapFnv, Series};

/// Buckets stores all series until they are flushed.
#[derive(Debug, Default)]
pub struct Buckets {
    series: Vec<Series>,
    index: HashMapFnv<u64, usize>,
    points: usize,
}

impl Buckets {
    /// Create empty Buckets with room for `capacity` identities.
    pub fn with_capacity(capacity: usize) -> Buckets {
        let mut index = HashMapFnv::default();
        index.reserve(capacity);
        Buckets {
            series: Vec::with_capacity(capacity),
            index: index,
            points: 0,
        }
    }

    /// Adds a series to the bucket storage.
    ///
    /// Returns 1 if the series joined an identity already stored, 0 if it
    /// started a new one.
    ///
    /// # Examples
    ///
    /// ```
    /// use pigeon::buckets::Buckets;
    /// use pigeon::metric::{Sample, Series};
    ///
    /// let mut buckets = Buckets::default();
    /// let s = Series::gauge(Sample::new("system.load.1", 0.5).host("gw"));
    ///
    /// assert_eq!(0, buckets.aggregate(s.clone()));
    /// assert_eq!(1, buckets.aggregate(s));
    /// assert_eq!(1, buckets.len());
    /// assert_eq!(2, buckets.point_count());
    /// ```
    pub fn aggregate(&mut self, series: Series) -> usize {
        self.points += series.points.len();
        let key = series.key();
        match self.index.get(&key) {
            Some(&idx) => {
                self.series[idx].points.extend(series.points);
                1
            }
            None => {
                self.index.insert(key, self.series.len());
                self.series.push(series);
                0
            }
        }
    }

    /// A copy of every stored series, in order of first insertion.
    pub fn series(&self) -> Vec<Series> {
        self.series.clone()
    }

    /// Resets the storage.
    ///
    /// The next round is pre-sized to three quarters of this one, on the
    /// assumption that the set of identities is mostly stable between sends.
    pub fn reset(&mut self) {
        let hint = self.series.len() * 3 / 4;
        *self = Buckets::with_capacity(hint);
    }

    /// Number of distinct identities stored.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// True if no series is stored.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Total number of points across all stored series.
    pub fn point_count(&self) -> usize {
        self.points
    }
}
