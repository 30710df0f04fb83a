//! A single `key:value` tag.
//!
//! Tags are stored pre-joined since that is the shape the remote API wants
//! them in and the shape every consumer compares on.

use crate::error::Error;
use std::fmt;
use std::str::FromStr;

/// A well-formed `key:value` pair. Neither side is ever empty.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    joined: String,
    split: usize,
}

impl Tag {
    /// Create a new tag, failing if either side is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use pigeon::metric::Tag;
    ///
    /// let tag = Tag::new("iface", "eth0").unwrap();
    /// assert_eq!("iface:eth0", tag.to_string());
    /// assert!(Tag::new("", "eth0").is_err());
    /// ```
    pub fn new<K, V>(key: K, value: V) -> Result<Tag, Error>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let key = key.as_ref();
        let value = value.as_ref();
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        if value.is_empty() {
            return Err(Error::EmptyValue);
        }
        let mut joined = String::with_capacity(key.len() + value.len() + 1);
        joined.push_str(key);
        joined.push(':');
        joined.push_str(value);
        Ok(Tag {
            joined: joined,
            split: key.len(),
        })
    }

    /// The part before the first colon.
    pub fn key(&self) -> &str {
        &self.joined[..self.split]
    }

    /// The part after the first colon.
    pub fn value(&self) -> &str {
        &self.joined[self.split + 1..]
    }

    /// The joined `key:value` form.
    pub fn as_str(&self) -> &str {
        &self.joined
    }
}

impl FromStr for Tag {
    type Err = Error;

    /// Parse `key:value`, splitting on the first colon. Values may themselves
    /// contain colons, as MAC addresses do.
    fn from_str(s: &str) -> Result<Tag, Error> {
        match s.find(':') {
            Some(idx) => Tag::new(&s[..idx], &s[idx + 1..]),
            None if s.is_empty() => Err(Error::EmptyKey),
            None => Err(Error::EmptyValue),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.joined)
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> String {
        tag.joined
    }
}

/// Parse a list of `key:value` strings, failing on the first malformed one.
pub fn parse_all<I, S>(tags: I) -> Result<Vec<Tag>, Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter().map(|t| t.as_ref().parse()).collect()
}
