//! The process-wide entity to tag-set index.
//!
//! Probes that learn something about an entity (a lease file mapping a MAC to
//! a hostname, an ARP table mapping an IP to a MAC) record it here. Probes that
//! emit metrics about that entity read the tags back and attach them.

use crate::metric::Tag;
use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Entity to tag-set map, safe to share between collectors behind an `Arc`.
///
/// An entity is either absent or holds a non-empty set.
#[derive(Debug, Default)]
pub struct Tagger {
    entities: RwLock<HashMap<String, HashSet<Tag>>>,
}

impl Tagger {
    /// Create an empty tagger.
    pub fn new() -> Tagger {
        Tagger::default()
    }

    // Every mutation is a single map operation, so a writer that panicked
    // cannot have left the map inconsistent.
    fn read(&self) -> RwLockReadGuard<HashMap<String, HashSet<Tag>>> {
        self.entities.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<HashMap<String, HashSet<Tag>>> {
        self.entities.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Union `tags` into the set of `entity`.
    pub fn add<S, I>(&self, entity: S, tags: I)
    where
        S: Into<String>,
        I: IntoIterator<Item = Tag>,
    {
        let mut tags = tags.into_iter().peekable();
        if tags.peek().is_none() {
            return;
        }
        self.write()
            .entry(entity.into())
            .or_insert_with(HashSet::new)
            .extend(tags);
    }

    /// Overwrite the set of `entity`. An empty `tags` removes the entity.
    pub fn replace<S, I>(&self, entity: S, tags: I)
    where
        S: Into<String>,
        I: IntoIterator<Item = Tag>,
    {
        let entity = entity.into();
        let set: HashSet<Tag> = tags.into_iter().collect();
        let mut entities = self.write();
        if set.is_empty() {
            entities.remove(&entity);
        } else {
            entities.insert(entity, set);
        }
    }

    /// For each tag, drop any existing tag of `entity` with the same key and
    /// insert the new one. Applying the same update twice is a no-op.
    pub fn update<S, I>(&self, entity: S, tags: I)
    where
        S: Into<String>,
        I: IntoIterator<Item = Tag>,
    {
        let mut tags = tags.into_iter().peekable();
        if tags.peek().is_none() {
            return;
        }
        let mut entities = self.write();
        let set = entities.entry(entity.into()).or_insert_with(HashSet::new);
        for tag in tags {
            set.retain(|t| t.key() != tag.key());
            set.insert(tag);
        }
    }

    /// Drop `entity` and all of its tags.
    pub fn remove(&self, entity: &str) -> bool {
        self.write().remove(entity).is_some()
    }

    /// The tags of `entity` in lexicographic order. Empty if unknown.
    pub fn get(&self, entity: &str) -> Vec<String> {
        let mut tags = self.get_unstable(entity);
        tags.sort();
        tags
    }

    /// The tags of `entity` in no particular order. Empty if unknown.
    pub fn get_unstable(&self, entity: &str) -> Vec<String> {
        match self.read().get(entity) {
            Some(set) => set.iter().map(|t| t.as_str().to_string()).collect(),
            None => Vec::new(),
        }
    }

    /// Like `get`, then appends `key:value` if no tag has `key`.
    pub fn get_with_default(&self, entity: &str, key: &str, value: &str) -> Vec<String> {
        let mut tags = self.get(entity);
        let prefix = format!("{}:", key);
        if !tags.iter().any(|t| t.starts_with(&prefix)) {
            tags.push(format!("{}:{}", key, value));
        }
        tags
    }

    /// `(entities, distinct tag keys, tags)` across the whole index.
    pub fn stats(&self) -> (usize, usize, usize) {
        let entities = self.read();
        let mut keys = HashSet::new();
        let mut tags = 0;
        for set in entities.values() {
            tags += set.len();
            for tag in set {
                keys.insert(tag.key().to_string());
            }
        }
        (entities.len(), keys.len(), tags)
    }

    /// Write one `entity: tag, tag` line per entity, sorted by entity.
    pub fn print(&self, out: &mut dyn Write) -> io::Result<()> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        for name in names {
            let tags = self.get(&name);
            if tags.is_empty() {
                continue;
            }
            writeln!(out, "{}: {}", name, tags.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::parse_all;
    use std::sync::Arc;
    use std::thread;

    fn tags(raw: &[&str]) -> Vec<Tag> {
        parse_all(raw).unwrap()
    }

    #[test]
    fn add_unions() {
        let tagger = Tagger::new();
        tagger.add("aa:bb", tags(&["ip:10.0.0.2"]));
        tagger.add("aa:bb", tags(&["host:laptop", "ip:10.0.0.2"]));
        assert_eq!(vec!["host:laptop", "ip:10.0.0.2"], tagger.get("aa:bb"));
        tagger.add("empty", Vec::new());
        assert_eq!((1, 2, 2), tagger.stats());
    }

    #[test]
    fn replace_with_nothing_removes() {
        let tagger = Tagger::new();
        tagger.add("e", tags(&["a:1", "b:2"]));
        tagger.replace("e", tags(&["c:3"]));
        assert_eq!(vec!["c:3"], tagger.get("e"));
        tagger.replace("e", Vec::new());
        assert!(tagger.get("e").is_empty());
        assert_eq!((0, 0, 0), tagger.stats());
    }

    #[test]
    fn update_replaces_by_key_and_is_idempotent() {
        let tagger = Tagger::new();
        tagger.add("e", tags(&["ip:1.1.1.1", "host:a"]));
        tagger.update("e", tags(&["ip:2.2.2.2"]));
        assert_eq!(vec!["host:a", "ip:2.2.2.2"], tagger.get("e"));
        tagger.update("e", tags(&["ip:2.2.2.2"]));
        assert_eq!(vec!["host:a", "ip:2.2.2.2"], tagger.get("e"));
        tagger.update("new", tags(&["ip:3.3.3.3"]));
        assert_eq!(vec!["ip:3.3.3.3"], tagger.get("new"));
    }

    #[test]
    fn get_with_default_only_fills_missing_keys() {
        let tagger = Tagger::new();
        tagger.add("e", tags(&["hostname:nas"]));
        assert_eq!(
            vec!["hostname:nas"],
            tagger.get_with_default("e", "hostname", "unknown")
        );
        assert_eq!(
            vec!["hostname:unknown"],
            tagger.get_with_default("other", "hostname", "unknown")
        );
    }

    #[test]
    fn returned_tags_do_not_alias() {
        let tagger = Tagger::new();
        tagger.add("e", tags(&["a:1"]));
        let mut copy = tagger.get("e");
        copy.push("b:2".to_string());
        assert_eq!(vec!["a:1"], tagger.get("e"));
        assert!(tagger.remove("e"));
        assert!(!tagger.remove("e"));
    }

    #[test]
    fn print_lists_entities() {
        let tagger = Tagger::new();
        tagger.add("b", tags(&["y:2", "x:1"]));
        tagger.add("a", tags(&["z:3"]));
        let mut out = Vec::new();
        tagger.print(&mut out).unwrap();
        assert_eq!("a: z:3\nb: x:1, y:2\n", String::from_utf8(out).unwrap());
    }

    #[test]
    fn concurrent_writers() {
        let tagger = Arc::new(Tagger::new());
        let workers: Vec<_> = (0..8)
            .map(|i| {
                let tagger = Arc::clone(&tagger);
                thread::spawn(move || {
                    for j in 0..100 {
                        let tag = Tag::new("n", j.to_string()).unwrap();
                        tagger.update(format!("e{}", i), vec![tag]);
                        tagger.get_unstable(&format!("e{}", i));
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        let (entities, keys, total) = tagger.stats();
        assert_eq!(8, entities);
        assert_eq!(1, keys);
        assert_eq!(8, total);
        assert_eq!(vec!["n:99"], tagger.get("e3"));
    }
}
