use std::collections::HashMap;
use std::fmt;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, warn};

use crate::domain::{PaperRecord, Pmid};
use crate::error::KiraError;
use crate::store::Store;

pub const DEFAULT_CAPACITY: usize = 50;

/// Bounded map of resolved papers. Eviction follows first-insertion order;
/// reads and overwrites do not refresh an entry's position.
#[derive(Debug, Clone)]
pub struct RecordCache {
    capacity: usize,
    order: Vec<Pmid>,
    records: HashMap<Pmid, PaperRecord>,
    backing: Option<Utf8PathBuf>,
}

impl RecordCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: Vec::new(),
            records: HashMap::new(),
            backing: None,
        }
    }

    pub fn load(path: &Utf8Path, capacity: usize) -> Self {
        let mut cache = Self::new(capacity);
        cache.backing = Some(path.to_path_buf());

        if !path.as_std_path().exists() {
            return cache;
        }
        let entries = fs::read_to_string(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))
            .and_then(|content| {
                serde_json::from_str::<OrderedEntries>(&content)
                    .map_err(|err| KiraError::Filesystem(err.to_string()))
            });
        match entries {
            Ok(OrderedEntries(entries)) => {
                for (id, record) in entries {
                    cache.insert(id, record);
                }
                cache.evict_excess();
                debug!(path = %path, entries = cache.len(), "loaded record cache");
            }
            Err(err) => warn!(path = %path, %err, "ignoring unreadable record cache"),
        }
        cache
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: &Pmid) -> Option<&PaperRecord> {
        self.records.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PaperRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    pub fn put_all(&mut self, records: &[PaperRecord]) {
        for record in records {
            self.insert(record.id.clone(), record.clone());
        }
        self.evict_excess();
        self.persist();
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.records.clear();
        self.persist();
    }

    pub fn save(&self) -> Result<(), KiraError> {
        let Some(path) = &self.backing else {
            return Ok(());
        };
        let content =
            serde_json::to_vec(self).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Store::write_bytes_atomic(path, &content)
    }

    fn insert(&mut self, id: Pmid, record: PaperRecord) {
        if self.records.insert(id.clone(), record).is_none() {
            self.order.push(id);
        }
    }

    fn evict_excess(&mut self) {
        if self.order.len() <= self.capacity {
            return;
        }
        let excess = self.order.len() - self.capacity;
        for id in self.order.drain(..excess) {
            self.records.remove(&id);
            debug!(%id, "evicted cached record");
        }
    }

    fn persist(&self) {
        if let Err(err) = self.save() {
            warn!(%err, "failed to persist record cache");
        }
    }
}

impl Serialize for RecordCache {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.order.len()))?;
        for record in self.iter() {
            map.serialize_entry(&record.id, record)?;
        }
        map.end()
    }
}

struct OrderedEntries(Vec<(Pmid, PaperRecord)>);

impl<'de> Deserialize<'de> for OrderedEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = OrderedEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of PubMed ids to paper records")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry::<Pmid, PaperRecord>()? {
                    entries.push(entry);
                }
                Ok(OrderedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}
