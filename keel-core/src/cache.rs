use crate::{RowLabeled, Value};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
};

/// Cache of rows fetched by primary key, shared by every session of an engine.
///
/// Each table has a stamp that grows at every invalidation. Readers take the stamp before
/// querying and hand it back to [`RowCache::put`], which discards the row when the table was
/// invalidated in between, so a slow reader never stores a row older than a committed write.
pub trait RowCache: Send + Sync {
    fn get(&self, table: &str, key: &str) -> Option<RowLabeled>;
    fn stamp(&self, table: &str) -> u64;
    fn put(&self, table: &str, key: &str, row: RowLabeled, stamp: u64);
    fn invalidate(&self, table: &str, key: &str);
    fn invalidate_table(&self, table: &str);
    /// Drop everything, used after raw statements touching unknown tables.
    fn clear(&self);
}

/// Cache key of a primary key, `None` when a component is NULL or cannot be a key.
pub fn cache_key(key: &[Value]) -> Option<String> {
    let mut result = String::new();
    for (i, value) in key.iter().enumerate() {
        if i > 0 {
            result.push('\u{1f}');
        }
        result.push_str(&value.as_key()?);
    }
    Some(result)
}

#[derive(Debug, Default)]
struct LruState {
    entries: HashMap<(String, String), (RowLabeled, u64)>,
    /// Access tick to entry, oldest first.
    order: BTreeMap<u64, (String, String)>,
    stamps: HashMap<String, u64>,
    /// Grows at every [`RowCache::clear`], part of every stamp.
    generation: u64,
    tick: u64,
}

impl LruState {
    fn touch(&mut self, key: &(String, String)) {
        self.tick += 1;
        let tick = self.tick;
        if let Some((_, last)) = self.entries.get_mut(key) {
            self.order.remove(last);
            *last = tick;
            self.order.insert(tick, key.clone());
        }
    }

    fn remove(&mut self, key: &(String, String)) {
        if let Some((_, tick)) = self.entries.remove(key) {
            self.order.remove(&tick);
        }
    }

    fn bump(&mut self, table: &str) {
        *self.stamps.entry(table.to_string()).or_default() += 1;
    }

    fn stamp(&self, table: &str) -> u64 {
        self.generation + self.stamps.get(table).copied().unwrap_or(0)
    }
}

/// In-process least recently used cache holding at most `capacity` rows.
#[derive(Debug)]
pub struct LruRowCache {
    capacity: usize,
    state: Mutex<LruState>,
}

impl LruRowCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Default::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RowCache for LruRowCache {
    fn get(&self, table: &str, key: &str) -> Option<RowLabeled> {
        let mut state = self.state.lock().ok()?;
        let key = (table.to_string(), key.to_string());
        let row = state.entries.get(&key).map(|(row, _)| row.clone())?;
        state.touch(&key);
        log::trace!("Cache hit for `{}` key `{}`", key.0, key.1);
        Some(row)
    }

    fn stamp(&self, table: &str) -> u64 {
        self.state
            .lock()
            .map(|s| s.stamp(table))
            .unwrap_or(u64::MAX)
    }

    fn put(&self, table: &str, key: &str, row: RowLabeled, stamp: u64) {
        if self.capacity == 0 {
            return;
        }
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.stamp(table) != stamp {
            log::trace!("Discarding a stale row of `{table}` key `{key}`");
            return;
        }
        let key = (table.to_string(), key.to_string());
        state.remove(&key);
        state.tick += 1;
        let tick = state.tick;
        state.entries.insert(key.clone(), (row, tick));
        state.order.insert(tick, key);
        while state.entries.len() > self.capacity {
            let Some((_, oldest)) = state.order.pop_first() else {
                break;
            };
            state.entries.remove(&oldest);
        }
    }

    fn invalidate(&self, table: &str, key: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.bump(table);
            state.remove(&(table.to_string(), key.to_string()));
            log::trace!("Invalidated `{table}` key `{key}`");
        }
    }

    fn invalidate_table(&self, table: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.bump(table);
            let keys: Vec<_> = state
                .entries
                .keys()
                .filter(|(t, _)| t == table)
                .cloned()
                .collect();
            for key in keys {
                state.remove(&key);
            }
            log::trace!("Invalidated table `{table}`");
        }
    }

    fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.generation += 1;
            state.entries.clear();
            state.order.clear();
        }
    }
}
