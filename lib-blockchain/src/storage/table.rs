//! Typed tables with ordered secondary indices and undo frames.
//!
//! A `Table<T>` stores records by primary key in a `BTreeMap`. Each record
//! type declares its secondary indices by name; an index is a sorted set of
//! `(index_key, primary_key)` pairs, so iteration order is the index key
//! with the primary key as tie-breaker.
//!
//! # Undo frames
//!
//! While at least one frame is open, the first mutation of a key records the
//! row's previous value (or its absence) in the newest frame. Undoing a
//! frame writes those values back. Squashing merges the newest frame into
//! the one below it, keeping the older saved value for keys both touched.
//! Frames are opened and closed by `ChainState`, never directly.

use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Debug;
use std::ops::Bound;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{StorageError, StorageResult};

/// A row type stored in a `Table`.
pub trait Record: Clone + Serialize + DeserializeOwned {
    type Key: Ord + Clone + Debug + Serialize + DeserializeOwned;

    /// Table name, used in errors and logs.
    const TABLE: &'static str;

    /// Secondary index names. `index_key(i)` builds the key for `INDICES[i]`.
    const INDICES: &'static [&'static str] = &[];

    fn key(&self) -> Self::Key;

    fn index_key(&self, _index: usize) -> Vec<u8> {
        Vec::new()
    }
}

/// Operations every undoable container supports.
pub trait UndoableTable {
    fn push_frame(&mut self);
    fn undo_frame(&mut self);
    fn squash_frame(&mut self);
    fn commit_oldest(&mut self);
    fn frame_count(&self) -> usize;
}

#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
struct Frame<T: Record> {
    old_rows: BTreeMap<T::Key, Option<T>>,
    next_id: u64,
}

impl<T: Record> Clone for Frame<T> {
    fn clone(&self) -> Self {
        Self {
            old_rows: self.old_rows.clone(),
            next_id: self.next_id,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Table<T: Record> {
    rows: BTreeMap<T::Key, T>,
    /// Entries always carry `Some(pk)`. `None` sorts before every primary
    /// key and only appears as a range bound.
    indices: Vec<BTreeSet<(Vec<u8>, Option<T::Key>)>>,
    next_id: u64,
    frames: VecDeque<Frame<T>>,
}

impl<T: Record> Clone for Table<T> {
    fn clone(&self) -> Self {
        Self {
            rows: self.rows.clone(),
            indices: self.indices.clone(),
            next_id: self.next_id,
            frames: self.frames.clone(),
        }
    }
}

impl<T: Record> Default for Table<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> Debug for Table<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("table", &T::TABLE)
            .field("rows", &self.rows.len())
            .field("frames", &self.frames.len())
            .finish()
    }
}

impl<T: Record> PartialEq for Table<T>
where
    T: PartialEq,
{
    /// Compares contents only. Undo history is not part of equality.
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows && self.next_id == other.next_id
    }
}

impl<T: Record> Table<T> {
    pub fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            indices: vec![BTreeSet::new(); T::INDICES.len()],
            next_id: 0,
            frames: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&T>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.rows.get(key)
    }

    /// Like `get`, but a missing row is an error.
    pub fn require<Q>(&self, key: &Q) -> StorageResult<&T>
    where
        T::Key: Borrow<Q>,
        Q: Ord + Debug + ?Sized,
    {
        self.rows.get(key).ok_or_else(|| StorageError::NotFound {
            table: T::TABLE,
            key: format!("{key:?}"),
        })
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.rows.contains_key(key)
    }

    /// Allocates the next auto-increment id. Restored on undo.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, row: T) -> StorageResult<()> {
        let key = row.key();
        if self.rows.contains_key(&key) {
            return Err(StorageError::Duplicate {
                table: T::TABLE,
                key: format!("{key:?}"),
            });
        }
        self.save_old(&key, None);
        self.index_insert(&row, &key);
        self.rows.insert(key, row);
        Ok(())
    }

    /// Applies `f` to the row at `key`. The primary key must not change.
    pub fn modify<Q, F, R>(&mut self, key: &Q, f: F) -> StorageResult<R>
    where
        T::Key: Borrow<Q>,
        Q: Ord + Debug + ?Sized,
        F: FnOnce(&mut T) -> R,
    {
        let mut row = self.require(key)?.clone();
        let old = row.clone();
        let pk = old.key();
        let out = f(&mut row);
        if row.key() != pk {
            return Err(StorageError::KeyMutated {
                table: T::TABLE,
                key: format!("{pk:?}"),
            });
        }
        self.save_old(&pk, Some(old.clone()));
        self.index_remove(&old, &pk);
        self.index_insert(&row, &pk);
        self.rows.insert(pk, row);
        Ok(out)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> StorageResult<T>
    where
        T::Key: Borrow<Q>,
        Q: Ord + Debug + ?Sized,
    {
        let pk = self.require(key)?.key();
        let row = self.rows.remove::<T::Key>(&pk).ok_or_else(|| StorageError::NotFound {
            table: T::TABLE,
            key: format!("{pk:?}"),
        })?;
        self.index_remove(&row, &pk);
        self.save_old(&pk, Some(row.clone()));
        Ok(row)
    }

    /// Rows in primary key order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.rows.values()
    }

    /// Rows with primary key in `range`.
    pub fn range<R>(&self, range: R) -> impl Iterator<Item = &T> + '_
    where
        R: std::ops::RangeBounds<T::Key>,
    {
        self.rows.range(range).map(|(_, v)| v)
    }

    /// Rows in the order of secondary index `index`.
    pub fn iter_by(&self, index: usize) -> impl Iterator<Item = &T> + '_ {
        self.indices[index]
            .iter()
            .filter_map(move |(_, pk)| self.row_for(pk))
    }

    /// Rows of index `index` whose index key is `>= from`.
    pub fn iter_by_from<'a>(&'a self, index: usize, from: &[u8]) -> impl Iterator<Item = &'a T> + 'a {
        self.indices[index]
            .range((Bound::Included((from.to_vec(), None)), Bound::Unbounded))
            .filter_map(move |(_, pk)| self.row_for(pk))
    }

    /// First row of index `index`.
    pub fn first_by(&self, index: usize) -> Option<&T> {
        self.indices[index]
            .iter()
            .next()
            .and_then(|(_, pk)| self.row_for(pk))
    }

    /// Primary keys of rows at the front of index `index` while `pred` holds.
    ///
    /// Collected up front so the caller can mutate the table while walking.
    pub fn keys_by_while<F>(&self, index: usize, mut pred: F) -> Vec<T::Key>
    where
        F: FnMut(&T) -> bool,
    {
        self.iter_by(index)
            .take_while(|row| pred(row))
            .map(|row| row.key())
            .collect()
    }

    /// Primary keys in `range`, collected.
    pub fn keys_in<R>(&self, range: R) -> Vec<T::Key>
    where
        R: std::ops::RangeBounds<T::Key>,
    {
        self.rows.range(range).map(|(k, _)| k.clone()).collect()
    }

    pub fn keys(&self) -> Vec<T::Key> {
        self.rows.keys().cloned().collect()
    }

    /// Rows whose primary key is greater than `after`.
    pub fn iter_after<'a>(&'a self, after: &T::Key) -> impl Iterator<Item = &'a T> + 'a {
        self.rows
            .range((Bound::Excluded(after.clone()), Bound::Unbounded))
            .map(|(_, v)| v)
    }

    fn row_for(&self, pk: &Option<T::Key>) -> Option<&T> {
        pk.as_ref().and_then(|pk| self.rows.get(pk))
    }

    fn save_old(&mut self, key: &T::Key, old: Option<T>) {
        if let Some(frame) = self.frames.back_mut() {
            frame.old_rows.entry(key.clone()).or_insert(old);
        }
    }

    fn index_insert(&mut self, row: &T, pk: &T::Key) {
        for (i, index) in self.indices.iter_mut().enumerate() {
            index.insert((row.index_key(i), Some(pk.clone())));
        }
    }

    fn index_remove(&mut self, row: &T, pk: &T::Key) {
        for (i, index) in self.indices.iter_mut().enumerate() {
            index.remove(&(row.index_key(i), Some(pk.clone())));
        }
    }

    /// Writes a row back without touching undo frames.
    fn restore(&mut self, key: T::Key, old: Option<T>) {
        if let Some(current) = self.rows.remove(&key) {
            self.index_remove(&current, &key);
        }
        if let Some(row) = old {
            self.index_insert(&row, &key);
            self.rows.insert(key, row);
        }
    }
}

impl<T: Record> UndoableTable for Table<T> {
    fn push_frame(&mut self) {
        self.frames.push_back(Frame {
            old_rows: BTreeMap::new(),
            next_id: self.next_id,
        });
    }

    fn undo_frame(&mut self) {
        if let Some(frame) = self.frames.pop_back() {
            for (key, old) in frame.old_rows {
                self.restore(key, old);
            }
            self.next_id = frame.next_id;
        }
    }

    fn squash_frame(&mut self) {
        if let Some(frame) = self.frames.pop_back() {
            if let Some(prev) = self.frames.back_mut() {
                for (key, old) in frame.old_rows {
                    prev.old_rows.entry(key).or_insert(old);
                }
            }
        }
    }

    fn commit_oldest(&mut self) {
        self.frames.pop_front();
    }

    fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

/// A single undoable value, for global objects.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Singleton<T: Clone + Serialize + DeserializeOwned> {
    value: T,
    frames: VecDeque<Option<T>>,
}

impl<T: Clone + Serialize + DeserializeOwned> Clone for Singleton<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            frames: self.frames.clone(),
        }
    }
}

impl<T: Clone + Serialize + DeserializeOwned + Debug> Debug for Singleton<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.value.fmt(f)
    }
}

impl<T: Clone + Serialize + DeserializeOwned + PartialEq> PartialEq for Singleton<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: Clone + Serialize + DeserializeOwned> Singleton<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            frames: VecDeque::new(),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn modify<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        if let Some(slot) = self.frames.back_mut() {
            if slot.is_none() {
                *slot = Some(self.value.clone());
            }
        }
        f(&mut self.value)
    }
}

impl<T: Clone + Serialize + DeserializeOwned + Default> Default for Singleton<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + Serialize + DeserializeOwned> std::ops::Deref for Singleton<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Clone + Serialize + DeserializeOwned> UndoableTable for Singleton<T> {
    fn push_frame(&mut self) {
        self.frames.push_back(None);
    }

    fn undo_frame(&mut self) {
        if let Some(Some(old)) = self.frames.pop_back() {
            self.value = old;
        }
    }

    fn squash_frame(&mut self) {
        if let Some(Some(old)) = self.frames.pop_back() {
            if let Some(prev) = self.frames.back_mut() {
                if prev.is_none() {
                    *prev = Some(old);
                }
            }
        }
    }

    fn commit_oldest(&mut self) {
        self.frames.pop_front();
    }

    fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::keys::KeyBuilder;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        name: String,
        score: u64,
    }

    impl Record for Row {
        type Key = String;
        const TABLE: &'static str = "row";
        const INDICES: &'static [&'static str] = &["by_score"];

        fn key(&self) -> String {
            self.name.clone()
        }

        fn index_key(&self, _index: usize) -> Vec<u8> {
            KeyBuilder::new().u64_desc(self.score).build()
        }
    }

    fn row(name: &str, score: u64) -> Row {
        Row {
            name: name.to_string(),
            score,
        }
    }

    #[test]
    fn test_iter_by_from_starts_at_index_key() {
        let mut t = Table::<Row>::new();
        for (name, score) in [("a", 1), ("b", 5), ("c", 3), ("d", 8), ("e", 5)] {
            t.insert(row(name, score)).unwrap();
        }
        let from = KeyBuilder::new().u64_desc(5).build();
        let names = |t: &Table<Row>| -> Vec<String> { t.iter_by_from(0, &from).map(|r| r.name.clone()).collect() };
        assert_eq!(names(&t), vec!["b", "e", "c", "a"]);

        let removed = t.remove("c").unwrap();
        assert_eq!(removed.score, 3);
        assert_eq!(names(&t), vec!["b", "e", "a"]);
        assert!(t.remove("c").is_err());
    }

    #[test]
    fn test_index_order_follows_modify() {
        let mut t = Table::<Row>::new();
        t.insert(row("a", 1)).unwrap();
        t.insert(row("b", 5)).unwrap();
        t.insert(row("c", 3)).unwrap();
        let order: Vec<_> = t.iter_by(0).map(|r| r.name.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);

        t.modify("a", |r| r.score = 9).unwrap();
        assert_eq!(t.first_by(0).unwrap().name, "a");
    }

    #[test]
    fn test_duplicate_and_missing_rows_are_errors() {
        let mut t = Table::<Row>::new();
        t.insert(row("a", 1)).unwrap();
        assert!(matches!(t.insert(row("a", 2)), Err(StorageError::Duplicate { .. })));
        assert!(matches!(t.remove("z"), Err(StorageError::NotFound { .. })));
        assert!(matches!(
            t.modify("a", |r| r.name = "x".into()),
            Err(StorageError::KeyMutated { .. })
        ));
    }

    #[test]
    fn test_undo_restores_rows_indices_and_ids() {
        let mut t = Table::<Row>::new();
        t.insert(row("a", 1)).unwrap();
        let before = t.clone();

        t.push_frame();
        t.next_id();
        t.modify("a", |r| r.score = 7).unwrap();
        t.modify("a", |r| r.score = 8).unwrap();
        t.insert(row("b", 2)).unwrap();
        t.remove("a").unwrap();
        t.undo_frame();

        assert!(t == before);
        assert_eq!(t.iter_by(0).count(), 1);
        assert_eq!(t.next_id(), 0);
    }

    #[test]
    fn test_squash_keeps_oldest_value() {
        let mut t = Table::<Row>::new();
        t.insert(row("a", 1)).unwrap();
        t.push_frame();
        t.modify("a", |r| r.score = 2).unwrap();
        t.push_frame();
        t.modify("a", |r| r.score = 3).unwrap();
        t.squash_frame();
        assert_eq!(t.frame_count(), 1);
        t.undo_frame();
        assert_eq!(t.get("a").unwrap().score, 1);
    }

    #[test]
    fn test_singleton_undo() {
        let mut s = Singleton::new(1u32);
        s.push_frame();
        s.modify(|v| *v = 2);
        s.push_frame();
        s.modify(|v| *v = 3);
        s.squash_frame();
        s.undo_frame();
        assert_eq!(*s.get(), 1);
    }
}
