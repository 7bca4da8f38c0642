use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use pubq_core::Score;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ops::{ScanOrder, Store, StoreError, StoreOps, StoreResult, WriteOp};

/// Score-ordered set with unique members.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Score>", into = "BTreeMap<String, Score>")]
pub(crate) struct SortedSet {
    scores: HashMap<String, Score>,
    order: BTreeSet<(Score, String)>,
}

impl SortedSet {
    /// Inserts or rescores `member`, returning its previous score.
    fn insert(&mut self, member: &str, score: Score) -> Option<Score> {
        let prev = self.scores.insert(member.to_string(), score);
        if let Some(old) = prev {
            self.order.remove(&(old, member.to_string()));
        }
        self.order.insert((score, member.to_string()));
        prev
    }

    fn remove(&mut self, member: &str) -> Option<Score> {
        let prev = self.scores.remove(member)?;
        self.order.remove(&(prev, member.to_string()));
        Some(prev)
    }

    fn range(&self, order: ScanOrder, limit: usize) -> Vec<String> {
        let members = self.order.iter().map(|(_, member)| member.clone());
        match order {
            ScanOrder::Ascending => members.take(limit).collect(),
            ScanOrder::Descending => members.rev().take(limit).collect(),
        }
    }

    fn len(&self) -> usize {
        self.scores.len()
    }
}

impl From<BTreeMap<String, Score>> for SortedSet {
    fn from(entries: BTreeMap<String, Score>) -> Self {
        let mut set = SortedSet::default();
        for (member, score) in entries {
            set.insert(&member, score);
        }
        set
    }
}

impl From<SortedSet> for BTreeMap<String, Score> {
    fn from(set: SortedSet) -> Self {
        set.scores.into_iter().collect()
    }
}

/// One structure stored under a key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum Value {
    Hash(BTreeMap<String, Vec<u8>>),
    SortedSet(SortedSet),
    List(VecDeque<String>),
    Set(BTreeSet<String>),
}

impl Value {
    fn new_hash() -> Value {
        Value::Hash(BTreeMap::new())
    }

    fn new_sorted_set() -> Value {
        Value::SortedSet(SortedSet::default())
    }

    fn new_list() -> Value {
        Value::List(VecDeque::new())
    }

    fn new_set() -> Value {
        Value::Set(BTreeSet::new())
    }

    fn as_hash(&self) -> Option<&BTreeMap<String, Vec<u8>>> {
        match self {
            Value::Hash(hash) => Some(hash),
            _ => None,
        }
    }

    fn as_hash_mut(&mut self) -> Option<&mut BTreeMap<String, Vec<u8>>> {
        match self {
            Value::Hash(hash) => Some(hash),
            _ => None,
        }
    }

    fn as_sorted_set(&self) -> Option<&SortedSet> {
        match self {
            Value::SortedSet(set) => Some(set),
            _ => None,
        }
    }

    fn as_sorted_set_mut(&mut self) -> Option<&mut SortedSet> {
        match self {
            Value::SortedSet(set) => Some(set),
            _ => None,
        }
    }

    fn as_list(&self) -> Option<&VecDeque<String>> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    fn as_list_mut(&mut self) -> Option<&mut VecDeque<String>> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    fn as_set_mut(&mut self) -> Option<&mut BTreeSet<String>> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Value::Hash(hash) => hash.is_empty(),
            Value::SortedSet(set) => set.len() == 0,
            Value::List(list) => list.is_empty(),
            Value::Set(set) => set.is_empty(),
        }
    }
}

pub(crate) type Keyspace = HashMap<String, Value>;

#[derive(Debug, Default)]
struct Faults {
    // `None` key fails the op on every key.
    rules: HashSet<(WriteOp, Option<String>)>,
    unavailable: bool,
}

impl Faults {
    fn check(&self, op: WriteOp, key: &str) -> StoreResult<()> {
        if self.rules.contains(&(op, None)) || self.rules.contains(&(op, Some(key.to_string())))
        {
            return Err(StoreError::Injected {
                op,
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct State {
    keyspace: Keyspace,
    faults: Faults,
}

/// In-process transactional store.
///
/// One mutex serializes every transaction, so each runs to completion
/// without interleaving. Writes are journaled and undone when the
/// transaction closure fails or panics.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_keyspace(keyspace: Keyspace) -> Self {
        Self {
            state: Mutex::new(State {
                keyspace,
                faults: Faults::default(),
            }),
        }
    }

    pub(crate) fn clone_keyspace(&self) -> Keyspace {
        self.lock().keyspace.clone()
    }

    // Aborted transactions roll back before the guard is released, so a
    // poisoned lock still protects a consistent keyspace.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every `op` on `key` fail until faults are cleared.
    pub fn fail_writes(&self, op: WriteOp, key: impl Into<String>) {
        self.lock().faults.rules.insert((op, Some(key.into())));
    }

    /// Makes every `op` fail regardless of key.
    pub fn fail_op(&self, op: WriteOp) {
        self.lock().faults.rules.insert((op, None));
    }

    pub fn clear_faults(&self) {
        self.lock().faults = Faults::default();
    }

    /// When set, every transaction fails before running.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().faults.unavailable = unavailable;
    }

    /// Number of live keys.
    pub fn key_count(&self) -> usize {
        self.lock().keyspace.len()
    }
}

impl Store for MemoryStore {
    fn atomically<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn StoreOps) -> Result<R, E>,
        E: From<StoreError>,
    {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.faults.unavailable {
            return Err(StoreError::Unavailable("memory store marked unavailable".to_string()).into());
        }
        let mut tx = MemoryTx::new(&mut state.keyspace, &state.faults);
        let out = f(&mut tx)?;
        tx.commit();
        Ok(out)
    }
}

enum Undo {
    HashField {
        key: String,
        field: String,
        prev: Option<Vec<u8>>,
    },
    SortedMember {
        key: String,
        member: String,
        prev: Option<Score>,
    },
    SetMember {
        key: String,
        member: String,
        was_member: bool,
    },
    List {
        key: String,
        prev: Option<VecDeque<String>>,
    },
}

struct MemoryTx<'a> {
    keyspace: &'a mut Keyspace,
    faults: &'a Faults,
    journal: Vec<Undo>,
    // Lists are saved whole, once per transaction.
    saved_lists: HashSet<String>,
    committed: bool,
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
    }
}

impl<'a> MemoryTx<'a> {
    fn new(keyspace: &'a mut Keyspace, faults: &'a Faults) -> Self {
        Self {
            keyspace,
            faults,
            journal: Vec::new(),
            saved_lists: HashSet::new(),
            committed: false,
        }
    }

    fn commit(&mut self) {
        self.committed = true;
        self.journal.clear();
    }

    fn read<'s, T: ?Sized>(
        &'s self,
        key: &str,
        pick: impl FnOnce(&'s Value) -> Option<&'s T>,
    ) -> StoreResult<Option<&'s T>> {
        match self.keyspace.get(key) {
            None => Ok(None),
            Some(value) => pick(value).map(Some).ok_or_else(|| wrong_type(key)),
        }
    }

    fn existing_mut<T>(
        &mut self,
        key: &str,
        pick: impl FnOnce(&mut Value) -> Option<&mut T>,
    ) -> StoreResult<Option<&mut T>> {
        match self.keyspace.get_mut(key) {
            None => Ok(None),
            Some(value) => pick(value).map(Some).ok_or_else(|| wrong_type(key)),
        }
    }

    fn create_mut<T>(
        &mut self,
        key: &str,
        create: fn() -> Value,
        pick: impl FnOnce(&mut Value) -> Option<&mut T>,
    ) -> StoreResult<&mut T> {
        let value = self.keyspace.entry(key.to_string()).or_insert_with(create);
        pick(value).ok_or_else(|| wrong_type(key))
    }

    fn drop_if_empty(&mut self, key: &str) {
        if self.keyspace.get(key).is_some_and(Value::is_empty) {
            self.keyspace.remove(key);
        }
    }

    fn save_list(&mut self, key: &str) -> StoreResult<()> {
        if self.saved_lists.contains(key) {
            return Ok(());
        }
        let prev = self.read(key, Value::as_list)?.cloned();
        self.journal.push(Undo::List {
            key: key.to_string(),
            prev,
        });
        self.saved_lists.insert(key.to_string());
        Ok(())
    }

    fn rollback(&mut self) {
        while let Some(undo) = self.journal.pop() {
            match undo {
                Undo::HashField { key, field, prev } => {
                    if let Some(hash) = self
                        .keyspace
                        .entry(key.clone())
                        .or_insert_with(Value::new_hash)
                        .as_hash_mut()
                    {
                        match prev {
                            Some(value) => hash.insert(field, value),
                            None => hash.remove(&field),
                        };
                    }
                    self.drop_if_empty(&key);
                }
                Undo::SortedMember { key, member, prev } => {
                    if let Some(set) = self
                        .keyspace
                        .entry(key.clone())
                        .or_insert_with(Value::new_sorted_set)
                        .as_sorted_set_mut()
                    {
                        match prev {
                            Some(score) => set.insert(&member, score),
                            None => set.remove(&member),
                        };
                    }
                    self.drop_if_empty(&key);
                }
                Undo::SetMember {
                    key,
                    member,
                    was_member,
                } => {
                    if let Some(set) = self
                        .keyspace
                        .entry(key.clone())
                        .or_insert_with(Value::new_set)
                        .as_set_mut()
                    {
                        if was_member {
                            set.insert(member);
                        } else {
                            set.remove(&member);
                        }
                    }
                    self.drop_if_empty(&key);
                }
                Undo::List { key, prev } => match prev {
                    Some(list) => {
                        self.keyspace.insert(key, Value::List(list));
                    }
                    None => {
                        self.keyspace.remove(&key);
                    }
                },
            }
        }
    }
}

impl Drop for MemoryTx<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.journal.is_empty() {
            let undone = self.journal.len();
            self.rollback();
            debug!(undone, "rolled back aborted transaction");
        }
    }
}

impl StoreOps for MemoryTx<'_> {
    fn zadd(&mut self, key: &str, score: Score, member: &str) -> StoreResult<bool> {
        self.faults.check(WriteOp::ZAdd, key)?;
        let set = self.create_mut(key, Value::new_sorted_set, Value::as_sorted_set_mut)?;
        let prev = set.insert(member, score);
        self.journal.push(Undo::SortedMember {
            key: key.to_string(),
            member: member.to_string(),
            prev,
        });
        Ok(prev.is_none())
    }

    fn zrange(&self, key: &str, order: ScanOrder, limit: usize) -> StoreResult<Vec<String>> {
        Ok(self
            .read(key, Value::as_sorted_set)?
            .map(|set| set.range(order, limit))
            .unwrap_or_default())
    }

    fn zrem(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        self.faults.check(WriteOp::ZRem, key)?;
        let Some(set) = self.existing_mut(key, Value::as_sorted_set_mut)? else {
            return Ok(false);
        };
        let Some(prev) = set.remove(member) else {
            return Ok(false);
        };
        self.journal.push(Undo::SortedMember {
            key: key.to_string(),
            member: member.to_string(),
            prev: Some(prev),
        });
        self.drop_if_empty(key);
        Ok(true)
    }

    fn zcard(&self, key: &str) -> StoreResult<usize> {
        Ok(self
            .read(key, Value::as_sorted_set)?
            .map_or(0, SortedSet::len))
    }

    fn hset(&mut self, key: &str, field: &str, value: &[u8]) -> StoreResult<bool> {
        self.faults.check(WriteOp::HSet, key)?;
        let hash = self.create_mut(key, Value::new_hash, Value::as_hash_mut)?;
        let prev = hash.insert(field.to_string(), value.to_vec());
        let is_new = prev.is_none();
        self.journal.push(Undo::HashField {
            key: key.to_string(),
            field: field.to_string(),
            prev,
        });
        Ok(is_new)
    }

    fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self
            .read(key, Value::as_hash)?
            .and_then(|hash| hash.get(field).cloned()))
    }

    fn hmget(&self, key: &str, fields: &[&str]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        let hash = self.read(key, Value::as_hash)?;
        Ok(fields
            .iter()
            .map(|field| hash.and_then(|hash| hash.get(*field).cloned()))
            .collect())
    }

    fn hdel(&mut self, key: &str, field: &str) -> StoreResult<bool> {
        self.faults.check(WriteOp::HDel, key)?;
        let Some(hash) = self.existing_mut(key, Value::as_hash_mut)? else {
            return Ok(false);
        };
        let Some(prev) = hash.remove(field) else {
            return Ok(false);
        };
        self.journal.push(Undo::HashField {
            key: key.to_string(),
            field: field.to_string(),
            prev: Some(prev),
        });
        self.drop_if_empty(key);
        Ok(true)
    }

    fn hincrby(&mut self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        self.faults.check(WriteOp::HIncrBy, key)?;
        let not_an_integer = || StoreError::NotAnInteger {
            key: key.to_string(),
            field: field.to_string(),
        };
        let current = match self.read(key, Value::as_hash)?.and_then(|h| h.get(field)) {
            None => 0,
            Some(raw) => std::str::from_utf8(raw)
                .ok()
                .and_then(|text| text.parse::<i64>().ok())
                .ok_or_else(not_an_integer)?,
        };
        let next = current.checked_add(delta).ok_or_else(not_an_integer)?;
        let hash = self.create_mut(key, Value::new_hash, Value::as_hash_mut)?;
        let prev = hash.insert(field.to_string(), next.to_string().into_bytes());
        self.journal.push(Undo::HashField {
            key: key.to_string(),
            field: field.to_string(),
            prev,
        });
        Ok(next)
    }

    fn hgetall(&self, key: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        Ok(self
            .read(key, Value::as_hash)?
            .map(|hash| {
                hash.iter()
                    .map(|(field, value)| (field.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn lpush(&mut self, key: &str, value: &str) -> StoreResult<usize> {
        self.faults.check(WriteOp::LPush, key)?;
        self.save_list(key)?;
        let list = self.create_mut(key, Value::new_list, Value::as_list_mut)?;
        list.push_front(value.to_string());
        Ok(list.len())
    }

    fn rpush(&mut self, key: &str, value: &str) -> StoreResult<usize> {
        self.faults.check(WriteOp::RPush, key)?;
        self.save_list(key)?;
        let list = self.create_mut(key, Value::new_list, Value::as_list_mut)?;
        list.push_back(value.to_string());
        Ok(list.len())
    }

    fn lrange(&self, key: &str, limit: usize) -> StoreResult<Vec<String>> {
        Ok(self
            .read(key, Value::as_list)?
            .map(|list| list.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn lrem(&mut self, key: &str, value: &str) -> StoreResult<usize> {
        self.faults.check(WriteOp::LRem, key)?;
        let occurrences = self
            .read(key, Value::as_list)?
            .map_or(0, |list| list.iter().filter(|item| *item == value).count());
        if occurrences == 0 {
            return Ok(0);
        }
        self.save_list(key)?;
        if let Some(list) = self.existing_mut(key, Value::as_list_mut)? {
            list.retain(|item| item != value);
        }
        self.drop_if_empty(key);
        Ok(occurrences)
    }

    fn llen(&self, key: &str) -> StoreResult<usize> {
        Ok(self.read(key, Value::as_list)?.map_or(0, VecDeque::len))
    }

    fn sadd(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        self.faults.check(WriteOp::SAdd, key)?;
        let set = self.create_mut(key, Value::new_set, Value::as_set_mut)?;
        let inserted = set.insert(member.to_string());
        if inserted {
            self.journal.push(Undo::SetMember {
                key: key.to_string(),
                member: member.to_string(),
                was_member: false,
            });
        }
        Ok(inserted)
    }

    fn srem(&mut self, key: &str, member: &str) -> StoreResult<bool> {
        self.faults.check(WriteOp::SRem, key)?;
        let Some(set) = self.existing_mut(key, Value::as_set_mut)? else {
            return Ok(false);
        };
        if !set.remove(member) {
            return Ok(false);
        }
        self.journal.push(Undo::SetMember {
            key: key.to_string(),
            member: member.to_string(),
            was_member: true,
        });
        self.drop_if_empty(key);
        Ok(true)
    }

    fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        Ok(self
            .read(key, Value::as_set)?
            .is_some_and(|set| set.contains(member)))
    }

    fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .read(key, Value::as_set)?
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.keyspace.contains_key(key))
    }
}
