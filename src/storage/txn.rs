use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use log::debug;

use crate::{
    error::{Error, Result},
    storage::engine::{Engine, prefix_range},
};

/// Transaction manager over a byte-level storage engine
///
/// At most one read-write transaction is active at a time. Its writes are
/// buffered and only reach the engine on commit, so readers outside the
/// transaction keep seeing the pre-transaction state.
///
/// Commits hold the write side of `gate` while applying, readers inside
/// `read` hold the read side, so a reader sees each commit entirely or not
/// at all.
pub struct TxnManager<E: Engine> {
    engine: Arc<Mutex<E>>,
    gate: Arc<RwLock<()>>,
    /// Number of applied commits
    commits: Arc<AtomicU64>,
    active: Arc<AtomicBool>,
    next_id: Arc<AtomicU64>,
}

impl<E: Engine> Clone for TxnManager<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            gate: self.gate.clone(),
            commits: self.commits.clone(),
            active: self.active.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<E: Engine> TxnManager<E> {
    pub fn new(eng: E) -> Self {
        Self {
            engine: Arc::new(Mutex::new(eng)),
            gate: Arc::new(RwLock::new(())),
            commits: Arc::new(AtomicU64::new(0)),
            active: Arc::new(AtomicBool::new(false)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Begins a read-write transaction. Fails if one is already active.
    pub fn begin(&self) -> Result<Transaction<E>> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Transaction(
                "cannot begin a transaction while another transaction is active".into(),
            ));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("begin transaction {}", id);
        Ok(Transaction {
            id,
            engine: self.engine.clone(),
            gate: self.gate.clone(),
            commits: self.commits.clone(),
            snapshot: 0,
            active: Some(self.active.clone()),
            writes: BTreeMap::new(),
            state: TransactionState::Active,
        })
    }

    /// Begins a read-only view of the committed state. Does not take the
    /// active transaction slot.
    ///
    /// The view is only valid until the next commit, reads after that fail.
    /// Use `read` to keep commits out while the view is in use.
    pub fn begin_read_only(&self) -> Transaction<E> {
        Transaction {
            id: 0,
            engine: self.engine.clone(),
            gate: self.gate.clone(),
            commits: self.commits.clone(),
            snapshot: self.commits.load(Ordering::Acquire),
            active: None,
            writes: BTreeMap::new(),
            state: TransactionState::Active,
        }
    }

    /// Runs f against a read-only view. Commits wait until f returns.
    pub fn read<R>(&self, f: impl FnOnce(Transaction<E>) -> Result<R>) -> Result<R> {
        let _gate = self.gate.read()?;
        f(self.begin_read_only())
    }

    /// Whether a read-write transaction is currently active.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

/// A transaction: a write buffer layered over the engine
///
/// A pending write is `Some(value)`, a pending delete is `None`.
pub struct Transaction<E: Engine> {
    id: u64,
    engine: Arc<Mutex<E>>,
    gate: Arc<RwLock<()>>,
    commits: Arc<AtomicU64>,
    /// Commit count when a read-only view began
    snapshot: u64,
    /// The manager's active flag, None for read-only transactions.
    active: Option<Arc<AtomicBool>>,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    state: TransactionState,
}

/// Scan result containing key-value pair
#[derive(Debug, PartialEq)]
pub struct ScanResult {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl<E: Engine> Transaction<E> {
    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_read_only(&self) -> bool {
        self.active.is_none()
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Committed => {
                Err(Error::Transaction("transaction has already been committed".into()))
            }
            TransactionState::Aborted => {
                Err(Error::Transaction("transaction has been rolled back".into()))
            }
        }
    }

    /// Fails a read-only view once a commit has been applied after it
    /// began. Checked after each read: a commit bumps the counter before
    /// releasing the engine lock, so any read that overlapped it is caught.
    fn ensure_snapshot(&self) -> Result<()> {
        if self.is_read_only() && self.commits.load(Ordering::Acquire) != self.snapshot {
            return Err(Error::Transaction("read-only view is stale, a commit happened since".into()));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_active()?;
        if self.is_read_only() {
            return Err(Error::Transaction("transaction is read-only".into()));
        }
        Ok(())
    }

    /// Applies all buffered writes under a single engine lock.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        let read_write = self.active.is_some();
        let writes = std::mem::take(&mut self.writes);
        let count = writes.len();
        if !writes.is_empty() {
            let _gate = self.gate.write()?;
            let mut engine = self.engine.lock()?;
            for (key, value) in writes {
                match value {
                    Some(value) => engine.set(&key, value)?,
                    None => engine.delete(&key)?,
                }
            }
            self.commits.fetch_add(1, Ordering::AcqRel);
        }
        self.state = TransactionState::Committed;
        self.release();
        if read_write {
            debug!("commit transaction {} ({} writes)", self.id, count);
        }
        Ok(())
    }

    /// Discards all buffered writes.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_active()?;
        let count = self.writes.len();
        self.writes.clear();
        self.state = TransactionState::Aborted;
        if self.active.is_some() {
            debug!("rollback transaction {} ({} writes discarded)", self.id, count);
        }
        self.release();
        Ok(())
    }

    fn release(&mut self) {
        if let Some(active) = self.active.take() {
            active.store(false, Ordering::Release);
        }
    }

    pub fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.ensure_writable()?;
        self.writes.insert(key.to_vec(), Some(value));
        Ok(())
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    /// Gets the value for a key, own writes first
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_active()?;
        if let Some(value) = self.writes.get(key) {
            return Ok(value.clone());
        }
        let value = self.engine.lock()?.get(key)?;
        self.ensure_snapshot()?;
        Ok(value)
    }

    /// Scans keys with prefix, merging own writes over the engine's state
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<ScanResult>> {
        self.ensure_active()?;
        let mut results = BTreeMap::new();
        {
            let mut engine = self.engine.lock()?;
            let mut iter = engine.scan_prefix(prefix);
            while let Some((key, value)) = iter.next().transpose()? {
                results.insert(key, value);
            }
        }
        for (key, value) in self.writes.range(prefix_range(prefix)) {
            match value {
                Some(value) => results.insert(key.clone(), value.clone()),
                None => results.remove(key),
            };
        }
        self.ensure_snapshot()?;

        Ok(results
            .into_iter()
            .map(|(key, value)| ScanResult { key, value })
            .collect())
    }

    /// Returns the greatest visible key with prefix, if any.
    pub fn last_with_prefix(&self, prefix: &[u8]) -> Result<Option<ScanResult>> {
        self.ensure_active()?;
        let base = {
            let mut engine = self.engine.lock()?;
            let mut iter = engine.scan_prefix(prefix).rev();
            let mut found = None;
            while let Some((key, value)) = iter.next().transpose()? {
                match self.writes.get(&key) {
                    Some(None) => continue,
                    Some(Some(buffered)) => found = Some((key, buffered.clone())),
                    None => found = Some((key, value)),
                }
                break;
            }
            found
        };
        self.ensure_snapshot()?;
        let buffered = self
            .writes
            .range(prefix_range(prefix))
            .rev()
            .find_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())));

        let last = match (base, buffered) {
            (Some(b), Some(w)) => Some(if b.0 >= w.0 { b } else { w }),
            (b, w) => b.or(w),
        };
        Ok(last.map(|(key, value)| ScanResult { key, value }))
    }
}

impl<E: Engine> Drop for Transaction<E> {
    fn drop(&mut self) {
        if self.state == TransactionState::Active && self.active.is_some() {
            debug!("rollback abandoned transaction {}", self.id);
            self.writes.clear();
            self.state = TransactionState::Aborted;
            self.release();
        }
    }
}
