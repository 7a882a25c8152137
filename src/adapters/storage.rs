use crate::domain::ports::{KeyValueSession, KeyValueStore};
use crate::utils::error::{Result, ServoMaskError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredValue {
    Int(i32),
    Text(String),
}

fn type_mismatch(key: &str, expected: &str) -> ServoMaskError {
    ServoMaskError::StorageError {
        key: key.to_string(),
        message: format!("stored value is not {}", expected),
    }
}

fn as_i32(key: &str, value: Option<&StoredValue>) -> Result<Option<i32>> {
    match value {
        None => Ok(None),
        Some(StoredValue::Int(v)) => Ok(Some(*v)),
        Some(StoredValue::Text(_)) => Err(type_mismatch(key, "an integer")),
    }
}

fn as_string(key: &str, value: Option<&StoredValue>) -> Result<Option<String>> {
    match value {
        None => Ok(None),
        Some(StoredValue::Text(v)) => Ok(Some(v.clone())),
        Some(StoredValue::Int(_)) => Err(type_mismatch(key, "a string")),
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    values: HashMap<(String, String), StoredValue>,
    open_sessions: usize,
    fail_opens: bool,
    puts_before_failure: Option<usize>,
    put_count: usize,
}

/// Volatile store with write-through puts. Clones share the same contents,
/// which lets tests inspect what the engine persisted and inject faults.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_i32(&self, namespace: &str, key: &str, value: i32) {
        self.state().values.insert(
            (namespace.to_string(), key.to_string()),
            StoredValue::Int(value),
        );
    }

    pub fn insert_string(&self, namespace: &str, key: &str, value: &str) {
        self.state().values.insert(
            (namespace.to_string(), key.to_string()),
            StoredValue::Text(value.to_string()),
        );
    }

    pub fn get_i32(&self, namespace: &str, key: &str) -> Option<i32> {
        match self
            .state()
            .values
            .get(&(namespace.to_string(), key.to_string()))
        {
            Some(StoredValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_string(&self, namespace: &str, key: &str) -> Option<String> {
        match self
            .state()
            .values
            .get(&(namespace.to_string(), key.to_string()))
        {
            Some(StoredValue::Text(v)) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.state().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn open_sessions(&self) -> usize {
        self.state().open_sessions
    }

    /// Total successful puts since creation.
    pub fn put_count(&self) -> usize {
        self.state().put_count
    }

    pub fn fail_opens(&self, fail: bool) {
        self.state().fail_opens = fail;
    }

    /// Lets `count` more puts succeed, then fails every following put.
    pub fn fail_after_puts(&self, count: usize) {
        self.state().puts_before_failure = Some(count);
    }

    pub fn clear_faults(&self) {
        let mut state = self.state();
        state.fail_opens = false;
        state.puts_before_failure = None;
    }

    fn put(&self, namespace: &str, key: &str, value: StoredValue) -> Result<()> {
        let mut state = self.state();
        if let Some(remaining) = state.puts_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(ServoMaskError::StorageError {
                    key: key.to_string(),
                    message: "injected write fault".to_string(),
                });
            }
            *remaining -= 1;
        }
        state
            .values
            .insert((namespace.to_string(), key.to_string()), value);
        state.put_count += 1;
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    type Session = MemorySession;

    fn open(&self, namespace: &str, read_only: bool) -> Result<MemorySession> {
        let mut state = self.state();
        if state.fail_opens {
            return Err(ServoMaskError::StorageError {
                key: namespace.to_string(),
                message: "injected open fault".to_string(),
            });
        }
        state.open_sessions += 1;
        drop(state);

        Ok(MemorySession {
            store: self.clone(),
            namespace: namespace.to_string(),
            read_only,
        })
    }
}

pub struct MemorySession {
    store: MemoryStore,
    namespace: String,
    read_only: bool,
}

impl MemorySession {
    fn lookup(&self, key: &str) -> Option<StoredValue> {
        self.store
            .state()
            .values
            .get(&(self.namespace.clone(), key.to_string()))
            .cloned()
    }

    fn writable(&self) -> Result<()> {
        if self.read_only {
            return Err(ServoMaskError::ReadOnlySessionError {
                namespace: self.namespace.clone(),
            });
        }
        Ok(())
    }
}

impl KeyValueSession for MemorySession {
    fn get_i32(&self, key: &str) -> Result<Option<i32>> {
        as_i32(key, self.lookup(key).as_ref())
    }

    fn get_string(&self, key: &str) -> Result<Option<String>> {
        as_string(key, self.lookup(key).as_ref())
    }

    fn put_i32(&mut self, key: &str, value: i32) -> Result<()> {
        self.writable()?;
        self.store.put(&self.namespace, key, StoredValue::Int(value))
    }

    fn put_string(&mut self, key: &str, value: &str) -> Result<()> {
        self.writable()?;
        self.store
            .put(&self.namespace, key, StoredValue::Text(value.to_string()))
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        let mut state = self.store.state();
        state.open_sessions = state.open_sessions.saturating_sub(1);
    }
}

/// One JSON document per namespace under a base directory. Writes are
/// buffered in the session and land on disk in [`KeyValueSession::end`].
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn namespace_path(&self, namespace: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", namespace))
    }
}

impl KeyValueStore for FileStore {
    type Session = FileSession;

    fn open(&self, namespace: &str, read_only: bool) -> Result<FileSession> {
        let path = self.namespace_path(namespace);
        let values = match fs::read(&path) {
            Ok(data) => match serde_json::from_slice(&data) {
                Ok(values) => values,
                // A writer replaces the whole document on `end`.
                Err(e) if !read_only => {
                    tracing::warn!(
                        "Discarding corrupt namespace file {}: {}",
                        path.display(),
                        e
                    );
                    BTreeMap::new()
                }
                Err(e) => {
                    return Err(ServoMaskError::StorageError {
                        key: namespace.to_string(),
                        message: format!("corrupt namespace file {}: {}", path.display(), e),
                    })
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(FileSession {
            path,
            namespace: namespace.to_string(),
            values,
            read_only,
            dirty: false,
        })
    }
}

pub struct FileSession {
    path: PathBuf,
    namespace: String,
    values: BTreeMap<String, StoredValue>,
    read_only: bool,
    dirty: bool,
}

impl FileSession {
    fn put(&mut self, key: &str, value: StoredValue) -> Result<()> {
        if self.read_only {
            return Err(ServoMaskError::ReadOnlySessionError {
                namespace: self.namespace.clone(),
            });
        }
        self.values.insert(key.to_string(), value);
        self.dirty = true;
        Ok(())
    }
}

impl KeyValueSession for FileSession {
    fn get_i32(&self, key: &str) -> Result<Option<i32>> {
        as_i32(key, self.values.get(key))
    }

    fn get_string(&self, key: &str) -> Result<Option<String>> {
        as_string(key, self.values.get(key))
    }

    fn put_i32(&mut self, key: &str, value: i32) -> Result<()> {
        self.put(key, StoredValue::Int(value))
    }

    fn put_string(&mut self, key: &str, value: &str) -> Result<()> {
        self.put(key, StoredValue::Text(value.to_string()))
    }

    fn end(self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = serde_json::to_vec_pretty(&self.values)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, data)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
