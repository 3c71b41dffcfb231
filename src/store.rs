use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{GazeError, Result, collector::Sample, features::InputSchema};

/// An opaque key-value store, every `put` replaces the whole value at once.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn put(&self, key: &str, value: Value) -> Result<()>;

    /// Returns the value at `key` or `None` if it was never written.
    async fn get(&self, key: &str) -> Result<Option<Value>>;
}

/// A `KvStore` that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn put(&self, key: &str, value: Value) -> Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().get(key).cloned())
    }
}

/// A `KvStore` keeping one JSON file per key.
///
/// Values are written to a temporary file first and renamed over the previous one, so readers
/// never observe a partial write.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl KvStore for DirectoryStore {
    async fn put(&self, key: &str, value: Value) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(&value)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// One partition of a round: parallel arrays of inputs and targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub schema: InputSchema,
    pub inputs: Vec<Vec<f32>>,
    pub targets: Vec<[f32; 2]>,
}

impl RoundRecord {
    pub fn new(schema: InputSchema, samples: &[Sample]) -> Self {
        Self {
            schema,
            inputs: samples.iter().map(|s| s.input.clone()).collect(),
            targets: samples.iter().map(|s| s.target).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Zips the parallel arrays back into samples.
    ///
    /// # Errors
    /// `SchemaMismatch` if the arrays don't have the same length.
    pub fn into_samples(self) -> Result<Vec<Sample>> {
        if self.inputs.len() != self.targets.len() {
            return Err(GazeError::SchemaMismatch {
                expected: self.targets.len(),
                got: self.inputs.len(),
            });
        }

        let samples = self
            .inputs
            .into_iter()
            .zip(self.targets)
            .map(|(input, target)| Sample { input, target })
            .collect();

        Ok(samples)
    }
}

/// Both partitions of a stored round.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRound {
    pub index: u64,
    pub train: RoundRecord,
    pub val: RoundRecord,
}

/// Persists closed rounds under `{prefix}-r{index}` and `{prefix}-r{index}-val`.
#[derive(Clone)]
pub struct RoundStore {
    kv: Arc<dyn KvStore>,
    prefix: String,
}

impl RoundStore {
    pub fn new(kv: Arc<dyn KvStore>, prefix: impl Into<String>) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
        }
    }

    pub fn train_key(&self, index: u64) -> String {
        format!("{}-r{index}", self.prefix)
    }

    pub fn val_key(&self, index: u64) -> String {
        format!("{}-r{index}-val", self.prefix)
    }

    /// Writes both partitions of round `index`.
    ///
    /// # Arguments
    /// * `index` - The round index.
    /// * `schema` - The input schema every sample was captured with.
    /// * `train` - The train partition.
    /// * `val` - The validation partition.
    pub async fn flush(
        &self,
        index: u64,
        schema: InputSchema,
        train: &[Sample],
        val: &[Sample],
    ) -> Result<()> {
        let train_record = serde_json::to_value(RoundRecord::new(schema, train))?;
        let val_record = serde_json::to_value(RoundRecord::new(schema, val))?;

        self.kv.put(&self.train_key(index), train_record).await?;
        self.kv.put(&self.val_key(index), val_record).await?;

        info!(
            "flushed round {index}: {} train, {} validation samples",
            train.len(),
            val.len()
        );
        Ok(())
    }

    /// Reads both partitions of round `index`.
    ///
    /// # Returns
    /// The round or `None` if any of its partitions wasn't flushed yet.
    pub async fn load(&self, index: u64) -> Result<Option<StoredRound>> {
        let Some(train) = self.kv.get(&self.train_key(index)).await? else {
            return Ok(None);
        };
        let Some(val) = self.kv.get(&self.val_key(index)).await? else {
            return Ok(None);
        };

        Ok(Some(StoredRound {
            index,
            train: serde_json::from_value(train)?,
            val: serde_json::from_value(val)?,
        }))
    }

    /// Like `load`, but a missing round is a `RoundNotFound` error.
    pub async fn require(&self, index: u64) -> Result<StoredRound> {
        match self.load(index).await? {
            Some(round) => Ok(round),
            None => {
                let key = self.train_key(index);
                debug!("round {index} isn't available yet");
                Err(GazeError::RoundNotFound { key })
            }
        }
    }
}
