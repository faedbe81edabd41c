//! In-memory store and queue doubles for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use ingest_common::{IngestError, IngestResult, Tile};
use ingest_storage::{DataStore, JobPublisher, MetadataStore};

/// In-memory tile blob store. Set `poisoned` to simulate an outage.
#[derive(Default)]
pub struct MemoryDataStore {
    tiles: Mutex<Vec<Tile>>,
    poisoned: AtomicBool,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poison(&self) {
        self.poisoned.store(true, Ordering::SeqCst);
    }

    pub fn tiles(&self) -> Vec<Tile> {
        self.tiles.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.tiles.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn health_check(&self) -> IngestResult<()> {
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(IngestError::connection("data store", "poisoned"));
        }
        Ok(())
    }

    async fn save_batch(&self, tiles: &[Tile]) -> IngestResult<()> {
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(IngestError::connection("data store", "poisoned"));
        }
        self.tiles.lock().unwrap().extend_from_slice(tiles);
        Ok(())
    }
}

/// In-memory tile metadata store.
#[derive(Default)]
pub struct MemoryMetadataStore {
    tiles: Mutex<Vec<Tile>>,
    poisoned: AtomicBool,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poison(&self) {
        self.poisoned.store(true, Ordering::SeqCst);
    }

    pub fn summaries(&self) -> Vec<Tile> {
        self.tiles.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.tiles.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn health_check(&self) -> IngestResult<()> {
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(IngestError::connection("metadata store", "poisoned"));
        }
        Ok(())
    }

    async fn save_batch(&self, tiles: &[Tile]) -> IngestResult<()> {
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(IngestError::connection("metadata store", "poisoned"));
        }
        self.tiles.lock().unwrap().extend_from_slice(tiles);
        Ok(())
    }
}

/// In-memory job publisher capturing published messages.
#[derive(Default)]
pub struct MemoryPublisher {
    messages: Mutex<Vec<(Vec<u8>, u8)>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Published `(body, priority)` pairs in publish order.
    pub fn messages(&self) -> Vec<(Vec<u8>, u8)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobPublisher for MemoryPublisher {
    async fn publish(&self, body: &[u8], priority: u8) -> IngestResult<String> {
        let mut messages = self.messages.lock().unwrap();
        messages.push((body.to_vec(), priority));
        Ok(format!("mem-{}", messages.len()))
    }
}
