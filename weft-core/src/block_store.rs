//! Content-addressed block storage
//!
//! Append-only store keyed by BLAKE3 cid. The codec produces blocks; the
//! service persists them here before any head moves. Two implementations:
//! in-memory for tests and short-lived peers, redb for durable nodes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use redb::{Database, ReadableTable, TableDefinition};
use weft_model::{crypto, Cid};

use crate::error::Error;

const BLOCKS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("blocks");

/// Content-addressed storage for serialized blocks.
pub trait BlockStore: Send + Sync + 'static {
    /// Store a block, returning its cid.
    fn put(&self, data: Vec<u8>) -> Result<Cid, Error>;

    /// Fetch a block's bytes.
    fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>, Error>;

    /// Whether a block is present.
    fn has(&self, cid: &Cid) -> Result<bool, Error>;

    /// Remove a block. Removing an absent block is not an error.
    fn delete(&self, cid: &Cid) -> Result<(), Error>;
}

/// In-memory block store.
#[derive(Debug, Default)]
pub struct MemBlockStore {
    blocks: RwLock<HashMap<Cid, Vec<u8>>>,
}

impl MemBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for MemBlockStore {
    fn put(&self, data: Vec<u8>) -> Result<Cid, Error> {
        let cid = crypto::content_cid(&data);
        let mut blocks = self.blocks.write().unwrap_or_else(|e| e.into_inner());
        blocks.insert(cid, data);
        Ok(cid)
    }

    fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>, Error> {
        let blocks = self.blocks.read().unwrap_or_else(|e| e.into_inner());
        Ok(blocks.get(cid).cloned())
    }

    fn has(&self, cid: &Cid) -> Result<bool, Error> {
        let blocks = self.blocks.read().unwrap_or_else(|e| e.into_inner());
        Ok(blocks.contains_key(cid))
    }

    fn delete(&self, cid: &Cid) -> Result<(), Error> {
        let mut blocks = self.blocks.write().unwrap_or_else(|e| e.into_inner());
        blocks.remove(cid);
        Ok(())
    }
}

/// Durable block store backed by redb.
pub struct RedbBlockStore {
    db: Database,
}

impl RedbBlockStore {
    /// Open or create the block database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let db = Database::create(path)?;

        // Ensure the table exists
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(BLOCKS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }
}

impl BlockStore for RedbBlockStore {
    fn put(&self, data: Vec<u8>) -> Result<Cid, Error> {
        let cid = crypto::content_cid(&data);
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(BLOCKS_TABLE)?;
            table.insert(cid.as_ref(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(cid)
    }

    fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>, Error> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BLOCKS_TABLE)?;
        Ok(table.get(cid.as_ref())?.map(|v| v.value().to_vec()))
    }

    fn has(&self, cid: &Cid) -> Result<bool, Error> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BLOCKS_TABLE)?;
        Ok(table.get(cid.as_ref())?.is_some())
    }

    fn delete(&self, cid: &Cid) -> Result<(), Error> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(BLOCKS_TABLE)?;
            table.remove(cid.as_ref())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
