//! Weft Core
//!
//! The thread service core: per-log append semantics and head tracking,
//! the encrypted hash-linked event codec, thread/log metadata persistence,
//! and the local half of the service facade. Networking lives in weft-net;
//! this crate never opens a socket.

pub mod block_store;
pub mod codec;
pub mod data_dir;
pub mod error;
pub mod log_manager;
pub mod service;
pub mod thread_store;

pub use block_store::{BlockStore, MemBlockStore, RedbBlockStore};
pub use codec::{Block, Invite, ParsedRecord, RecordBundle};
pub use data_dir::DataDir;
pub use error::Error;
pub use log_manager::LogManager;
pub use service::{
    AddSettings, PullSettings, PutSettings, ServerBackend, ThreadService, DEFAULT_PULL_LIMIT,
};
pub use thread_store::{MemThreadStore, RedbThreadStore, ThreadStore};
