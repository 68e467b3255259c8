//! File-based cache of imported data sets.
//!
//! An import of a set of local source files is stored once as an artifact,
//! keyed by a fingerprint of the files' absolute paths and modification
//! times. The cache is never the source of truth: any entry that is missing,
//! corrupt, written by another format version, or recorded against different
//! modification times is simply a miss, and deleting the whole directory only
//! costs a re-import.
//!
//! # Write-back
//! Writers take an advisory lock on `<key>.lock`, stage the artifact under a
//! temporary name, and publish with renames (metadata last). Readers never
//! take the lock; they can only observe a complete entry or no entry.

pub mod error;
mod key;
mod lock;
mod maintenance;
mod manager;
mod metadata;
mod write;

pub use crate::key::{CacheKey, KEY_LEN};
pub use crate::maintenance::{CacheEntry, CacheStats, Report, Warning, format_size};
pub use crate::manager::{CacheManager, DEFAULT_LOCK_TIMEOUT, Lookup, MissReason};
pub use crate::metadata::{CacheMetadata, FORMAT_VERSION};
pub use crate::write::PendingWrite;
