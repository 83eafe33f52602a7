//! # NoteMirror Protocol
//!
//! Record and message types exchanged with a remote note store.
//!
//! This crate provides:
//! - [`NoteRecord`], [`ResourceRef`], [`NotebookRecord`], [`TagRecord`]
//! - [`SyncState`] and [`SyncChunk`] for USN-based delta fetches
//! - [`SyncChunkFilter`] describing which entity kinds a chunk carries
//! - [`ContentHash`], the hex-encoded digest used for freshness checks
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod hash;
mod messages;
mod records;

pub use error::{ProtocolError, ProtocolResult};
pub use hash::ContentHash;
pub use messages::{ChunkRequest, NoteContent, SyncChunk, SyncChunkFilter, SyncState};
pub use records::{NoteRecord, NotebookRecord, ResourceData, ResourceRef, TagRecord};
