//! # NoteMirror Testkit
//!
//! Test utilities for NoteMirror.
//!
//! This crate provides:
//! - Temporary archive directories with inspection helpers
//! - Sample account content (notes with matching bodies and digests)
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use notemirror_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_archive() {
//!     let archive = TestArchive::new();
//!     let account = SampleAccount::new().note("n1", "<en-note/>");
//!     // ... run a sync into archive.root()
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
