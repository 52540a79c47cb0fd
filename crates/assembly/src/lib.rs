//! Chunked upload assembly for Reel.
//!
//! Chunks arrive independently and in any order. The registry counts them;
//! the caller whose chunk completes the set wins a compare-and-swap into
//! `Merging` and runs the merge, which stages the concatenated bytes,
//! publishes them by rename and reclaims the chunks.

pub mod error;
pub mod merge;
pub mod reader;
pub mod service;

pub use error::{UploadError, UploadResult};
pub use merge::MergeEngine;
pub use reader::{ArtifactReader, ArtifactStream, ByteRange};
pub use service::{ChunkSubmission, SubmitOutcome, UploadLimits, UploadService};
