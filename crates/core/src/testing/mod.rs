//! Testing utilities and mock implementations.
//!
//! Lets the transcode and install paths be exercised without real binaries
//! or network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use clipforge_core::testing::{zip_archive, MockTranscoder, ScriptedSource};
//!
//! let transcoder = MockTranscoder::new();
//! let package = zip_archive(&[("bin/", ""), ("bin/ffmpeg", "#!/bin/sh\n")])?;
//! let source = ScriptedSource::from_bytes(&package, 1024);
//! ```

mod mock_transcoder;
mod scripted_source;

pub use mock_transcoder::{MockTranscoder, RecordedTranscode};
pub use scripted_source::{corrupt_zip_archive, zip_archive, ScriptedSource};
