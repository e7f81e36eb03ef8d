//! Progress parsing for the transcoder's machine-readable status output.
//!
//! With `-progress pipe:2` the tool periodically writes a block of
//! `key=value` lines to its error stream, terminated by a `progress=`
//! sentinel line. [`ProgressParser`] turns that line sequence into
//! [`ProgressSample`]s.

mod parser;
mod types;

pub use parser::{parse_ffmpeg_time, ProgressParser, SENTINEL_KEY};
pub use types::ProgressSample;
