//! Line-oriented progress block parser.

use std::collections::HashMap;
use std::time::Duration;

use regex_lite::Regex;
use tracing::trace;

use super::types::ProgressSample;

/// Key whose line terminates one progress block (`continue` or `end`).
pub const SENTINEL_KEY: &str = "progress";

const SENTINEL_END: &str = "end";

/// Placeholder the tool writes for values it does not know yet.
const NOT_AVAILABLE: &str = "N/A";

/// Accumulates `key=value` lines into blocks and emits one sample per block.
///
/// Lines that are not `key=value` pairs are ignored, except the banner's
/// `Duration:` line, which supplies the total duration when none was given.
#[derive(Debug)]
pub struct ProgressParser {
    total_duration: Option<Duration>,
    block: HashMap<String, String>,
    remainder: String,
    last_elapsed: Duration,
    last_fraction: f64,
    duration_regex: Option<Regex>,
}

impl ProgressParser {
    /// Creates a parser; `total_duration` is the input's duration if known.
    pub fn new(total_duration: Option<Duration>) -> Self {
        Self {
            total_duration: total_duration.filter(|d| !d.is_zero()),
            block: HashMap::new(),
            remainder: String::new(),
            last_elapsed: Duration::ZERO,
            last_fraction: 0.0,
            duration_regex: Regex::new(r"Duration:\s*(\d+:\d{2}:\d{2}(?:\.\d+)?)").ok(),
        }
    }

    /// Sets (or replaces) the total input duration.
    pub fn set_total_duration(&mut self, total: Duration) {
        if !total.is_zero() {
            self.total_duration = Some(total);
        }
    }

    /// Total input duration, if known.
    pub fn total_duration(&self) -> Option<Duration> {
        self.total_duration
    }

    /// Consumes one complete line. Returns a sample when the line closed a block.
    pub fn feed_line(&mut self, line: &str) -> Option<ProgressSample> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let Some((key, value)) = line.split_once('=') else {
            self.learn_duration(line);
            return None;
        };

        let key = key.trim();
        if !is_progress_key(key) {
            return None;
        }
        let value = value.trim();

        if key == SENTINEL_KEY {
            return Some(self.close_block(value == SENTINEL_END));
        }

        // Last occurrence within a block wins.
        self.block.insert(key.to_string(), value.to_string());
        None
    }

    /// Consumes an arbitrary slice of the stream.
    ///
    /// A trailing partial line is kept and completed by the next chunk.
    pub fn feed_chunk(&mut self, chunk: &str) -> Vec<ProgressSample> {
        self.remainder.push_str(chunk);

        let Some(last_break) = self.remainder.rfind(['\n', '\r']) else {
            return Vec::new();
        };

        let complete: String = self.remainder.drain(..=last_break).collect();
        complete
            .split(['\n', '\r'])
            .filter_map(|line| self.feed_line(line))
            .collect()
    }

    /// Flushes a pending partial line at end of stream.
    pub fn finish(&mut self) -> Option<ProgressSample> {
        let rest = std::mem::take(&mut self.remainder);
        self.feed_line(&rest)
    }

    /// Clears all per-run state, keeping the total duration.
    pub fn reset(&mut self) {
        self.block.clear();
        self.remainder.clear();
        self.last_elapsed = Duration::ZERO;
        self.last_fraction = 0.0;
    }

    fn learn_duration(&mut self, line: &str) {
        if self.total_duration.is_some() {
            return;
        }
        let Some(re) = &self.duration_regex else {
            return;
        };
        if let Some(total) = re
            .captures(line)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_ffmpeg_time(m.as_str()))
        {
            trace!("Learned total duration {:?} from banner", total);
            self.set_total_duration(total);
        }
    }

    fn close_block(&mut self, finished: bool) -> ProgressSample {
        let block = std::mem::take(&mut self.block);
        let field = |key: &str| {
            block
                .get(key)
                .map(String::as_str)
                .filter(|v| *v != NOT_AVAILABLE)
        };

        let elapsed = field("out_time_us")
            .and_then(parse_micros)
            .or_else(|| field("out_time_ms").and_then(parse_micros))
            .or_else(|| field("out_time").and_then(parse_ffmpeg_time))
            .unwrap_or(self.last_elapsed);
        self.last_elapsed = elapsed;

        let fraction = self.total_duration.filter(|t| !t.is_zero()).map(|total| {
            let raw = if finished {
                1.0
            } else {
                (elapsed.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0)
            };
            self.last_fraction = self.last_fraction.max(raw);
            self.last_fraction
        });

        ProgressSample {
            elapsed,
            fraction,
            frame: field("frame").and_then(|v| v.parse().ok()),
            fps: field("fps").and_then(|v| v.parse().ok()),
            bitrate_kbps: field("bitrate").and_then(parse_bitrate),
            total_size: field("total_size").and_then(|v| v.parse().ok()),
            speed: field("speed").and_then(parse_speed),
            finished,
        }
    }
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self::new(None)
    }
}

fn is_progress_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// Microsecond counts; negative values (seen before the first frame) read as zero.
fn parse_micros(value: &str) -> Option<Duration> {
    let micros: i64 = value.parse().ok()?;
    Some(Duration::from_micros(micros.max(0) as u64))
}

/// `"1234.5kbits/s"` to kbit/s.
fn parse_bitrate(value: &str) -> Option<f64> {
    value.trim_end_matches("kbits/s").trim().parse().ok()
}

/// `"1.5x"` to 1.5.
fn parse_speed(value: &str) -> Option<f64> {
    value.trim_end_matches('x').trim().parse().ok()
}

/// Parses a tool timestamp: `HH:MM:SS[.frac]`, `MM:SS[.frac]` or plain seconds.
///
/// Negative timestamps return `None`.
pub fn parse_ffmpeg_time(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() || value.starts_with('-') {
        return None;
    }

    let mut secs = 0.0_f64;
    let mut parts = 0;
    for part in value.split(':') {
        parts += 1;
        if parts > 3 {
            return None;
        }
        let n: f64 = part.parse().ok()?;
        if !n.is_finite() || n < 0.0 {
            return None;
        }
        secs = secs * 60.0 + n;
    }

    // Out-of-range values are malformed input, not a reason to panic.
    Duration::try_from_secs_f64(secs).ok()
}
