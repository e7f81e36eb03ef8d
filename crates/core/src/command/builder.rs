//! Transcode command builder.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::CommandError;
use super::fragment::{CommandContext, Filter, Fragment};
use super::preset::PresetTier;
use super::types::{AudioCodec, StreamType, VideoCodec};

/// Per-stream-type selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Encoder name (`libx264`, `aac`, `copy`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    /// Target bitrate (`2500k`, `192k`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<String>,
    /// Drop this stream type from the output.
    #[serde(default)]
    pub skip: bool,
}

/// A transcoder invocation assembled from independent pieces.
///
/// Pieces may be set in any order; [`TranscodeCommand::build`] always emits
/// them in the order the tool's grammar requires:
///
/// ```text
/// <binary> [global-opts] (-i <input>)+ [-filter_complex <graph>]
///     [-c:v <codec>] [-b:v <rate>] [-preset <value>] [-c:a <codec>] [-b:a <rate>]
///     [-vn|-an] [output-opts] <output>
/// ```
///
/// A stream type never carries both a codec and a skip flag: whichever was
/// requested last wins.
///
/// # Example
///
/// ```
/// use clipforge_core::command::{PresetTier, TranscodeCommand, VideoCodec};
/// use std::path::Path;
///
/// let argv = TranscodeCommand::new()
///     .input("/in.mkv")
///     .video_codec(VideoCodec::H264)
///     .preset(PresetTier::Fast)
///     .output("/out.mp4")
///     .build(Path::new("ffmpeg"))
///     .unwrap();
///
/// assert_eq!(
///     argv,
///     ["ffmpeg", "-i", "/in.mkv", "-c:v", "libx264", "-preset", "fast", "/out.mp4"]
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeCommand {
    #[serde(default)]
    global_options: Vec<(String, Option<String>)>,
    #[serde(default)]
    inputs: Vec<PathBuf>,
    #[serde(default)]
    filters: Vec<Filter>,
    #[serde(default)]
    video: StreamSettings,
    #[serde(default)]
    audio: StreamSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    preset: Option<PresetTier>,
    #[serde(default)]
    output_options: Vec<(String, Option<String>)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output: Option<PathBuf>,
}

impl TranscodeCommand {
    /// Creates an empty command.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an option placed before the inputs.
    pub fn global_option(mut self, flag: impl Into<String>, value: Option<String>) -> Self {
        self.global_options.push((flag.into(), value));
        self
    }

    /// Overwrites the output without asking.
    pub fn overwrite(self) -> Self {
        self.global_option("-y", None)
    }

    /// Makes the tool report machine-readable progress blocks on its error stream.
    pub fn with_progress(self) -> Self {
        self.global_option("-progress", Some("pipe:2".to_string()))
            .global_option("-nostats", None)
    }

    /// Appends an input file.
    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    /// Appends a filter to the filter graph.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Selects an encoder for a stream type, clearing any skip request for it.
    pub fn codec(mut self, stream: StreamType, codec: impl Into<String>) -> Self {
        let settings = self.settings_mut(stream);
        settings.codec = Some(codec.into());
        settings.skip = false;
        self
    }

    /// Selects the video encoder.
    pub fn video_codec(self, codec: VideoCodec) -> Self {
        let name = codec.ffmpeg_codec().to_string();
        self.codec(StreamType::Video, name)
    }

    /// Selects the audio encoder.
    pub fn audio_codec(self, codec: AudioCodec) -> Self {
        let name = codec.ffmpeg_codec().to_string();
        self.codec(StreamType::Audio, name)
    }

    /// Sets the target bitrate for a stream type.
    pub fn bitrate(mut self, stream: StreamType, rate: impl Into<String>) -> Self {
        self.settings_mut(stream).bitrate = Some(rate.into());
        self
    }

    /// Requests a speed tier. Only emitted when the video encoder maps it.
    pub fn preset(mut self, tier: PresetTier) -> Self {
        self.preset = Some(tier);
        self
    }

    /// Drops a stream type from the output, clearing its codec and bitrate.
    pub fn skip(mut self, stream: StreamType) -> Self {
        let settings = self.settings_mut(stream);
        settings.codec = None;
        settings.bitrate = None;
        settings.skip = true;
        self
    }

    /// Adds an option placed just before the output path (`-map`, `-movflags`, ...).
    pub fn output_option(mut self, flag: impl Into<String>, value: Option<String>) -> Self {
        self.output_options.push((flag.into(), value));
        self
    }

    /// Sets the output path.
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Returns the input files in order.
    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    /// Returns the output path, if set.
    pub fn output_path(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    /// Returns the selection for a stream type.
    pub fn stream(&self, stream: StreamType) -> &StreamSettings {
        match stream {
            StreamType::Video => &self.video,
            StreamType::Audio => &self.audio,
        }
    }

    fn settings_mut(&mut self, stream: StreamType) -> &mut StreamSettings {
        match stream {
            StreamType::Video => &mut self.video,
            StreamType::Audio => &mut self.audio,
        }
    }

    /// Context handed to every fragment while rendering.
    pub fn context(&self) -> CommandContext {
        CommandContext {
            video_family: self
                .video
                .codec
                .as_deref()
                .map(super::types::CodecFamily::of),
        }
    }

    /// Lists the fragments of this command in serialization order.
    pub fn fragments(&self) -> Result<Vec<Fragment>, CommandError> {
        let output = self.output.clone().ok_or(CommandError::MissingOutput)?;
        if self.inputs.is_empty() {
            return Err(CommandError::MissingInput);
        }

        let mut fragments = Vec::new();

        fragments.extend(self.global_options.iter().map(|(flag, value)| {
            Fragment::GlobalOption {
                flag: flag.clone(),
                value: value.clone(),
            }
        }));

        fragments.extend(self.inputs.iter().cloned().map(Fragment::Input));

        if !self.filters.is_empty() {
            fragments.push(Fragment::FilterGraph(self.filters.clone()));
        }

        for stream in StreamType::ORDERED {
            let settings = self.stream(stream);
            if settings.skip {
                continue;
            }
            if let Some(codec) = &settings.codec {
                fragments.push(Fragment::Codec {
                    stream,
                    codec: codec.clone(),
                });
            }
            if let Some(rate) = &settings.bitrate {
                fragments.push(Fragment::Bitrate {
                    stream,
                    rate: rate.clone(),
                });
            }
            if stream == StreamType::Video && settings.codec.is_some() {
                if let Some(tier) = self.preset {
                    fragments.push(Fragment::Preset(tier));
                }
            }
        }

        for stream in StreamType::ORDERED {
            if self.stream(stream).skip {
                fragments.push(Fragment::Skip(stream));
            }
        }

        fragments.extend(self.output_options.iter().map(|(flag, value)| {
            Fragment::GlobalOption {
                flag: flag.clone(),
                value: value.clone(),
            }
        }));

        fragments.push(Fragment::Output(output));

        Ok(fragments)
    }

    /// Serializes the command into an argument vector, binary first.
    pub fn build(&self, binary: &Path) -> Result<Vec<String>, CommandError> {
        if binary.as_os_str().is_empty() {
            return Err(CommandError::MissingBinary);
        }
        let ctx = self.context();
        let mut argv = vec![binary.to_string_lossy().to_string()];
        for fragment in self.fragments()? {
            argv.extend(fragment.render(&ctx));
        }
        Ok(argv)
    }
}
