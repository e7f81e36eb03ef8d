//! Probe-tool invocation and output parsing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::CommandError;

/// Arguments used when no explicit probe arguments are given.
const DEFAULT_PROBE_ARGS: &[&str] = &[
    "-v",
    "quiet",
    "-print_format",
    "json",
    "-show_format",
    "-show_streams",
];

/// Builder for `<probe-binary> [args] -i <input>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCommand {
    args: Vec<String>,
    input: PathBuf,
}

impl ProbeCommand {
    /// Creates a probe of `input` with JSON format/stream output.
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            args: DEFAULT_PROBE_ARGS.iter().map(|a| a.to_string()).collect(),
            input: input.into(),
        }
    }

    /// Replaces the probe arguments.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Serializes the probe invocation, binary first.
    pub fn build(&self, binary: &Path) -> Result<Vec<String>, CommandError> {
        if binary.as_os_str().is_empty() {
            return Err(CommandError::MissingBinary);
        }
        if self.input.as_os_str().is_empty() {
            return Err(CommandError::MissingInput);
        }
        let mut argv = vec![binary.to_string_lossy().to_string()];
        argv.extend(self.args.iter().cloned());
        argv.push("-i".to_string());
        argv.push(self.input.to_string_lossy().to_string());
        Ok(argv)
    }
}

/// Media information reported by the probe tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub duration_secs: f64,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_fps: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_bitrate_kbps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_channels: Option<u8>,
}

/// Parses probe JSON output into [`MediaInfo`].
pub fn parse_probe_output(path: &Path, output: &str) -> Result<MediaInfo, serde_json::Error> {
    #[derive(Deserialize)]
    struct ProbeOutput {
        format: ProbeFormat,
        #[serde(default)]
        streams: Vec<ProbeStream>,
    }

    #[derive(Deserialize)]
    struct ProbeFormat {
        format_name: String,
        duration: Option<String>,
        size: Option<String>,
    }

    #[derive(Deserialize)]
    struct ProbeStream {
        codec_type: String,
        codec_name: Option<String>,
        bit_rate: Option<String>,
        sample_rate: Option<String>,
        channels: Option<u8>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
    }

    let probe: ProbeOutput = serde_json::from_str(output)?;

    let video = probe.streams.iter().find(|s| s.codec_type == "video");
    let audio = probe.streams.iter().find(|s| s.codec_type == "audio");

    Ok(MediaInfo {
        path: path.to_path_buf(),
        size_bytes: probe
            .format
            .size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        duration_secs: probe
            .format
            .duration
            .as_deref()
            .and_then(|d| d.parse().ok())
            .unwrap_or(0.0),
        format: probe
            .format
            .format_name
            .split(',')
            .next()
            .unwrap_or("unknown")
            .to_string(),
        video_codec: video.and_then(|s| s.codec_name.clone()),
        video_width: video.and_then(|s| s.width),
        video_height: video.and_then(|s| s.height),
        video_fps: video
            .and_then(|s| s.r_frame_rate.as_deref())
            .and_then(parse_frame_rate),
        audio_codec: audio.and_then(|s| s.codec_name.clone()),
        audio_bitrate_kbps: audio
            .and_then(|s| s.bit_rate.as_deref())
            .and_then(|b| b.parse::<u32>().ok())
            .map(|b| b / 1000),
        audio_sample_rate: audio
            .and_then(|s| s.sample_rate.as_deref())
            .and_then(|r| r.parse().ok()),
        audio_channels: audio.and_then(|s| s.channels),
    })
}

/// Parses `24000/1001` or `30` style frame rates.
fn parse_frame_rate(rate: &str) -> Option<f32> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num = num.parse::<f32>().ok()?;
            let den = den.parse::<f32>().ok()?;
            (den > 0.0).then(|| num / den)
        }
        None => rate.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_command_default_args() {
        let argv = ProbeCommand::new("/media/a.mkv")
            .build(Path::new("ffprobe"))
            .unwrap();
        assert_eq!(argv.first().map(String::as_str), Some("ffprobe"));
        assert_eq!(&argv[argv.len() - 2..], ["-i", "/media/a.mkv"]);
        assert!(argv.contains(&"-show_streams".to_string()));
    }

    #[test]
    fn test_probe_command_custom_args() {
        let argv = ProbeCommand::new("/a.wav")
            .with_args(["-hide_banner"])
            .build(Path::new("ffprobe"))
            .unwrap();
        assert_eq!(argv, vec!["ffprobe", "-hide_banner", "-i", "/a.wav"]);
    }

    #[test]
    fn test_parse_probe_output_video() {
        let json = r#"{
            "format": {
                "filename": "test.mkv",
                "format_name": "matroska,webm",
                "duration": "7200.0",
                "size": "5000000000"
            },
            "streams": [
                {
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1920,
                    "height": 1080,
                    "r_frame_rate": "24000/1001"
                },
                {
                    "codec_type": "audio",
                    "codec_name": "aac",
                    "bit_rate": "192000",
                    "sample_rate": "48000",
                    "channels": 6
                }
            ]
        }"#;

        let info = parse_probe_output(Path::new("test.mkv"), json).unwrap();
        assert_eq!(info.format, "matroska");
        assert!((info.duration_secs - 7200.0).abs() < 0.01);
        assert_eq!(info.video_codec.as_deref(), Some("h264"));
        assert_eq!(info.video_height, Some(1080));
        let fps = info.video_fps.unwrap();
        assert!((fps - 23.976).abs() < 0.01);
        assert_eq!(info.audio_bitrate_kbps, Some(192));
        assert_eq!(info.audio_channels, Some(6));
    }

    #[test]
    fn test_parse_probe_output_missing_duration() {
        let json = r#"{"format": {"format_name": "image2"}, "streams": []}"#;
        let info = parse_probe_output(Path::new("a.png"), json).unwrap();
        assert_eq!(info.duration_secs, 0.0);
        assert_eq!(info.video_codec, None);
    }

    #[test]
    fn test_parse_probe_output_garbage() {
        assert!(parse_probe_output(Path::new("x"), "not json").is_err());
    }
}
