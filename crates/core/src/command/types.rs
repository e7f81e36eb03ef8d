//! Codec and stream-type vocabulary for the command builder.

use serde::{Deserialize, Serialize};

/// Classification of a media track for the purpose of naming command flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    Video,
    Audio,
}

impl StreamType {
    /// Flags are always serialized video first, then audio.
    pub const ORDERED: [StreamType; 2] = [StreamType::Video, StreamType::Audio];

    /// Returns the codec selection flag for this stream type.
    pub fn codec_flag(&self) -> &'static str {
        match self {
            Self::Video => "-c:v",
            Self::Audio => "-c:a",
        }
    }

    /// Returns the bitrate flag for this stream type.
    pub fn bitrate_flag(&self) -> &'static str {
        match self {
            Self::Video => "-b:v",
            Self::Audio => "-b:a",
        }
    }

    /// Returns the flag that drops this stream type from the output.
    pub fn skip_flag(&self) -> &'static str {
        match self {
            Self::Video => "-vn",
            Self::Audio => "-an",
        }
    }
}

/// Grouping of codec identifiers that share a preset-name vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecFamily {
    /// x264/x265-style software encoders.
    Software,
    /// NVIDIA NVENC.
    Nvenc,
    /// Intel Quick Sync.
    Qsv,
    /// AMD AMF.
    Amf,
    /// Stream copy, no encoder runs.
    Passthrough,
    /// Anything without a known preset vocabulary.
    Unknown,
}

impl CodecFamily {
    /// Classifies an ffmpeg encoder name.
    pub fn of(codec: &str) -> Self {
        match codec {
            "copy" => Self::Passthrough,
            "libx264" | "libx265" | "libx264rgb" => Self::Software,
            c if c.ends_with("_nvenc") => Self::Nvenc,
            c if c.ends_with("_qsv") => Self::Qsv,
            c if c.ends_with("_amf") => Self::Amf,
            _ => Self::Unknown,
        }
    }
}

/// Video encoder selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    /// H.264 / AVC (libx264)
    H264,
    /// H.265 / HEVC (libx265)
    H265,
    /// VP9
    Vp9,
    /// AV1
    Av1,
    /// NVIDIA NVENC H.264
    H264Nvenc,
    /// NVIDIA NVENC H.265/HEVC
    HevcNvenc,
    /// NVIDIA NVENC AV1
    Av1Nvenc,
    /// Intel Quick Sync H.264
    H264Qsv,
    /// Intel Quick Sync H.265/HEVC
    HevcQsv,
    /// AMD AMF H.264
    H264Amf,
    /// AMD AMF H.265/HEVC
    HevcAmf,
    /// VA-API H.264 (Linux)
    H264Vaapi,
    /// VA-API H.265/HEVC (Linux)
    HevcVaapi,
    /// Copy (no re-encoding)
    Copy,
    /// Any other encoder, passed through verbatim.
    Other(String),
}

impl VideoCodec {
    /// Returns the ffmpeg codec name for this encoder.
    pub fn ffmpeg_codec(&self) -> &str {
        match self {
            Self::H264 => "libx264",
            Self::H265 => "libx265",
            Self::Vp9 => "libvpx-vp9",
            Self::Av1 => "libaom-av1",
            Self::H264Nvenc => "h264_nvenc",
            Self::HevcNvenc => "hevc_nvenc",
            Self::Av1Nvenc => "av1_nvenc",
            Self::H264Qsv => "h264_qsv",
            Self::HevcQsv => "hevc_qsv",
            Self::H264Amf => "h264_amf",
            Self::HevcAmf => "hevc_amf",
            Self::H264Vaapi => "h264_vaapi",
            Self::HevcVaapi => "hevc_vaapi",
            Self::Copy => "copy",
            Self::Other(name) => name,
        }
    }

    /// Returns the preset family of this encoder.
    pub fn family(&self) -> CodecFamily {
        CodecFamily::of(self.ffmpeg_codec())
    }

    /// Whether this encoder runs on dedicated hardware.
    pub fn is_hardware(&self) -> bool {
        matches!(
            self,
            Self::H264Nvenc
                | Self::HevcNvenc
                | Self::Av1Nvenc
                | Self::H264Qsv
                | Self::HevcQsv
                | Self::H264Amf
                | Self::HevcAmf
                | Self::H264Vaapi
                | Self::HevcVaapi
        )
    }
}

/// Audio encoder selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCodec {
    /// Advanced Audio Coding
    Aac,
    /// MPEG Audio Layer III
    Mp3,
    /// Opus
    Opus,
    /// Ogg Vorbis
    Vorbis,
    /// Free Lossless Audio Codec
    Flac,
    /// Apple Lossless
    Alac,
    /// Uncompressed 16-bit PCM
    Pcm,
    /// Copy (no re-encoding)
    Copy,
    /// Any other encoder, passed through verbatim.
    Other(String),
}

impl AudioCodec {
    /// Returns the ffmpeg codec name for this encoder.
    pub fn ffmpeg_codec(&self) -> &str {
        match self {
            Self::Aac => "aac",
            Self::Mp3 => "libmp3lame",
            Self::Opus => "libopus",
            Self::Vorbis => "libvorbis",
            Self::Flac => "flac",
            Self::Alac => "alac",
            Self::Pcm => "pcm_s16le",
            Self::Copy => "copy",
            Self::Other(name) => name,
        }
    }

    /// Whether this format is lossless.
    pub fn is_lossless(&self) -> bool {
        matches!(self, Self::Flac | Self::Pcm | Self::Alac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_flags() {
        assert_eq!(StreamType::Video.codec_flag(), "-c:v");
        assert_eq!(StreamType::Audio.bitrate_flag(), "-b:a");
        assert_eq!(StreamType::Video.skip_flag(), "-vn");
        assert_eq!(StreamType::Audio.skip_flag(), "-an");
    }

    #[test]
    fn test_codec_family_classification() {
        assert_eq!(VideoCodec::H264.family(), CodecFamily::Software);
        assert_eq!(VideoCodec::H265.family(), CodecFamily::Software);
        assert_eq!(VideoCodec::HevcNvenc.family(), CodecFamily::Nvenc);
        assert_eq!(VideoCodec::H264Qsv.family(), CodecFamily::Qsv);
        assert_eq!(VideoCodec::HevcAmf.family(), CodecFamily::Amf);
        assert_eq!(VideoCodec::Copy.family(), CodecFamily::Passthrough);
        assert_eq!(VideoCodec::Vp9.family(), CodecFamily::Unknown);
        assert_eq!(
            VideoCodec::Other("av1_nvenc".to_string()).family(),
            CodecFamily::Nvenc
        );
    }

    #[test]
    fn test_hardware_detection() {
        assert!(VideoCodec::H264Vaapi.is_hardware());
        assert!(!VideoCodec::Av1.is_hardware());
        assert!(AudioCodec::Flac.is_lossless());
        assert!(!AudioCodec::Opus.is_lossless());
    }
}
