//! Atomic command-line fragments.
//!
//! Each fragment renders to zero or more argv tokens given the context of
//! the command it belongs to. Fragments own no resources and never change
//! after construction.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::preset::{resolve_preset, PresetTier};
use super::types::{CodecFamily, StreamType};

/// Separator between filter chains inside one filter graph.
pub const FILTER_GRAPH_SEPARATOR: &str = ";";

/// One filter of a filter graph, with labeled input and output pads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Input pad labels, without brackets (e.g. `0:v`).
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Filter name (e.g. `scale`).
    pub name: String,
    /// Filter arguments, without the leading `=`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
    /// Output pad labels, without brackets.
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl Filter {
    /// Creates a filter with no pads and no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inputs: Vec::new(),
            name: name.into(),
            args: None,
            outputs: Vec::new(),
        }
    }

    /// Sets the filter arguments.
    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = Some(args.into());
        self
    }

    /// Adds an input pad label.
    pub fn input(mut self, label: impl Into<String>) -> Self {
        self.inputs.push(label.into());
        self
    }

    /// Adds an output pad label.
    pub fn output(mut self, label: impl Into<String>) -> Self {
        self.outputs.push(label.into());
        self
    }

    /// Serializes the filter as `[in]name=args[out]`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for label in &self.inputs {
            out.push('[');
            out.push_str(label);
            out.push(']');
        }
        out.push_str(&self.name);
        if let Some(args) = &self.args {
            out.push('=');
            out.push_str(args);
        }
        for label in &self.outputs {
            out.push('[');
            out.push_str(label);
            out.push(']');
        }
        out
    }
}

/// Joins filters into one filter-graph value.
pub fn render_filter_graph(filters: &[Filter]) -> Option<String> {
    if filters.is_empty() {
        return None;
    }
    Some(
        filters
            .iter()
            .map(Filter::render)
            .collect::<Vec<_>>()
            .join(FILTER_GRAPH_SEPARATOR),
    )
}

/// What a fragment may consult while rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandContext {
    /// Family of the selected video encoder, if any.
    pub video_family: Option<CodecFamily>,
}

/// An atomic, composable piece of a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Option placed before the inputs (`-y`, `-progress pipe:2`, ...).
    GlobalOption { flag: String, value: Option<String> },
    /// One `-i <path>` pair.
    Input(PathBuf),
    /// The whole filter graph.
    FilterGraph(Vec<Filter>),
    /// Encoder selection for one stream type.
    Codec { stream: StreamType, codec: String },
    /// Target bitrate for one stream type.
    Bitrate { stream: StreamType, rate: String },
    /// Speed tier, resolved against the selected video encoder.
    Preset(PresetTier),
    /// Drop one stream type.
    Skip(StreamType),
    /// Trailing output path.
    Output(PathBuf),
}

impl Fragment {
    /// Renders this fragment to argv tokens.
    pub fn render(&self, ctx: &CommandContext) -> Vec<String> {
        match self {
            Self::GlobalOption { flag, value } => {
                let mut tokens = vec![flag.clone()];
                tokens.extend(value.iter().cloned());
                tokens
            }
            Self::Input(path) => vec!["-i".to_string(), path.to_string_lossy().to_string()],
            Self::FilterGraph(filters) => match render_filter_graph(filters) {
                Some(graph) => vec!["-filter_complex".to_string(), graph],
                None => Vec::new(),
            },
            Self::Codec { stream, codec } => vec![stream.codec_flag().to_string(), codec.clone()],
            Self::Bitrate { stream, rate } => vec![stream.bitrate_flag().to_string(), rate.clone()],
            Self::Preset(tier) => ctx
                .video_family
                .and_then(|family| resolve_preset(*tier, family))
                .map(|token| vec!["-preset".to_string(), token.to_string()])
                .unwrap_or_default(),
            Self::Skip(stream) => vec![stream.skip_flag().to_string()],
            Self::Output(path) => vec![path.to_string_lossy().to_string()],
        }
    }
}
