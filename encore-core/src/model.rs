use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Files an exported MusicGen directory must contain.
pub const REQUIRED_MODEL_FILES: &[&str] = &[
    "text_encoder.onnx",
    "decoder_model_merged.onnx",
    "encodec_decode.onnx",
    "tokenizer.json",
];

/// The MusicGen checkpoints a user can pick from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    #[default]
    Small,
    Medium,
    Large,
}

/// Attention geometry of a decoder export; the KV cache is shaped from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderShape {
    pub num_layers: usize,
    pub num_heads: usize,
    pub head_dim: usize,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 3] = [
        ModelVariant::Small,
        ModelVariant::Medium,
        ModelVariant::Large,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVariant::Small => "small",
            ModelVariant::Medium => "medium",
            ModelVariant::Large => "large",
        }
    }

    /// Hub name of the checkpoint, e.g. `facebook/musicgen-small`.
    pub fn full_name(&self) -> String {
        format!("facebook/musicgen-{}", self.as_str())
    }

    /// Directory holding the ONNX export of this variant under `models_dir`.
    pub fn export_dir(&self, models_dir: &Path) -> PathBuf {
        models_dir.join(format!("musicgen-{}", self.as_str()))
    }

    pub fn decoder_shape(&self) -> DecoderShape {
        match self {
            ModelVariant::Small => DecoderShape {
                num_layers: 24,
                num_heads: 16,
                head_dim: 64,
            },
            ModelVariant::Medium => DecoderShape {
                num_layers: 48,
                num_heads: 24,
                head_dim: 64,
            },
            ModelVariant::Large => DecoderShape {
                num_layers: 48,
                num_heads: 32,
                head_dim: 64,
            },
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "small" => Ok(ModelVariant::Small),
            "medium" => Ok(ModelVariant::Medium),
            "large" => Ok(ModelVariant::Large),
            other => Err(Error::UnknownModel(other.to_string())),
        }
    }
}

/// Check that `path` holds every file of a MusicGen export.
pub fn validate_model_dir(path: &Path) -> Result<()> {
    let missing: Vec<&str> = REQUIRED_MODEL_FILES
        .iter()
        .copied()
        .filter(|file| !path.join(file).exists())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::ModelDir {
            path: path.to_path_buf(),
            missing: missing.join(", "),
        })
    }
}

/// Open one ONNX graph with the optimization level the pipeline uses.
pub(crate) fn open_session(
    path: &Path,
) -> std::result::Result<Session, Box<dyn std::error::Error>> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level1)?
        .commit_from_file(path)?;
    Ok(session)
}
