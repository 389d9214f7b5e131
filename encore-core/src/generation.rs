use std::f32::consts::TAU;
use std::path::PathBuf;

use chrono::{DateTime, Local};

use crate::error::{Error, Result};
use crate::model::ModelVariant;

/// Renderings requested per generation.
pub const CLIPS_PER_GENERATION: usize = 3;
pub const MIN_DURATION_SECS: u32 = 1;
pub const MAX_DURATION_SECS: u32 = 30;

/// One slot per clip; `None` when the clip was not produced.
pub type ClipSlots = [Option<PathBuf>; CLIPS_PER_GENERATION];

/// A text-to-music backend after its weights are loaded.
pub trait MusicGenerator {
    fn sample_rate(&self) -> u32;

    /// Render `count` independent takes of the same description.
    fn generate(
        &mut self,
        description: &str,
        duration_secs: u32,
        count: usize,
    ) -> Result<Vec<Vec<f32>>>;
}

/// Produces a generator for a model variant. Called once per request.
pub trait ModelLoader {
    fn load(&self, variant: ModelVariant) -> Result<Box<dyn MusicGenerator>>;
}

/// What the user submitted from the generation form.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub description: String,
    pub duration_secs: u32,
    pub model: ModelVariant,
}

impl GenerationRequest {
    pub fn new(description: impl Into<String>, duration_secs: u32, model: ModelVariant) -> Self {
        Self {
            description: description.into(),
            duration_secs,
            model,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if (MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&self.duration_secs) {
            Ok(())
        } else {
            Err(Error::InvalidDuration {
                got: self.duration_secs,
                min: MIN_DURATION_SECS,
                max: MAX_DURATION_SECS,
            })
        }
    }
}

/// A completed generation as recorded in the ledgers and history.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub id: u32,
    pub timestamp: DateTime<Local>,
    pub description: String,
    pub duration_secs: u32,
    pub model: ModelVariant,
    pub elapsed_secs: f64,
    pub files: Vec<PathBuf>,
}

/// What the front-end shows after a generate action.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    /// Id allocated for the request, if it got that far.
    pub generation_id: Option<u32>,
    pub clips: ClipSlots,
    /// Counter label on success, `Error: ...` on failure.
    pub status: String,
    pub error: Option<String>,
}

impl GenerationOutcome {
    pub fn failed(generation_id: Option<u32>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            generation_id,
            clips: Default::default(),
            status: format!("Error: {}", message),
            error: Some(message),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Pad `files` to the clip slot count, blanking paths that do not exist.
pub fn clip_slots(files: &[PathBuf]) -> ClipSlots {
    let mut slots: ClipSlots = Default::default();
    for (slot, file) in slots.iter_mut().zip(files) {
        if file.exists() {
            *slot = Some(file.clone());
        }
    }
    slots
}

/// Deterministic stand-in backend: each take is a sine tone a fifth above
/// the previous one. Used for dry runs and tests.
#[derive(Debug, Clone)]
pub struct SineGenerator {
    pub sample_rate: u32,
    pub base_hz: f32,
    /// Cap on rendered takes, to simulate a backend returning fewer clips.
    pub max_takes: Option<usize>,
}

impl Default for SineGenerator {
    fn default() -> Self {
        Self {
            sample_rate: 8_000,
            base_hz: 220.0,
            max_takes: None,
        }
    }
}

impl MusicGenerator for SineGenerator {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn generate(
        &mut self,
        _description: &str,
        duration_secs: u32,
        count: usize,
    ) -> Result<Vec<Vec<f32>>> {
        let takes = self.max_takes.map_or(count, |max| count.min(max));
        let len = (self.sample_rate * duration_secs) as usize;
        Ok((0..takes)
            .map(|take| {
                let hz = self.base_hz * 1.5f32.powi(take as i32);
                (0..len)
                    .map(|n| 0.25 * (TAU * hz * n as f32 / self.sample_rate as f32).sin())
                    .collect()
            })
            .collect())
    }
}

/// Loader for [`SineGenerator`]; `fail_with` turns every load into an
/// inference error.
#[derive(Debug, Clone, Default)]
pub struct SineLoader {
    pub generator: SineGenerator,
    pub fail_with: Option<String>,
}

impl ModelLoader for SineLoader {
    fn load(&self, variant: ModelVariant) -> Result<Box<dyn MusicGenerator>> {
        if let Some(message) = &self.fail_with {
            return Err(Error::Inference(format!("{}: {}", variant.full_name(), message)));
        }
        Ok(Box::new(self.generator.clone()))
    }
}
