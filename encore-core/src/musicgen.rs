//! MusicGen inference over an ONNX export.
//!
//! The export is the usual three-graph split: a T5 text encoder, a merged
//! decoder with KV cache branches, and the EnCodec decoder that turns codebook
//! tokens back into a waveform.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndarray::{s, Array1, Array2, Array3, ArrayD, Axis, Ix3, IxDyn};
use ort::session::{Session, SessionInputValue};
use ort::value::Tensor;
use rand::distributions::WeightedIndex;
use rand::prelude::*;

use crate::error::{Error, Result};
use crate::generation::{ModelLoader, MusicGenerator};
use crate::model::{open_session, validate_model_dir, DecoderShape, ModelVariant};

type InferenceResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Output rate of the EnCodec decoder.
pub const SAMPLE_RATE: u32 = 32_000;
/// Codebook frames per second of audio.
pub const FRAME_RATE: u32 = 50;

const NUM_CODEBOOKS: usize = 4;
const BOS_TOKEN: i64 = 2048;
const PAD_TOKEN: i64 = 2048;
const GUIDANCE_SCALE: f32 = 3.0;
const TOP_K: usize = 50;

/// Decoder positions needed for `duration_secs` of aligned audio: one BOS
/// column plus the delay of the last codebook on top of the frames.
pub fn token_budget(duration_secs: u32) -> usize {
    (duration_secs * FRAME_RATE) as usize + 1 + (NUM_CODEBOOKS - 1)
}

/// Past key/value tensors for every decoder layer, keyed by graph input name.
struct KvCache {
    decoder: HashMap<String, ArrayD<f32>>,
    encoder: HashMap<String, ArrayD<f32>>,
}

impl KvCache {
    fn empty(shape: DecoderShape, batch_size: usize) -> Self {
        let zeros = || ArrayD::zeros(IxDyn(&[batch_size, shape.num_heads, 0, shape.head_dim]));
        let mut decoder = HashMap::new();
        let mut encoder = HashMap::new();
        for layer in 0..shape.num_layers {
            for kind in ["key", "value"] {
                decoder.insert(format!("past_key_values.{layer}.decoder.{kind}"), zeros());
                encoder.insert(format!("past_key_values.{layer}.encoder.{kind}"), zeros());
            }
        }
        Self { decoder, encoder }
    }

    fn inputs(&self) -> InferenceResult<Vec<(Cow<'static, str>, SessionInputValue<'static>)>> {
        let mut inputs = Vec::with_capacity(self.decoder.len() + self.encoder.len());
        for (name, value) in self.decoder.iter().chain(self.encoder.iter()) {
            inputs.push((
                Cow::Owned(name.clone()),
                Tensor::from_array(value.clone())?.into(),
            ));
        }
        Ok(inputs)
    }
}

struct MusicGenPipeline {
    text_encoder: Session,
    decoder: Session,
    encodec_decode: Session,
    tokenizer: tokenizers::Tokenizer,
    shape: DecoderShape,
}

impl MusicGenPipeline {
    fn load(model_dir: &Path, shape: DecoderShape) -> InferenceResult<Self> {
        log::info!("Loading text_encoder.onnx from {}", model_dir.display());
        let text_encoder = open_session(&model_dir.join("text_encoder.onnx"))?;
        log::info!("Loading decoder_model_merged.onnx");
        let decoder = open_session(&model_dir.join("decoder_model_merged.onnx"))?;
        log::info!("Loading encodec_decode.onnx");
        let encodec_decode = open_session(&model_dir.join("encodec_decode.onnx"))?;
        let tokenizer = tokenizers::Tokenizer::from_file(model_dir.join("tokenizer.json"))
            .map_err(|e| e.to_string())?;
        log::info!("MusicGen graphs loaded");

        Ok(Self {
            text_encoder,
            decoder,
            encodec_decode,
            tokenizer,
            shape,
        })
    }

    /// Encode the prompt and stack it with an all-zero unconditional row for
    /// classifier-free guidance.
    fn encode_prompt(&mut self, prompt: &str) -> InferenceResult<(Array3<f32>, Array2<i64>)> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| e.to_string())?;
        let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let seq_len = ids.len();
        let input_ids = Array2::from_shape_vec((1, seq_len), ids)?;
        let attention_mask = Array2::from_shape_vec((1, seq_len), mask)?;

        let hidden = {
            let outputs = self.text_encoder.run(ort::inputs! {
                "input_ids" => Tensor::from_array(input_ids)?,
                "attention_mask" => Tensor::from_array(attention_mask.clone())?,
            })?;
            outputs["last_hidden_state"]
                .try_extract_array::<f32>()?
                .to_owned()
                .into_dimensionality::<Ix3>()?
        };

        let uncond_hidden = Array3::<f32>::zeros(hidden.raw_dim());
        let hidden_states =
            ndarray::concatenate(Axis(0), &[hidden.view(), uncond_hidden.view()])?;
        let uncond_mask = Array2::<i64>::zeros(attention_mask.raw_dim());
        let mask = ndarray::concatenate(Axis(0), &[attention_mask.view(), uncond_mask.view()])?;
        Ok((hidden_states, mask))
    }

    /// Autoregressively sample one rendering of `duration_secs` seconds.
    fn render(&mut self, prompt: &str, duration_secs: u32) -> InferenceResult<Vec<f32>> {
        let mut rng = rand::thread_rng();
        let (hidden_states, encoder_mask) = self.encode_prompt(prompt)?;

        let seq_len = token_budget(duration_secs);
        let rows = 2 * NUM_CODEBOOKS;

        // Delayed token grid: codebook k starts generating at column 1 + k.
        let mut tokens = Array2::from_elem((rows, seq_len), PAD_TOKEN);
        tokens.column_mut(0).fill(BOS_TOKEN);
        let mut next_tokens = Array2::from_elem((rows, 1), BOS_TOKEN);
        let mut cache = KvCache::empty(self.shape, 2);

        let steps = seq_len - 1;
        for step in 0..steps {
            let first_step = step == 0;

            let mut inputs = cache.inputs()?;
            inputs.push((
                "encoder_attention_mask".into(),
                Tensor::from_array(encoder_mask.clone())?.into(),
            ));
            inputs.push((
                "input_ids".into(),
                Tensor::from_array(next_tokens.clone())?.into(),
            ));
            inputs.push((
                "encoder_hidden_states".into(),
                Tensor::from_array(hidden_states.clone())?.into(),
            ));
            inputs.push((
                "use_cache_branch".into(),
                Tensor::from_array(Array1::from_vec(vec![!first_step]))?.into(),
            ));

            let outputs = self.decoder.run(inputs)?;
            let logits = outputs["logits"]
                .try_extract_array::<f32>()?
                .to_owned()
                .into_dimensionality::<Ix3>()?;

            for layer in 0..self.shape.num_layers {
                for kind in ["key", "value"] {
                    let present = format!("present.{layer}.decoder.{kind}");
                    cache.decoder.insert(
                        format!("past_key_values.{layer}.decoder.{kind}"),
                        outputs[present.as_str()].try_extract_array::<f32>()?.to_owned(),
                    );
                    // Cross-attention keys only change on the first step.
                    if first_step {
                        let present = format!("present.{layer}.encoder.{kind}");
                        cache.encoder.insert(
                            format!("past_key_values.{layer}.encoder.{kind}"),
                            outputs[present.as_str()].try_extract_array::<f32>()?.to_owned(),
                        );
                    }
                }
            }

            let cond = logits.slice(s![..NUM_CODEBOOKS, 0, ..]);
            let uncond = logits.slice(s![NUM_CODEBOOKS.., 0, ..]);
            let guided = &uncond + &((&cond - &uncond) * GUIDANCE_SCALE);

            let pos = step + 1;
            for cb in 0..NUM_CODEBOOKS {
                let row: Vec<f32> = guided.row(cb).iter().copied().collect();
                let token = top_k_sample(&row, TOP_K, &mut rng)?;
                if pos > cb {
                    tokens[[cb, pos]] = token;
                    tokens[[cb + NUM_CODEBOOKS, pos]] = token;
                }
            }
            next_tokens = tokens.slice(s![.., pos..pos + 1]).to_owned();
        }

        self.decode_audio(&tokens)
    }

    /// Undo the codebook delay and run the EnCodec decoder.
    fn decode_audio(&mut self, tokens: &Array2<i64>) -> InferenceResult<Vec<f32>> {
        let seq_len = tokens.ncols();
        let aligned_len = seq_len - 1 - (NUM_CODEBOOKS - 1);
        let mut codes = vec![0i64; NUM_CODEBOOKS * aligned_len];
        for cb in 0..NUM_CODEBOOKS {
            for t in 0..aligned_len {
                let val = tokens[[cb, 1 + cb + t]];
                codes[cb * aligned_len + t] = if val == PAD_TOKEN { 0 } else { val };
            }
        }

        let codes = Tensor::from_array(([1usize, 1, NUM_CODEBOOKS, aligned_len], codes))?;
        let outputs = self.encodec_decode.run(ort::inputs! {
            "audio_codes" => codes,
        })?;
        let audio = outputs["audio_values"].try_extract_array::<f32>()?;
        Ok(audio.iter().copied().collect())
    }
}

fn top_k_sample(logits: &[f32], k: usize, rng: &mut impl Rng) -> InferenceResult<i64> {
    let k = k.min(logits.len()).max(1);

    let mut indexed: Vec<(usize, f32)> = logits.iter().copied().enumerate().collect();
    indexed.sort_unstable_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    indexed.truncate(k);

    let max_logit = indexed.first().map(|&(_, v)| v).ok_or("empty logits")?;
    let weights: Vec<f32> = indexed.iter().map(|(_, v)| (v - max_logit).exp()).collect();
    let dist = WeightedIndex::new(&weights)?;
    Ok(indexed[dist.sample(rng)].0 as i64)
}

/// A loaded MusicGen export ready to render prompts.
pub struct OnnxMusicGen {
    pipeline: MusicGenPipeline,
}

impl MusicGenerator for OnnxMusicGen {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn generate(
        &mut self,
        description: &str,
        duration_secs: u32,
        count: usize,
    ) -> Result<Vec<Vec<f32>>> {
        (0..count)
            .map(|i| {
                log::info!("Rendering {}/{} for '{}'", i + 1, count, description);
                self.pipeline
                    .render(description, duration_secs)
                    .map_err(|e| Error::Inference(e.to_string()))
            })
            .collect()
    }
}

/// Loads `musicgen-<variant>` exports from a models directory. Nothing is
/// cached: each call reads the graphs from disk again.
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    models_dir: PathBuf,
}

impl OnnxModelLoader {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self, variant: ModelVariant) -> Result<Box<dyn MusicGenerator>> {
        let dir = variant.export_dir(&self.models_dir);
        validate_model_dir(&dir)?;
        log::info!("Loading model {}...", variant.full_name());
        let pipeline = MusicGenPipeline::load(&dir, variant.decoder_shape())
            .map_err(|e| Error::Inference(e.to_string()))?;
        Ok(Box::new(OnnxMusicGen { pipeline }))
    }
}
