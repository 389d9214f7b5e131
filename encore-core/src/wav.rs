use std::path::Path;

use crate::error::Result;

/// Loudness target for written clips, in dBFS RMS.
pub const TARGET_LOUDNESS_DB: f32 = -14.0;

/// Write mono f32 samples to a WAV file at the given path.
pub fn write_wav(samples: &[f32], sample_rate: u32, path: &Path) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Root-mean-square level of `samples` in dBFS, or `None` for silence.
pub fn rms_db(samples: &[f32]) -> Option<f32> {
    if samples.is_empty() {
        return None;
    }
    let mean_square = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    if mean_square <= f32::EPSILON {
        None
    } else {
        Some(10.0 * mean_square.log10())
    }
}

/// Scale `samples` so their RMS level hits `target_db`, then pull the gain
/// back if that would push any peak past full scale.
pub fn normalize_loudness(samples: &mut [f32], target_db: f32) {
    let Some(current_db) = rms_db(samples) else {
        return;
    };
    let mut gain = 10f32.powf((target_db - current_db) / 20.0);
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak * gain > 1.0 {
        gain = 1.0 / peak;
    }
    for sample in samples.iter_mut() {
        *sample *= gain;
    }
}

/// Normalize a rendering and write it out.
pub fn write_normalized(mut samples: Vec<f32>, sample_rate: u32, path: &Path) -> Result<()> {
    normalize_loudness(&mut samples, TARGET_LOUDNESS_DB);
    write_wav(&samples, sample_rate, path)
}
