use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use crate::config::SeparatorConfig;
use crate::error::{Error, Result};
use crate::ledger::UsageSummary;
use crate::relay::{relay_with, Relay};

pub const STEM_COUNT: usize = 5;

/// Shown when a clip to separate is missing.
pub const MISSING_INPUT_MESSAGE: &str =
    "Error: No valid tracks found for separation. Generate music first!";
pub const SEPARATION_FAILED_MESSAGE: &str = "Error during separation.";

/// Instrument tracks the separator writes, in slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stem {
    Drums,
    Bass,
    Guitar,
    Piano,
    Other,
}

impl Stem {
    pub const ALL: [Stem; STEM_COUNT] = [
        Stem::Drums,
        Stem::Bass,
        Stem::Guitar,
        Stem::Piano,
        Stem::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stem::Drums => "drums",
            Stem::Bass => "bass",
            Stem::Guitar => "guitar",
            Stem::Piano => "piano",
            Stem::Other => "other",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.wav", self.as_str())
    }
}

impl fmt::Display for Stem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One slot per [`Stem::ALL`] entry; `None` when the separator did not
/// produce that stem.
pub type StemSlots = [Option<PathBuf>; STEM_COUNT];

/// Result of separating one clip.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SeparationOutcome {
    pub stems: StemSlots,
    /// Empty on success.
    pub message: String,
}

impl SeparationOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            stems: Default::default(),
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.message.is_empty()
    }

    pub fn found(&self) -> impl Iterator<Item = (Stem, &Path)> {
        Stem::ALL
            .iter()
            .zip(&self.stems)
            .filter_map(|(stem, slot)| slot.as_deref().map(|p| (*stem, p)))
    }
}

/// Result of separating every displayed clip at once.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkSeparation {
    /// Three clips times five stems, clip-major.
    pub slots: Vec<Option<PathBuf>>,
    pub summary: UsageSummary,
    /// Average rate across every session in the shared ledger.
    pub overall_rate: f64,
}

impl BulkSeparation {
    /// Stem slots of clip `index`.
    pub fn clip(&self, index: usize) -> &[Option<PathBuf>] {
        let start = (index * STEM_COUNT).min(self.slots.len());
        let end = (start + STEM_COUNT).min(self.slots.len());
        &self.slots[start..end]
    }
}

/// Runs the external separation tool on one file at a time.
#[derive(Debug, Clone)]
pub struct Separator {
    config: SeparatorConfig,
    relay: Relay,
}

impl Separator {
    pub fn new(config: SeparatorConfig, relay: Relay) -> Self {
        Self { config, relay }
    }

    /// `<interpreter> -m <module> -o <out_dir> -n <model> <input>`
    pub fn command(&self, input: &Path, out_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.config.interpreter);
        cmd.arg("-m")
            .arg(&self.config.module)
            .arg("-o")
            .arg(out_dir)
            .arg("-n")
            .arg(&self.config.model)
            .arg(input);
        cmd
    }

    /// Directory the tool writes stems of `input` into:
    /// `<out_dir>/<model>/<input file stem>`.
    pub fn output_dir(&self, input: &Path, out_dir: &Path) -> PathBuf {
        let base = input
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_default();
        out_dir.join(&self.config.model).join(base)
    }

    /// Spawn the tool, relay its output live and wait for it.
    pub fn run(&self, input: &Path, out_dir: &Path) -> Result<ExitStatus> {
        let mut child = self
            .command(input, out_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::Separator(format!(
                    "could not start {}: {}",
                    self.config.interpreter.display(),
                    e
                ))
            })?;

        if let Err(e) = relay_with(&mut child, self.relay) {
            log::warn!("output relay interrupted: {}", e);
        }
        Ok(child.wait()?)
    }

    /// Expected stem paths for `input`, `None` for each file that is missing.
    pub fn probe(&self, input: &Path, out_dir: &Path) -> StemSlots {
        let dir = self.output_dir(input, out_dir);
        Stem::ALL.map(|stem| {
            let path = dir.join(stem.file_name());
            path.is_file().then_some(path)
        })
    }

    /// Create `out_dir`, run the tool and probe for stems. A nonzero exit is
    /// an error.
    pub fn separate(&self, input: &Path, out_dir: &Path) -> Result<StemSlots> {
        std::fs::create_dir_all(out_dir)?;
        let status = self.run(input, out_dir)?;
        if !status.success() {
            return Err(Error::Separator(format!("separator exited with {}", status)));
        }
        Ok(self.probe(input, out_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separator() -> Separator {
        Separator::new(SeparatorConfig::default(), Relay::Discard)
    }

    #[test]
    fn test_command_line() {
        let cmd = separator().command(
            Path::new("/s/g/output_0_x.wav"),
            Path::new("/s/g/STEMS"),
        );
        assert_eq!(cmd.get_program(), "python3");
        let args: Vec<_> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-m",
                "demucs.separate",
                "-o",
                "/s/g/STEMS",
                "-n",
                "htdemucs_6s",
                "/s/g/output_0_x.wav",
            ]
        );
    }

    #[test]
    fn test_output_dir_uses_model_and_basename() {
        let dir =
            separator().output_dir(Path::new("/a/b/output_2_s.wav"), Path::new("/a/STEMS"));
        assert_eq!(dir, PathBuf::from("/a/STEMS/htdemucs_6s/output_2_s"));
    }

    #[test]
    fn test_probe_reports_subset() {
        let tmp = tempfile::tempdir().unwrap();
        let out_dir = tmp.path().join("STEMS");
        let input = tmp.path().join("clip.wav");
        let sep = separator();
        let produced = sep.output_dir(&input, &out_dir);
        std::fs::create_dir_all(&produced).unwrap();
        std::fs::write(produced.join("bass.wav"), b"").unwrap();
        std::fs::write(produced.join("other.wav"), b"").unwrap();

        let slots = sep.probe(&input, &out_dir);
        assert_eq!(slots[0], None);
        assert_eq!(slots[1], Some(produced.join("bass.wav")));
        assert_eq!(slots[2], None);
        assert_eq!(slots[3], None);
        assert_eq!(slots[4], Some(produced.join("other.wav")));
    }

    #[test]
    fn test_missing_interpreter_is_separator_error() {
        let tmp = tempfile::tempdir().unwrap();
        let sep = Separator::new(
            SeparatorConfig {
                interpreter: tmp.path().join("no-such-python"),
                ..Default::default()
            },
            Relay::Discard,
        );
        let err = sep
            .separate(&tmp.path().join("in.wav"), &tmp.path().join("STEMS"))
            .unwrap_err();
        assert!(matches!(err, Error::Separator(_)));
    }

    #[test]
    fn test_bulk_clip_view() {
        let mut slots = vec![None; 15];
        slots[5] = Some(PathBuf::from("drums.wav"));
        let bulk = BulkSeparation {
            slots,
            summary: UsageSummary::new(3, 1),
            overall_rate: 33.33,
        };
        assert_eq!(bulk.clip(1)[0], Some(PathBuf::from("drums.wav")));
        assert!(bulk.clip(0).iter().all(Option::is_none));
        assert!(bulk.clip(3).is_empty());
    }

    #[test]
    fn test_outcome_found_lists_present_stems() {
        let outcome = SeparationOutcome {
            stems: [
                None,
                Some(PathBuf::from("b.wav")),
                None,
                Some(PathBuf::from("p.wav")),
                None,
            ],
            message: String::new(),
        };
        let found: Vec<Stem> = outcome.found().map(|(s, _)| s).collect();
        assert_eq!(found, vec![Stem::Bass, Stem::Piano]);
        assert!(outcome.is_ok());
        assert!(!SeparationOutcome::failed(SEPARATION_FAILED_MESSAGE).is_ok());
    }
}
