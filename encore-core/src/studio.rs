use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Local;

use crate::config::StudioConfig;
use crate::error::{Error, Result};
use crate::generation::{
    clip_slots, ClipSlots, Generation, GenerationOutcome, GenerationRequest, ModelLoader,
    CLIPS_PER_GENERATION,
};
use crate::history::History;
use crate::ledger::{
    append_record, generation_record, overall_rate, round2, summary_rates, UsageSummary,
    GLOBAL_SUMMARY_HEADER, SESSION_SUMMARY_HEADER,
};
use crate::locale::{Locale, Messages};
use crate::relay::Relay;
use crate::separation::{
    BulkSeparation, SeparationOutcome, Separator, MISSING_INPUT_MESSAGE,
    SEPARATION_FAILED_MESSAGE, STEM_COUNT,
};
use crate::session::Session;
use crate::wav::write_normalized;

/// Everything one run of the application owns: configuration, the lazily
/// started session, the generation counter, history and usage counters.
///
/// Requests are served one at a time through `&mut self`.
pub struct Studio {
    config: StudioConfig,
    loader: Box<dyn ModelLoader>,
    separator: Separator,
    locale: Locale,
    session: Option<Session>,
    last_generation_id: u32,
    history: History,
    tracks_generated: u32,
    tracks_separated: u32,
}

fn session_slot<'a>(slot: &'a mut Option<Session>, root: &Path) -> Result<&'a mut Session> {
    let session = match slot.take() {
        Some(session) => session,
        None => Session::start(root)?,
    };
    Ok(slot.insert(session))
}

/// Load the model, render the takes and write them into the generation's
/// directory. Returns the written paths.
fn render_clips(
    loader: &dyn ModelLoader,
    session: &Session,
    generation_id: u32,
    request: &GenerationRequest,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(session.generation_dir(generation_id))?;

    let mut model = loader.load(request.model)?;
    let takes = model.generate(&request.description, request.duration_secs, CLIPS_PER_GENERATION)?;
    if takes.is_empty() {
        return Err(Error::Inference("Model output is empty".into()));
    }

    let sample_rate = model.sample_rate();
    let mut files = Vec::with_capacity(takes.len());
    for (index, samples) in takes.into_iter().take(CLIPS_PER_GENERATION).enumerate() {
        let path = session.clip_path(generation_id, index);
        write_normalized(samples, sample_rate, &path)?;
        log::info!("Saved file: {}", path.display());
        files.push(path);
    }
    Ok(files)
}

impl Studio {
    pub fn new(config: StudioConfig, loader: Box<dyn ModelLoader>) -> Self {
        let separator = Separator::new(config.separator.clone(), Relay::Console);
        Self {
            locale: config.locale,
            config,
            loader,
            separator,
            session: None,
            last_generation_id: 0,
            history: History::new(),
            tracks_generated: 0,
            tracks_separated: 0,
        }
    }

    /// Route the separator's output somewhere other than the console.
    pub fn with_relay(mut self, relay: Relay) -> Self {
        self.separator = Separator::new(self.config.separator.clone(), relay);
        self
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Start the session now instead of on the first request.
    pub fn ensure_session(&mut self) -> Result<&mut Session> {
        session_slot(&mut self.session, &self.config.sessions_root)
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn messages(&self) -> &'static Messages {
        self.locale.messages()
    }

    /// Switch to the next supported locale and return it.
    pub fn toggle_locale(&mut self) -> Locale {
        self.locale = self.locale.next();
        self.locale
    }

    /// Number of ids handed out so far.
    pub fn generation_count(&self) -> u32 {
        self.last_generation_id
    }

    pub fn counter_label(&self) -> String {
        self.messages().counter(self.last_generation_id)
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn usage(&self) -> UsageSummary {
        UsageSummary::new(self.tracks_generated, self.tracks_separated)
    }

    /// Run one generation request.
    ///
    /// Model and write failures come back as an `Error: ...` outcome. Only a
    /// failure to create the session directory is returned as `Err`.
    pub fn generate(&mut self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        if let Err(e) = request.validate() {
            log::warn!("rejected generation request: {}", e);
            return Ok(GenerationOutcome::failed(None, e.to_string()));
        }

        let session = session_slot(&mut self.session, &self.config.sessions_root)?;
        let timestamp = Local::now();

        self.last_generation_id += 1;
        let id = self.last_generation_id;
        session.log().info(&format!(
            "Generation #{} started. Description: '{}', Duration: {}s, Model: '{}'",
            id, request.description, request.duration_secs, request.model
        ));

        let started = Instant::now();
        let files = match render_clips(self.loader.as_ref(), session, id, request) {
            Ok(files) => files,
            Err(e) => {
                session.log().error(&format!("Generation failed: {}", e));
                return Ok(GenerationOutcome::failed(Some(id), e.to_string()));
            }
        };
        let elapsed_secs = round2(started.elapsed().as_secs_f64());

        let generation = Generation {
            id,
            timestamp,
            description: request.description.clone(),
            duration_secs: request.duration_secs,
            model: request.model,
            elapsed_secs,
            files,
        };
        session.log().info(&format!(
            "Generation #{} completed in {} seconds. Generated files: {:?}",
            id, elapsed_secs, generation.files
        ));

        let record = generation_record(&generation);
        let ledger = session.ledger().clone();
        for path in ledger.files() {
            if let Err(e) = append_record(path, None, &record) {
                session
                    .log()
                    .error(&format!("Error writing to CSV {}: {}", path.display(), e));
            }
        }

        self.history.record(&generation);
        self.tracks_generated += generation.files.len() as u32;

        Ok(GenerationOutcome {
            generation_id: Some(id),
            clips: clip_slots(&generation.files),
            status: self.counter_label(),
            error: None,
        })
    }

    /// Separate one clip into stems under `generation_<id>/STEMS`.
    ///
    /// A missing clip short-circuits without running the tool.
    pub fn separate(
        &mut self,
        file: Option<&Path>,
        generation_id: u32,
        clip_index: usize,
    ) -> Result<SeparationOutcome> {
        let Some(file) = file.filter(|f| f.exists()) else {
            log::warn!("nothing to separate for clip {}", clip_index + 1);
            return Ok(SeparationOutcome::failed(MISSING_INPUT_MESSAGE));
        };

        let session = session_slot(&mut self.session, &self.config.sessions_root)?;
        session.log().info(&format!(
            "Apply separation to file: {} (generation #{}, clip {})",
            file.display(),
            generation_id,
            clip_index + 1
        ));

        match self.separator.separate(file, &session.stems_dir(generation_id)) {
            Ok(stems) => {
                let found = stems.iter().filter(|s| s.is_some()).count();
                session.log().info(&format!(
                    "Separation of {} produced {}/{} stems",
                    file.display(),
                    found,
                    STEM_COUNT
                ));
                Ok(SeparationOutcome {
                    stems,
                    message: String::new(),
                })
            }
            Err(e) => {
                session.log().error(&format!("Separation of {} failed: {}", file.display(), e));
                Ok(SeparationOutcome::failed(SEPARATION_FAILED_MESSAGE))
            }
        }
    }

    /// Separate every present clip of a generation and record the session's
    /// separation usage in both ledgers.
    pub fn separate_all(
        &mut self,
        clips: &ClipSlots,
        generation_id: u32,
    ) -> Result<BulkSeparation> {
        let mut slots = Vec::with_capacity(CLIPS_PER_GENERATION * STEM_COUNT);
        for (index, clip) in clips.iter().enumerate() {
            match clip.as_deref().filter(|p| p.exists()) {
                Some(path) => {
                    let outcome = self.separate(Some(path), generation_id, index)?;
                    if outcome.is_ok() {
                        self.tracks_separated += 1;
                    }
                    slots.extend(outcome.stems);
                }
                None => slots.extend(std::iter::repeat(None).take(STEM_COUNT)),
            }
        }

        let summary = self.usage();
        let session = session_slot(&mut self.session, &self.config.sessions_root)?;
        session.log().info(&format!(
            "Session Summary: {} tracks generated, {} separated, {:.2}% usage rate.",
            summary.tracks_generated, summary.tracks_separated, summary.usage_rate
        ));

        let ledger = session.ledger().clone();
        if let Err(e) = append_record(
            ledger.session_csv(),
            Some(&SESSION_SUMMARY_HEADER[..]),
            &summary.record_with_rate(summary.usage_rate),
        ) {
            session.log().error(&format!(
                "Error writing session summary to {}: {}",
                ledger.session_csv().display(),
                e
            ));
        }

        let previous = summary_rates(ledger.global_csv()).unwrap_or_else(|e| {
            session.log().warn(&format!(
                "Could not read {}: {}",
                ledger.global_csv().display(),
                e
            ));
            Vec::new()
        });
        let overall = overall_rate(&previous, summary.usage_rate);
        if let Err(e) = append_record(
            ledger.global_csv(),
            Some(&GLOBAL_SUMMARY_HEADER[..]),
            &summary.record_with_rate(overall),
        ) {
            session.log().error(&format!(
                "Error updating {}: {}",
                ledger.global_csv().display(),
                e
            ));
        }

        Ok(BulkSeparation {
            slots,
            summary,
            overall_rate: overall,
        })
    }
}
