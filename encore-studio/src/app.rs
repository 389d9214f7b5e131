use std::path::PathBuf;
use std::str::FromStr;

use encore_core::generation::{MAX_DURATION_SECS, MIN_DURATION_SECS};
use encore_core::ledger::generation_rows;
use encore_core::{ClipSlots, GenerationRequest, ModelVariant, Stem, Studio};

/// Actions the studio form offers.
#[derive(Clone, Debug, PartialEq)]
pub enum StudioEvent {
    /// Generate from the given text, or from the current prompt.
    Generate(Option<String>),
    SetPrompt(String),
    SelectModel(ModelVariant),
    SetDuration(u32),
    /// Separate one displayed clip, 0-based.
    Separate(usize),
    SeparateAll,
    ShowHistory,
    /// Generation rows of the current session's ledger.
    ShowLedger,
    LoadGeneration(u32),
    ToggleLanguage,
    Status,
    Help,
    Quit,
}

pub const COMMANDS: &[&str] = &[
    "/generate",
    "/prompt",
    "/model",
    "/duration",
    "/separate",
    "/separate-all",
    "/history",
    "/ledger",
    "/load",
    "/language",
    "/status",
    "/help",
    "/quit",
];

fn arg<'a>(rest: &'a str, usage: &str) -> Result<&'a str, String> {
    if rest.is_empty() {
        Err(format!("usage: {}", usage))
    } else {
        Ok(rest)
    }
}

impl StudioEvent {
    /// Parse one line of shell input. Blank lines yield `None`; text without
    /// a leading `/` submits it as the description.
    pub fn parse(line: &str) -> Result<Option<StudioEvent>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        if !line.starts_with('/') {
            return Ok(Some(StudioEvent::Generate(Some(line.to_string()))));
        }

        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let event = match command {
            "/generate" | "/g" => {
                StudioEvent::Generate((!rest.is_empty()).then(|| rest.to_string()))
            }
            "/prompt" => StudioEvent::SetPrompt(rest.to_string()),
            "/model" => {
                let name = arg(rest, "/model <small|medium|large>")?;
                StudioEvent::SelectModel(ModelVariant::from_str(name).map_err(|e| e.to_string())?)
            }
            "/duration" => {
                let secs: u32 = arg(rest, "/duration <seconds>")?
                    .parse()
                    .map_err(|_| format!("not a number: {}", rest))?;
                if !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&secs) {
                    return Err(format!(
                        "duration must be between {} and {} seconds",
                        MIN_DURATION_SECS, MAX_DURATION_SECS
                    ));
                }
                StudioEvent::SetDuration(secs)
            }
            "/separate" => {
                let clip: usize = arg(rest, "/separate <1-3>")?
                    .parse()
                    .map_err(|_| format!("not a clip number: {}", rest))?;
                if !(1..=3).contains(&clip) {
                    return Err("clip number must be 1, 2 or 3".into());
                }
                StudioEvent::Separate(clip - 1)
            }
            "/separate-all" => StudioEvent::SeparateAll,
            "/history" => StudioEvent::ShowHistory,
            "/ledger" => StudioEvent::ShowLedger,
            "/load" => {
                let id = arg(rest, "/load <generation id>")?
                    .parse()
                    .map_err(|_| format!("not a generation id: {}", rest))?;
                StudioEvent::LoadGeneration(id)
            }
            "/language" => StudioEvent::ToggleLanguage,
            "/status" => StudioEvent::Status,
            "/help" | "/?" => StudioEvent::Help,
            "/quit" | "/exit" | "/q" => StudioEvent::Quit,
            other => return Err(format!("unknown command: {}", other)),
        };
        Ok(Some(event))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineKind {
    Heading,
    Info,
    Clip,
    Error,
}

/// One line of output for the shell to render.
#[derive(Clone, Debug, PartialEq)]
pub struct Line {
    pub kind: LineKind,
    pub text: String,
}

impl Line {
    fn heading(text: impl Into<String>) -> Self {
        Self {
            kind: LineKind::Heading,
            text: text.into(),
        }
    }

    fn info(text: impl Into<String>) -> Self {
        Self {
            kind: LineKind::Info,
            text: text.into(),
        }
    }

    fn clip(text: impl Into<String>) -> Self {
        Self {
            kind: LineKind::Clip,
            text: text.into(),
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            kind: LineKind::Error,
            text: text.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Form state plus the studio it drives.
pub struct StudioModel {
    studio: Studio,
    pub prompt: String,
    pub model: ModelVariant,
    pub duration: u32,
    /// Generation whose clips are on screen; separation targets this id.
    pub displayed_generation: Option<u32>,
    pub clips: ClipSlots,
    pub status_text: String,
    output: Vec<Line>,
}

fn slot_text(slot: &Option<PathBuf>) -> String {
    slot.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".into())
}

impl StudioModel {
    pub fn new(studio: Studio) -> Self {
        let config = studio.config();
        let model = config.default_model;
        let duration = config.default_duration.clamp(MIN_DURATION_SECS, MAX_DURATION_SECS);
        let status_text = studio.counter_label();
        Self {
            studio,
            prompt: String::new(),
            model,
            duration,
            displayed_generation: None,
            clips: Default::default(),
            status_text,
            output: Vec::new(),
        }
    }

    pub fn studio(&self) -> &Studio {
        &self.studio
    }

    /// Start the session up front so its directory exists before the first
    /// request.
    pub fn start_session(&mut self) -> anyhow::Result<()> {
        let session = self.studio.ensure_session()?;
        let text = format!("Session: {}", session.dir().display());
        self.output.push(Line::info(text));
        Ok(())
    }

    /// Lines produced since the last call.
    pub fn take_output(&mut self) -> Vec<Line> {
        std::mem::take(&mut self.output)
    }

    pub fn event(&mut self, event: StudioEvent) -> anyhow::Result<Flow> {
        match event {
            StudioEvent::Generate(text) => {
                if let Some(text) = text {
                    self.prompt = text;
                }
                self.generate()?;
            }
            StudioEvent::SetPrompt(text) => {
                self.prompt = text;
                self.output.push(Line::info(format!("Prompt: {}", self.prompt)));
            }
            StudioEvent::SelectModel(model) => {
                self.model = model;
                self.output.push(Line::info(format!(
                    "{}: {}",
                    self.studio.messages().model_label,
                    model
                )));
            }
            StudioEvent::SetDuration(secs) => {
                self.duration = secs;
                self.output.push(Line::info(format!(
                    "{}: {}",
                    self.studio.messages().duration_label,
                    secs
                )));
            }
            StudioEvent::Separate(index) => self.separate(index)?,
            StudioEvent::SeparateAll => self.separate_all()?,
            StudioEvent::ShowHistory => self.show_history(),
            StudioEvent::ShowLedger => self.show_ledger(),
            StudioEvent::LoadGeneration(id) => self.load_generation(id),
            StudioEvent::ToggleLanguage => {
                let locale = self.studio.toggle_locale();
                self.status_text = self.studio.counter_label();
                self.output.push(Line::info(format!("Language: {}", locale)));
                self.render_header();
            }
            StudioEvent::Status => self.render_status(),
            StudioEvent::Help => self.render_help(),
            StudioEvent::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    pub fn render_header(&mut self) {
        let m = self.studio.messages();
        self.output.push(Line::heading(m.title));
        self.output.push(Line::info(self.status_text.clone()));
    }

    fn render_status(&mut self) {
        let m = self.studio.messages();
        let prompt = if self.prompt.is_empty() {
            format!("({})", m.description_placeholder)
        } else {
            self.prompt.clone()
        };
        self.output.push(Line::info(format!("{}: {}", m.description_label, prompt)));
        self.output.push(Line::info(format!("{}: {}", m.model_label, self.model)));
        self.output.push(Line::info(format!("{}: {}", m.duration_label, self.duration)));
        self.output.push(Line::info(self.status_text.clone()));
        if let Some(session) = self.studio.session() {
            self.output.push(Line::info(format!("Session: {}", session.dir().display())));
        }
        let usage = self.studio.usage();
        self.output.push(Line::info(format!(
            "Separated {} of {} generated tracks ({:.2}%)",
            usage.tracks_separated, usage.tracks_generated, usage.usage_rate
        )));
        self.render_clips();
    }

    fn render_help(&mut self) {
        let m = self.studio.messages();
        let rows = [
            format!("<text>              {}", m.generate_button),
            "/prompt <text>      set the description".to_string(),
            "/model <variant>    small, medium or large".to_string(),
            format!(
                "/duration <secs>    {} {}-{}",
                m.duration_label, MIN_DURATION_SECS, MAX_DURATION_SECS
            ),
            format!("/separate <1-3>     {}", m.separate_button),
            format!("/separate-all       {}", m.separate_all_button),
            "/history            list generations".to_string(),
            "/ledger             generation rows of this session".to_string(),
            "/load <id>          show a past generation".to_string(),
            format!("/language           {}", m.change_language),
            "/status             show the form".to_string(),
            "/quit               leave".to_string(),
        ];
        self.output.extend(rows.into_iter().map(Line::info));
    }

    fn render_clips(&mut self) {
        let Some(id) = self.displayed_generation else {
            return;
        };
        self.output.push(Line::heading(format!("Generation #{}", id)));
        for (i, slot) in self.clips.iter().enumerate() {
            self.output.push(Line::clip(format!("Clip Audio {}: {}", i + 1, slot_text(slot))));
        }
    }

    fn generate(&mut self) -> anyhow::Result<()> {
        let request = GenerationRequest::new(self.prompt.clone(), self.duration, self.model);
        self.output.push(Line::info(format!(
            "Generating '{}' ({}s, {})...",
            request.description, request.duration_secs, request.model
        )));

        let outcome = self.studio.generate(&request)?;
        self.status_text = outcome.status.clone();
        if let Some(error) = outcome.error {
            self.output.push(Line::error(format!("Error: {}", error)));
            return Ok(());
        }
        self.displayed_generation = outcome.generation_id;
        self.clips = outcome.clips;
        self.output.push(Line::info(self.status_text.clone()));
        self.render_clips();
        Ok(())
    }

    fn separate(&mut self, index: usize) -> anyhow::Result<()> {
        let (Some(id), Some(_)) = (self.displayed_generation, self.clips.get(index)) else {
            self.output.push(Line::error(encore_core::separation::MISSING_INPUT_MESSAGE));
            return Ok(());
        };
        let messages = self.studio.messages();
        self.output.push(Line::heading(messages.separate_clip(index)));

        let outcome = self.studio.separate(self.clips[index].as_deref(), id, index)?;
        if !outcome.is_ok() {
            self.output.push(Line::error(outcome.message.clone()));
        }
        self.render_stems(&outcome.stems);
        Ok(())
    }

    fn separate_all(&mut self) -> anyhow::Result<()> {
        let Some(id) = self.displayed_generation else {
            self.output.push(Line::error(encore_core::separation::MISSING_INPUT_MESSAGE));
            return Ok(());
        };
        let messages = self.studio.messages();
        self.output.push(Line::heading(messages.separate_all_button));

        let clips = self.clips.clone();
        let bulk = self.studio.separate_all(&clips, id)?;
        for index in 0..clips.len() {
            self.output.push(Line::heading(format!("Clip Audio {}", index + 1)));
            let stems = bulk.clip(index).to_vec();
            self.render_stems(&stems);
        }
        self.output.push(Line::info(format!(
            "Separation usage: {:.2}% this session, {:.2}% across sessions",
            bulk.summary.usage_rate, bulk.overall_rate
        )));
        Ok(())
    }

    fn render_stems(&mut self, stems: &[Option<PathBuf>]) {
        for (stem, slot) in Stem::ALL.iter().zip(stems) {
            self.output.push(Line::clip(format!("  {:<7} {}", stem.to_string(), slot_text(slot))));
        }
    }

    fn show_history(&mut self) {
        self.output.push(Line::heading("Generation history"));
        for (id, description) in self.studio.history().list() {
            self.output.push(Line::info(format!("{:>4}  {}", id, description)));
        }
    }

    fn show_ledger(&mut self) {
        let Some(session) = self.studio.session() else {
            self.output.push(Line::info("No session yet"));
            return;
        };
        let path = session.ledger().session_csv();
        self.output.push(Line::heading(path.display().to_string()));
        match generation_rows(path) {
            Ok(rows) => {
                for row in rows {
                    self.output.push(Line::info(format!(
                        "{:>4}  {}  {:>2}s  {:<6}  {:>6.2}s  {}",
                        row.id,
                        row.timestamp,
                        row.duration_secs,
                        row.model,
                        row.elapsed_secs,
                        row.description
                    )));
                }
            }
            Err(e) => self.output.push(Line::error(format!("Could not read ledger: {}", e))),
        }
    }

    fn load_generation(&mut self, id: u32) {
        let clips = self.studio.history().lookup(id);
        if clips.iter().all(Option::is_none) {
            self.output.push(Line::error(format!("No generation with id {}", id)));
            return;
        }
        self.displayed_generation = Some(id);
        self.clips = clips;
        self.render_clips();
    }
}
