use std::fmt;

use serde::{Deserialize, Serialize};

/// Languages the studio has label tables for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    English,
}

/// User-facing labels of the studio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Messages {
    pub title: &'static str,
    pub description_label: &'static str,
    pub description_placeholder: &'static str,
    pub model_label: &'static str,
    pub duration_label: &'static str,
    pub generate_button: &'static str,
    pub separation_title: &'static str,
    pub change_language: &'static str,
    pub separate_button: &'static str,
    pub separate_all_button: &'static str,
    pub counter_label: &'static str,
}

const ENGLISH: Messages = Messages {
    title: "Instrumental Music Generator with MusicGen and Track Separation",
    description_label: "Enter a description of the track",
    description_placeholder: "An indie pop song, with catchy melodies and hard-hitting drums",
    model_label: "Select MusicGen Model",
    duration_label: "Duration (seconds)",
    generate_button: "Generate Music",
    separation_title: "Track Separation",
    change_language: "Language",
    separate_button: "Separate Audio Clip",
    separate_all_button: "Separate All",
    counter_label: "N# Generations:",
};

impl Messages {
    fn fields(&self) -> [(&'static str, &'static str); 11] {
        [
            ("title", self.title),
            ("description_label", self.description_label),
            ("description_placeholder", self.description_placeholder),
            ("model_label", self.model_label),
            ("duration_label", self.duration_label),
            ("generate_button", self.generate_button),
            ("separation_title", self.separation_title),
            ("change_language", self.change_language),
            ("separate_button", self.separate_button),
            ("separate_all_button", self.separate_all_button),
            ("counter_label", self.counter_label),
        ]
    }

    /// Names of labels that are blank.
    pub fn blank_fields(&self) -> Vec<&'static str> {
        self.fields()
            .iter()
            .filter(|(_, text)| text.trim().is_empty())
            .map(|(name, _)| *name)
            .collect()
    }

    /// Counter line shown after each generation.
    pub fn counter(&self, generations: u32) -> String {
        format!("{} {}", self.counter_label, generations)
    }

    /// Label of the separate button for clip `index` (0-based).
    pub fn separate_clip(&self, index: usize) -> String {
        format!("{} {}", self.separate_button, index + 1)
    }
}

impl Locale {
    pub const ALL: [Locale; 1] = [Locale::English];

    pub fn messages(&self) -> &'static Messages {
        match self {
            Locale::English => &ENGLISH,
        }
    }

    /// The locale after this one, wrapping around.
    pub fn next(&self) -> Locale {
        let pos = Self::ALL.iter().position(|l| l == self).unwrap_or(0);
        Self::ALL[(pos + 1) % Self::ALL.len()]
    }

    /// Check every table for blank labels; returns a description of each gap.
    pub fn validate_all() -> Result<(), String> {
        let problems: Vec<String> = Self::ALL
            .iter()
            .flat_map(|locale| {
                locale
                    .messages()
                    .blank_fields()
                    .into_iter()
                    .map(move |field| format!("{}: {} is blank", locale, field))
            })
            .collect();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locale::English => f.write_str("english"),
        }
    }
}
