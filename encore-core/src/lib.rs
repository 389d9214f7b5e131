//! Session bookkeeping, MusicGen generation and stem separation for the
//! encore studio.

pub mod config;
pub mod error;
pub mod generation;
pub mod history;
pub mod journal;
pub mod ledger;
pub mod locale;
pub mod model;
pub mod musicgen;
pub mod relay;
pub mod separation;
pub mod session;
pub mod studio;
pub mod wav;

pub use crate::{
    config::{SeparatorConfig, StudioConfig},
    error::{Error, Result},
    generation::{
        ClipSlots, Generation, GenerationOutcome, GenerationRequest, ModelLoader, MusicGenerator,
        SineGenerator, SineLoader,
    },
    history::{History, HistoryEntry},
    ledger::UsageSummary,
    locale::{Locale, Messages},
    model::ModelVariant,
    musicgen::OnnxModelLoader,
    relay::Relay,
    separation::{BulkSeparation, SeparationOutcome, Stem, StemSlots},
    session::Session,
    studio::Studio,
};
