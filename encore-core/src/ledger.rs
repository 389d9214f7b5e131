//! CSV bookkeeping: one ledger per session plus one shared by all sessions.
//!
//! Both files hold two kinds of rows: one per generation, and `Session Summary`
//! rows appended after bulk separations. Record lengths differ, so readers and
//! writers are built with `flexible(true)`.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::generation::Generation;

pub const SESSION_CSV: &str = "session.csv";
pub const GLOBAL_CSV: &str = "all_sessions.csv";

pub const GENERATION_HEADER: [&str; 7] = [
    "Generation ID",
    "Timestamp",
    "Description",
    "Duration (s)",
    "Model",
    "Processing Time (s)",
    "Generated Files",
];

pub const SUMMARY_MARKER: &str = "Session Summary";
pub const SESSION_SUMMARY_HEADER: [&str; 4] = [
    SUMMARY_MARKER,
    "Tracks Generated",
    "Tracks Separated",
    "Separation Usage Rate (%)",
];
pub const GLOBAL_SUMMARY_HEADER: [&str; 4] = [
    SUMMARY_MARKER,
    "Tracks Generated",
    "Tracks Separated",
    "Overall Separation Usage Rate (%)",
];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Round to two decimals, the precision every rate and timing is stored at.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Separation usage for the current session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageSummary {
    pub tracks_generated: u32,
    pub tracks_separated: u32,
    /// Percentage, two decimals. Zero when nothing was generated.
    pub usage_rate: f64,
}

impl UsageSummary {
    pub fn new(tracks_generated: u32, tracks_separated: u32) -> Self {
        let usage_rate = if tracks_generated > 0 {
            round2(tracks_separated as f64 / tracks_generated as f64 * 100.0)
        } else {
            0.0
        };
        Self {
            tracks_generated,
            tracks_separated,
            usage_rate,
        }
    }

    /// Summary row carrying `rate` in the last column.
    pub fn record_with_rate(&self, rate: f64) -> Vec<String> {
        vec![
            SUMMARY_MARKER.to_string(),
            self.tracks_generated.to_string(),
            self.tracks_separated.to_string(),
            format!("{:.2}%", rate),
        ]
    }
}

/// Average of earlier sessions' rates and the current one.
pub fn overall_rate(previous: &[f64], current: f64) -> f64 {
    if previous.is_empty() {
        current
    } else {
        round2((previous.iter().sum::<f64>() + current) / (previous.len() + 1) as f64)
    }
}

/// Render paths the way the ledger has always stored them: `['a', 'b']`.
pub fn format_file_list(files: &[PathBuf]) -> String {
    let quoted: Vec<String> = files
        .iter()
        .map(|f| format!("'{}'", f.display()))
        .collect();
    format!("[{}]", quoted.join(", "))
}

pub fn parse_file_list(field: &str) -> Vec<PathBuf> {
    let inner = field.trim().trim_start_matches('[').trim_end_matches(']').trim();
    if inner.is_empty() {
        return Vec::new();
    }
    inner
        .trim_start_matches('\'')
        .trim_end_matches('\'')
        .split("', '")
        .map(PathBuf::from)
        .collect()
}

pub fn generation_record(generation: &Generation) -> Vec<String> {
    vec![
        generation.id.to_string(),
        generation.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        generation.description.clone(),
        generation.duration_secs.to_string(),
        generation.model.to_string(),
        generation.elapsed_secs.to_string(),
        format_file_list(&generation.files),
    ]
}

/// A generation row read back from a ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRow {
    pub id: u32,
    pub timestamp: String,
    pub description: String,
    pub duration_secs: u32,
    pub model: String,
    pub elapsed_secs: f64,
    pub files: Vec<PathBuf>,
}

fn is_empty_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true)
}

/// Append one record, writing `header` first when the file is new or empty.
pub fn append_record(path: &Path, header: Option<&[&str]>, record: &[String]) -> Result<()> {
    let needs_header = is_empty_file(path);
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(file);
    if needs_header {
        if let Some(header) = header {
            writer.write_record(header)?;
        }
    }
    writer.write_record(record)?;
    writer.flush()?;
    Ok(())
}

/// Create `path` with the generation header unless it already has content.
pub fn ensure_header(path: &Path) -> Result<()> {
    if is_empty_file(path) {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(GENERATION_HEADER)?;
        writer.flush()?;
    }
    Ok(())
}

fn reader(path: &Path) -> Result<Option<csv::Reader<std::fs::File>>> {
    if is_empty_file(path) {
        return Ok(None);
    }
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    Ok(Some(reader))
}

/// Rates recorded in every `Session Summary` row of `path`. Rows whose rate
/// does not parse are skipped.
pub fn summary_rates(path: &Path) -> Result<Vec<f64>> {
    let Some(mut reader) = reader(path)? else {
        return Ok(Vec::new());
    };
    let mut rates = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.get(0) != Some(SUMMARY_MARKER) {
            continue;
        }
        if let Some(rate) = record
            .get(3)
            .and_then(|r| r.trim().trim_end_matches('%').trim().parse::<f64>().ok())
        {
            rates.push(rate);
        }
    }
    Ok(rates)
}

/// Generation rows of `path`, skipping summary rows.
pub fn generation_rows(path: &Path) -> Result<Vec<GenerationRow>> {
    let Some(mut reader) = reader(path)? else {
        return Ok(Vec::new());
    };
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() < GENERATION_HEADER.len() {
            continue;
        }
        let Ok(id) = record[0].parse::<u32>() else {
            continue;
        };
        rows.push(GenerationRow {
            id,
            timestamp: record[1].to_string(),
            description: record[2].to_string(),
            duration_secs: record[3].parse().unwrap_or_default(),
            model: record[4].to_string(),
            elapsed_secs: record[5].parse().unwrap_or_default(),
            files: parse_file_list(&record[6]),
        });
    }
    Ok(rows)
}

/// The two CSV files a session writes to.
#[derive(Debug, Clone)]
pub struct Ledger {
    session_csv: PathBuf,
    global_csv: PathBuf,
}

impl Ledger {
    pub fn new(session_dir: &Path, sessions_root: &Path) -> Self {
        Self {
            session_csv: session_dir.join(SESSION_CSV),
            global_csv: sessions_root.join(GLOBAL_CSV),
        }
    }

    pub fn session_csv(&self) -> &Path {
        &self.session_csv
    }

    pub fn global_csv(&self) -> &Path {
        &self.global_csv
    }

    /// Per-session file first, then the shared one.
    pub fn files(&self) -> [&Path; 2] {
        [&self.session_csv, &self.global_csv]
    }

    pub fn init(&self) -> Result<()> {
        for path in self.files() {
            ensure_header(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelVariant;
    use chrono::Local;

    fn generation(id: u32, files: Vec<PathBuf>) -> Generation {
        Generation {
            id,
            timestamp: Local::now(),
            description: "lofi, with \"quotes\", and commas".into(),
            duration_secs: 5,
            model: ModelVariant::Small,
            elapsed_secs: 1.25,
            files,
        }
    }

    #[test]
    fn test_usage_rate() {
        assert_eq!(UsageSummary::new(0, 0).usage_rate, 0.0);
        assert_eq!(UsageSummary::new(0, 3).usage_rate, 0.0);
        assert_eq!(UsageSummary::new(3, 1).usage_rate, 33.33);
        assert_eq!(UsageSummary::new(6, 6).usage_rate, 100.0);
    }

    #[test]
    fn test_overall_rate() {
        assert_eq!(overall_rate(&[], 42.5), 42.5);
        assert_eq!(overall_rate(&[10.0, 20.0], 30.0), 20.0);
        assert_eq!(overall_rate(&[100.0, 0.0], 0.0), 33.33);
    }

    #[test]
    fn test_file_list_round_trip() {
        let files = vec![PathBuf::from("a/b.wav"), PathBuf::from("c d.wav")];
        let field = format_file_list(&files);
        assert_eq!(field, "['a/b.wav', 'c d.wav']");
        assert_eq!(parse_file_list(&field), files);
        assert!(parse_file_list("[]").is_empty());
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SESSION_CSV);
        ensure_header(&path).unwrap();
        ensure_header(&path).unwrap();
        append_record(&path, None, &generation_record(&generation(1, vec![]))).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("Generation ID").count(), 1);
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_generation_rows_skip_summaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SESSION_CSV);
        ensure_header(&path).unwrap();
        let files = vec![
            PathBuf::from("x/output_0.wav"),
            PathBuf::from("x/output_1.wav"),
        ];
        append_record(&path, None, &generation_record(&generation(1, files.clone()))).unwrap();
        append_record(&path, None, &UsageSummary::new(3, 1).record_with_rate(33.33)).unwrap();

        let rows = generation_rows(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 1);
        assert_eq!(rows[0].description, "lofi, with \"quotes\", and commas");
        assert_eq!(rows[0].duration_secs, 5);
        assert_eq!(rows[0].model, "small");
        assert_eq!(rows[0].elapsed_secs, 1.25);
        assert_eq!(rows[0].files, files);
    }

    #[test]
    fn test_summary_rates_ignore_generation_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(GLOBAL_CSV);
        ensure_header(&path).unwrap();
        append_record(&path, None, &generation_record(&generation(1, vec![]))).unwrap();
        append_record(&path, None, &UsageSummary::new(3, 3).record_with_rate(100.0)).unwrap();
        append_record(&path, None, &UsageSummary::new(3, 0).record_with_rate(0.0)).unwrap();

        assert_eq!(summary_rates(&path).unwrap(), vec![100.0, 0.0]);
    }

    #[test]
    fn test_summary_header_only_for_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.csv");
        let record = UsageSummary::new(3, 2).record_with_rate(66.67);
        append_record(&path, Some(&SESSION_SUMMARY_HEADER[..]), &record).unwrap();
        append_record(&path, Some(&SESSION_SUMMARY_HEADER[..]), &record).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("Tracks Generated").count(), 1);
        assert!(text.contains("Session Summary,3,2,66.67%"));
        assert_eq!(summary_rates(&path).unwrap(), vec![66.67, 66.67]);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.csv");
        assert!(summary_rates(&path).unwrap().is_empty());
        assert!(generation_rows(&path).unwrap().is_empty());
    }
}
