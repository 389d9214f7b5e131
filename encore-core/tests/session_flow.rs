use std::path::{Path, PathBuf};

use encore_core::ledger::{generation_rows, summary_rates};
use encore_core::{
    GenerationRequest, ModelVariant, Relay, SeparatorConfig, SineLoader, Stem, Studio,
    StudioConfig,
};

/// Stand-in separator. It is run as `sh -m <script> -o <out> -n <model> <input>`,
/// so the script sees the output flag as `$1`.
const FAKE_SEPARATOR: &str = r#"
out="$2"
model="$4"
name=$(basename "$5" .wav)
dir="$out/$model/$name"
mkdir -p "$dir"
echo "separating $name"
echo "100%|##########|" 1>&2
: > "$dir/drums.wav"
: > "$dir/piano.wav"
"#;

const FAILING_SEPARATOR: &str = r#"
echo "model not found" 1>&2
exit 3
"#;

fn studio_with(root: &Path, script: Option<&str>) -> Studio {
    let mut config = StudioConfig {
        sessions_root: root.join("Sessions"),
        ..Default::default()
    };
    if let Some(script) = script {
        let path = root.join("separator.sh");
        std::fs::write(&path, script).unwrap();
        config.separator = SeparatorConfig {
            interpreter: PathBuf::from("sh"),
            module: path.to_string_lossy().into_owned(),
            model: "htdemucs_6s".into(),
        };
    }
    Studio::new(config, Box::new(SineLoader::default())).with_relay(Relay::Discard)
}

fn request(description: &str, duration: u32) -> GenerationRequest {
    GenerationRequest::new(description, duration, ModelVariant::Small)
}

#[test]
fn test_single_generation_scenario() {
    let tmp = tempfile::tempdir().unwrap();
    let mut studio = studio_with(tmp.path(), None);

    let outcome = studio.generate(&request("test", 5)).unwrap();
    assert!(outcome.is_ok(), "{}", outcome.status);
    assert_eq!(outcome.generation_id, Some(1));

    let session = studio.session().unwrap();
    let generation_dir = session.dir().join("generation_1");
    for (index, clip) in outcome.clips.iter().enumerate() {
        let clip = clip.as_ref().expect("clip written");
        assert!(clip.starts_with(&generation_dir));
        assert!(clip.is_file());
        let name = clip.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, format!("output_{}_{}.wav", index, session.suffix()));
    }

    let rows = generation_rows(session.ledger().session_csv()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, 1);
    assert_eq!(rows[0].duration_secs, 5);
    assert_eq!(rows[0].model, "small");
    assert_eq!(rows[0].description, "test");

    let global = generation_rows(session.ledger().global_csv()).unwrap();
    assert_eq!(global, rows);

    assert_eq!(studio.history().len(), 1);
    assert_eq!(studio.history().entries()[0].id, 1);
}

#[test]
fn test_sequential_generations_get_consecutive_ids() {
    let tmp = tempfile::tempdir().unwrap();
    let mut studio = studio_with(tmp.path(), None);

    let ids: Vec<Option<u32>> = ["a", "b", "c"]
        .iter()
        .map(|d| studio.generate(&request(d, 1)).unwrap().generation_id)
        .collect();
    assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);

    let session = studio.session().unwrap();
    let rows = generation_rows(session.ledger().session_csv()).unwrap();
    let row_ids: Vec<u32> = rows.iter().map(|r| r.id).collect();
    assert_eq!(row_ids, vec![1, 2, 3]);
    assert_eq!(studio.history().len(), 3);
    assert_eq!(studio.generation_count(), 3);
}

#[test]
fn test_history_paths_match_ledger() {
    let tmp = tempfile::tempdir().unwrap();
    let mut studio = studio_with(tmp.path(), None);
    studio.generate(&request("first", 1)).unwrap();
    studio.generate(&request("second", 2)).unwrap();

    let session_csv = studio.session().unwrap().ledger().session_csv().to_path_buf();
    let rows = generation_rows(&session_csv).unwrap();
    for row in rows {
        let entry = studio.history().get(row.id).unwrap();
        assert_eq!(entry.files, row.files);
        assert_eq!(entry.description, row.description);
    }
    assert_eq!(
        studio.history().list(),
        vec![
            ("1".to_string(), "first".to_string()),
            ("2".to_string(), "second".to_string())
        ]
    );
}

#[cfg(unix)]
#[test]
fn test_separation_reports_produced_subset() {
    let tmp = tempfile::tempdir().unwrap();
    let mut studio = studio_with(tmp.path(), Some(FAKE_SEPARATOR));
    let outcome = studio.generate(&request("test", 1)).unwrap();
    let clip = outcome.clips[1].clone().unwrap();

    let separation = studio.separate(Some(&clip), 1, 1).unwrap();
    assert!(separation.is_ok(), "{}", separation.message);

    let found: Vec<Stem> = separation.found().map(|(stem, _)| stem).collect();
    assert_eq!(found, vec![Stem::Drums, Stem::Piano]);

    let expected_dir = studio
        .session()
        .unwrap()
        .dir()
        .join("generation_1/STEMS/htdemucs_6s")
        .join(clip.file_stem().unwrap());
    assert_eq!(separation.stems[0], Some(expected_dir.join("drums.wav")));
    assert_eq!(separation.stems[3], Some(expected_dir.join("piano.wav")));
}

#[cfg(unix)]
#[test]
fn test_separation_targets_the_clips_own_generation() {
    let tmp = tempfile::tempdir().unwrap();
    let mut studio = studio_with(tmp.path(), Some(FAKE_SEPARATOR));
    let first = studio.generate(&request("old", 1)).unwrap();
    studio.generate(&request("new", 1)).unwrap();

    let old_clip = studio.history().lookup(1)[0].clone();
    assert_eq!(old_clip, first.clips[0]);
    studio.separate(old_clip.as_deref(), 1, 0).unwrap();

    let session = studio.session().unwrap();
    assert!(session.dir().join("generation_1/STEMS").is_dir());
    assert!(!session.dir().join("generation_2/STEMS").exists());
}

#[cfg(unix)]
#[test]
fn test_failing_tool_reports_all_stems_absent() {
    let tmp = tempfile::tempdir().unwrap();
    let mut studio = studio_with(tmp.path(), Some(FAILING_SEPARATOR));
    let outcome = studio.generate(&request("test", 1)).unwrap();

    let separation = studio.separate(outcome.clips[0].as_deref(), 1, 0).unwrap();
    assert_eq!(separation.stems, encore_core::StemSlots::default());
    assert_eq!(separation.message, "Error during separation.");
}

#[cfg(unix)]
#[test]
fn test_separate_all_updates_both_ledgers() {
    let tmp = tempfile::tempdir().unwrap();

    let mut studio = studio_with(tmp.path(), Some(FAKE_SEPARATOR));
    let outcome = studio.generate(&request("test", 1)).unwrap();
    let clips = [outcome.clips[0].clone(), None, outcome.clips[2].clone()];

    let bulk = studio.separate_all(&clips, 1).unwrap();
    assert_eq!(bulk.slots.len(), 15);
    assert!(bulk.clip(0)[0].is_some());
    assert!(bulk.clip(1).iter().all(Option::is_none));
    assert!(bulk.clip(2)[3].is_some());
    assert_eq!(bulk.summary.tracks_generated, 3);
    assert_eq!(bulk.summary.tracks_separated, 2);
    assert_eq!(bulk.summary.usage_rate, 66.67);
    assert_eq!(bulk.overall_rate, 66.67);

    let session_csv = studio.session().unwrap().ledger().session_csv().to_path_buf();
    let global_csv = studio.session().unwrap().ledger().global_csv().to_path_buf();
    assert_eq!(summary_rates(&session_csv).unwrap(), vec![66.67]);
    assert_eq!(summary_rates(&global_csv).unwrap(), vec![66.67]);

    // A later run in the same root averages with the earlier summary.
    let mut later = studio_with(tmp.path(), Some(FAKE_SEPARATOR));
    let outcome = later.generate(&request("again", 1)).unwrap();
    let bulk = later
        .separate_all(&[outcome.clips[0].clone(), None, None], 1)
        .unwrap();
    assert_eq!(bulk.summary.usage_rate, 33.33);
    assert_eq!(bulk.overall_rate, 50.0);
    assert_eq!(summary_rates(&global_csv).unwrap(), vec![66.67, 50.0]);
}
