use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::Result;
use crate::journal::SessionLog;
use crate::ledger::Ledger;

const DIR_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
pub const LOG_FILE: &str = "session.log";
pub const STEMS_DIR: &str = "STEMS";

/// One run of the studio: a timestamped directory with its log and ledgers.
#[derive(Debug)]
pub struct Session {
    started_at: DateTime<Local>,
    root: PathBuf,
    dir: PathBuf,
    log: SessionLog,
    ledger: Ledger,
}

impl Session {
    /// Create `root/session_<timestamp>` with its log and CSV ledgers.
    pub fn start(root: &Path) -> Result<Self> {
        Self::start_at(root, Local::now())
    }

    pub fn start_at(root: &Path, started_at: DateTime<Local>) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = unique_session_dir(root, &started_at);
        std::fs::create_dir_all(&dir)?;

        let mut log = SessionLog::open(&dir.join(LOG_FILE))?;
        log.info("=== New session started ===");

        let ledger = Ledger::new(&dir, root);
        ledger.init()?;
        log.info(&format!(
            "CSV log files created: {}, {}",
            ledger.session_csv().display(),
            ledger.global_csv().display()
        ));

        Ok(Self {
            started_at,
            root: root.to_path_buf(),
            dir,
            log,
            ledger,
        })
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// The sessions root shared by every run.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Basename of the session directory, appended to clip file names.
    pub fn suffix(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn generation_dir(&self, generation_id: u32) -> PathBuf {
        self.dir.join(format!("generation_{}", generation_id))
    }

    pub fn stems_dir(&self, generation_id: u32) -> PathBuf {
        self.generation_dir(generation_id).join(STEMS_DIR)
    }

    /// Path of clip `index` (0-based) of a generation.
    pub fn clip_path(&self, generation_id: u32, index: usize) -> PathBuf {
        self.generation_dir(generation_id)
            .join(format!("output_{}_{}.wav", index, self.suffix()))
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    pub fn log(&mut self) -> &mut SessionLog {
        &mut self.log
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}

fn unique_session_dir(root: &Path, started_at: &DateTime<Local>) -> PathBuf {
    let base = format!("session_{}", started_at.format(DIR_TIMESTAMP_FORMAT));
    let mut dir = root.join(&base);
    let mut n = 2;
    while dir.exists() {
        dir = root.join(format!("{}-{}", base, n));
        n += 1;
    }
    dir
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).single().unwrap()
    }

    #[test]
    fn test_start_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("Sessions");
        let session = Session::start_at(&root, fixed_time()).unwrap();

        assert_eq!(session.dir(), root.join("session_2024-03-09_14-05-07"));
        assert!(session.dir().join(LOG_FILE).is_file());
        assert_eq!(session.log_path(), session.dir().join(LOG_FILE));
        assert!(session.dir().join("session.csv").is_file());
        assert!(root.join("all_sessions.csv").is_file());

        let log = std::fs::read_to_string(session.dir().join(LOG_FILE)).unwrap();
        assert!(log.contains("=== New session started ==="));
    }

    #[test]
    fn test_paths_follow_generation_id() {
        let tmp = tempfile::tempdir().unwrap();
        let session = Session::start_at(tmp.path(), fixed_time()).unwrap();

        assert_eq!(session.suffix(), "session_2024-03-09_14-05-07");
        assert_eq!(session.generation_dir(3), session.dir().join("generation_3"));
        assert_eq!(
            session.stems_dir(3),
            session.dir().join("generation_3").join("STEMS")
        );
        assert_eq!(
            session.clip_path(2, 1),
            session
                .dir()
                .join("generation_2")
                .join("output_1_session_2024-03-09_14-05-07.wav")
        );
    }

    #[test]
    fn test_same_second_sessions_get_distinct_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let first = Session::start_at(tmp.path(), fixed_time()).unwrap();
        let second = Session::start_at(tmp.path(), fixed_time()).unwrap();

        assert_ne!(first.dir(), second.dir());
        assert!(second.suffix().ends_with("-2"));
    }

    #[test]
    fn test_shared_ledger_keeps_existing_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let global = tmp.path().join("all_sessions.csv");
        std::fs::write(&global, "Generation ID,Timestamp\n1,earlier\n").unwrap();

        Session::start_at(tmp.path(), fixed_time()).unwrap();

        let text = std::fs::read_to_string(&global).unwrap();
        assert_eq!(text, "Generation ID,Timestamp\n1,earlier\n");
    }
}
