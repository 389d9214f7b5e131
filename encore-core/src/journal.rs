use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use log::Level;

use crate::error::Result;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only `session.log` inside a session directory.
///
/// Every line is also forwarded to the `log` facade so the console sees it.
pub struct SessionLog {
    path: PathBuf,
    writer: LineWriter<File>,
}

impl SessionLog {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: LineWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&mut self, message: &str) {
        self.write(Level::Info, message);
    }

    pub fn warn(&mut self, message: &str) {
        self.write(Level::Warn, message);
    }

    pub fn error(&mut self, message: &str) {
        self.write(Level::Error, message);
    }

    fn write(&mut self, level: Level, message: &str) {
        log::log!(level, "{}", message);
        let stamp = Local::now().format(TIMESTAMP_FORMAT);
        if let Err(e) = writeln!(self.writer, "{} - {} - {}", stamp, level, message) {
            log::warn!("could not write to {}: {}", self.path.display(), e);
        }
    }
}

impl std::fmt::Debug for SessionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLog").field("path", &self.path).finish()
    }
}
