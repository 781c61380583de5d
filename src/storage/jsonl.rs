//! Append-only JSONL files
//!
//! One JSON object per line. Writers hold an exclusive `fs2` lock while
//! appending and readers a shared one, so lines from different processes
//! never interleave.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{StoreError, StoreResult};

/// Typed append-only log of `T` records
pub struct JsonlLog<T> {
    path: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T> JsonlLog<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record
    pub fn append(&self, record: &T) -> StoreResult<()> {
        self.append_all(std::slice::from_ref(record))
    }

    /// Appends records under a single lock
    pub fn append_all(&self, records: &[T]) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let mut writer = BufWriter::new(&file);
        for record in records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        // Lock is released when file is dropped
        Ok(())
    }

    /// Reads every record in file order
    pub fn read_all(&self) -> StoreResult<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        file.lock_shared()?;

        let reader = BufReader::new(&file);
        let mut records = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let record = serde_json::from_str(&line).map_err(|e| {
                StoreError::Corrupt(format!(
                    "{} line {}: {}",
                    self.path.display(),
                    line_num + 1,
                    e
                ))
            })?;
            records.push(record);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Line {
        n: u32,
    }

    #[test]
    fn read_missing_log() {
        let dir = TempDir::new().unwrap();
        let log: JsonlLog<Line> = JsonlLog::new(dir.path().join("log.jsonl"));

        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn append_keeps_order() {
        let dir = TempDir::new().unwrap();
        let log = JsonlLog::new(dir.path().join("log.jsonl"));

        log.append(&Line { n: 1 }).unwrap();
        log.append_all(&[Line { n: 2 }, Line { n: 3 }]).unwrap();

        let lines = log.read_all().unwrap();
        assert_eq!(lines, vec![Line { n: 1 }, Line { n: 2 }, Line { n: 3 }]);
    }

    #[test]
    fn creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let log = JsonlLog::new(dir.path().join("nested").join("log.jsonl"));

        log.append(&Line { n: 1 }).unwrap();
        assert!(log.path().exists());
    }

    #[test]
    fn corrupt_line_names_its_position() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");
        fs::write(&path, "{\"n\":1}\n\nnot json\n").unwrap();

        let log: JsonlLog<Line> = JsonlLog::new(&path);
        let err = log.read_all().unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn concurrent_appends_do_not_interleave() {
        let dir = TempDir::new().unwrap();
        let log = JsonlLog::new(dir.path().join("log.jsonl"));

        std::thread::scope(|s| {
            for t in 0..4 {
                let log = &log;
                s.spawn(move || {
                    for i in 0..25 {
                        log.append(&Line { n: t * 100 + i }).unwrap();
                    }
                });
            }
        });

        assert_eq!(log.read_all().unwrap().len(), 100);
    }
}
