use crate::layout::StateLayout;
use crate::StoreError;
use bringup_schema::{RunId, TargetId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const EXTENSION: &str = "jsonl";

/// First line of every run log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct Header {
    record: String,
    run_id: RunId,
    target: TargetId,
    started_at: String,
}

/// What `bringup runs` shows for one log without replaying it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunLogSummary {
    pub run_id: RunId,
    pub target: TargetId,
    pub started_at: String,
    /// `outcome` of the final record, if the Run finished.
    pub outcome: Option<String>,
    pub records: usize,
    pub path: PathBuf,
}

/// Append-only JSON-lines log of one Run.
pub struct RunLogWriter {
    run_id: RunId,
    path: PathBuf,
    out: BufWriter<File>,
}

impl RunLogWriter {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one record as a single line and flush it, so a crash loses at
    /// most the record being written.
    pub fn append<T: Serialize>(&mut self, record: &T) -> Result<(), StoreError> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<PathBuf, StoreError> {
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        Ok(self.path)
    }
}

pub struct RunLogStore {
    layout: StateLayout,
}

impl RunLogStore {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    fn path_of(&self, run_id: &str) -> PathBuf {
        self.layout.runs_dir().join(format!("{run_id}.{EXTENSION}"))
    }

    /// Open a new log named `<target>-<YYYYmmddTHHMMSSZ>`, suffixed when a
    /// Run against the same Target started within the same second.
    pub fn create(
        &self,
        target: &TargetId,
        started_at: DateTime<Utc>,
    ) -> Result<RunLogWriter, StoreError> {
        let dir = self.layout.runs_dir();
        fs::create_dir_all(&dir)?;
        let base = format!("{target}-{}", started_at.format("%Y%m%dT%H%M%SZ"));

        let mut n = 1u32;
        let (run_id, path, file) = loop {
            let candidate = if n == 1 {
                base.clone()
            } else {
                format!("{base}-{n}")
            };
            let path = self.path_of(&candidate);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (RunId::new(candidate), path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e.into()),
            }
        };
        debug!("run log: {}", path.display());

        let mut writer = RunLogWriter {
            run_id: run_id.clone(),
            path,
            out: BufWriter::new(file),
        };
        writer.append(&Header {
            record: "header".to_owned(),
            run_id,
            target: target.clone(),
            started_at: started_at.to_rfc3339(),
        })?;
        Ok(writer)
    }

    /// Every record of a run log, header included.
    pub fn load(&self, run_id: &str) -> Result<Vec<serde_json::Value>, StoreError> {
        let path = self.path_of(run_id);
        if !path.exists() {
            return Err(StoreError::RunNotFound(run_id.to_owned()));
        }
        let reader = BufReader::new(File::open(&path)?);
        let lines: Vec<String> = reader
            .lines()
            .filter(|l| l.as_ref().map_or(true, |l| !l.trim().is_empty()))
            .collect::<Result<_, _>>()?;
        let mut records = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                // torn final record from an interrupted write
                Err(e) if i + 1 == lines.len() && i > 0 => {
                    warn!("run log '{run_id}': ignoring incomplete last record: {e}");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(records)
    }

    fn summarize(&self, run_id: &str) -> Result<RunLogSummary, StoreError> {
        let records = self.load(run_id)?;
        let header: Header = match records.first() {
            Some(first) => serde_json::from_value(first.clone())?,
            None => return Err(StoreError::RunNotFound(run_id.to_owned())),
        };
        let outcome = records
            .last()
            .and_then(|r| r.get("outcome"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);
        Ok(RunLogSummary {
            run_id: header.run_id,
            target: header.target,
            started_at: header.started_at,
            outcome,
            records: records.len(),
            path: self.path_of(run_id),
        })
    }

    /// All readable logs, oldest first. Unreadable logs are skipped.
    pub fn list(&self) -> Result<Vec<RunLogSummary>, StoreError> {
        let dir = self.layout.runs_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.summarize(stem) {
                Ok(summary) => results.push(summary),
                Err(e) => warn!("skipping unreadable run log '{stem}': {e}"),
            }
        }
        results.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        Ok(results)
    }

    pub fn list_for(&self, target: &TargetId) -> Result<Vec<RunLogSummary>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|s| &s.target == target)
            .collect())
    }

    pub fn remove(&self, run_id: &str) -> Result<(), StoreError> {
        let path = self.path_of(run_id);
        if !path.exists() {
            return Err(StoreError::RunNotFound(run_id.to_owned()));
        }
        fs::remove_file(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store(dir: &Path) -> RunLogStore {
        let layout = StateLayout::new(dir);
        layout.initialize().unwrap();
        RunLogStore::new(layout)
    }

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, 15, 9).unwrap()
    }

    #[test]
    fn log_name_combines_target_and_start_time() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let writer = store.create(&TargetId::from("192.168.8.1"), at(9)).unwrap();
        assert_eq!(writer.run_id().as_str(), "192.168.8.1-20260314T091509Z");
        assert!(writer.path().ends_with("runs/192.168.8.1-20260314T091509Z.jsonl"));
    }

    #[test]
    fn same_second_runs_get_distinct_logs() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let target = TargetId::from("192.168.8.1");
        let a = store.create(&target, at(9)).unwrap();
        let b = store.create(&target, at(9)).unwrap();
        assert_ne!(a.run_id(), b.run_id());
        assert!(b.run_id().ends_with("-2"));
    }

    #[test]
    fn records_are_appended_and_summarized() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut writer = store.create(&TargetId::from("10.0.0.7"), at(10)).unwrap();
        writer
            .append(&serde_json::json!({"event": "stepStarted", "step": "network"}))
            .unwrap();
        writer
            .append(&serde_json::json!({"record": "result", "outcome": "partially_succeeded"}))
            .unwrap();
        let run_id = writer.run_id().clone();
        writer.finish().unwrap();

        let records = store.load(&run_id).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["record"], "header");
        assert_eq!(records[1]["step"], "network");

        let runs = store.list().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].outcome.as_deref(), Some("partially_succeeded"));
        assert_eq!(runs[0].records, 3);
    }

    #[test]
    fn unfinished_run_has_no_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let writer = store.create(&TargetId::from("10.0.0.7"), at(10)).unwrap();
        drop(writer);
        assert_eq!(store.list().unwrap()[0].outcome, None);
    }

    #[test]
    fn list_is_ordered_and_filterable() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.create(&TargetId::from("b"), at(12)).unwrap();
        store.create(&TargetId::from("a"), at(11)).unwrap();
        store.create(&TargetId::from("a"), at(13)).unwrap();

        let all = store.list().unwrap();
        let targets: Vec<&str> = all.iter().map(|s| s.target.as_str()).collect();
        assert_eq!(targets, ["a", "b", "a"]);
        assert_eq!(store.list_for(&TargetId::from("a")).unwrap().len(), 2);
    }

    #[test]
    fn missing_run_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert!(matches!(
            store.load("nope"),
            Err(StoreError::RunNotFound(_))
        ));
        assert!(store.remove("nope").is_err());
    }

    #[test]
    fn corrupted_log_is_skipped_in_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.create(&TargetId::from("a"), at(11)).unwrap();
        fs::write(dir.path().join("runs/garbage.jsonl"), "not json\n").unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
