use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;

use crate::error::SinkError;
use crate::record::Record;

pub const ARTIFACT_SUFFIX: &str = "_skeets.jsonl.gz";

/// Same-second flushes get `_1`, `_2`, ... up to this many attempts.
const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// What one flush produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub records: usize,
    /// Records that failed to serialize and were left out.
    pub skipped: usize,
}

/// Durable destination for drained batches.
///
/// `write` is blocking; the collector runs it off the async runtime.
pub trait RecordSink: Send + Sync {
    /// Prepare the destination (directories, handles) before the first write.
    fn init(&self) -> Result<(), SinkError> {
        Ok(())
    }

    fn write(&self, batch: Vec<Record>) -> Result<Artifact, SinkError>;
}

// ═══════════════════════════════════════════════════════════════
//  GzipJsonlSink
// ═══════════════════════════════════════════════════════════════

/// Writes each batch to its own gzip file, one compact JSON record per line.
#[derive(Debug, Clone)]
pub struct GzipJsonlSink {
    data_dir: PathBuf,
    level: Compression,
}

impl GzipJsonlSink {
    /// `level` is clamped to 0-9.
    pub fn new(data_dir: impl Into<PathBuf>, level: u32) -> Self {
        Self {
            data_dir: data_dir.into(),
            level: Compression::new(level.min(9)),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Write any serializable batch as an artifact stamped with the current time.
    pub fn write_records<R: Serialize>(&self, batch: &[R]) -> Result<Artifact, SinkError> {
        self.write_at(Utc::now(), batch)
    }

    /// Write `batch` as an artifact named after `now`.
    ///
    /// Records that fail to serialize are skipped. Any I/O failure removes
    /// the partially written file, so an artifact that exists after `Ok` is
    /// always complete.
    pub fn write_at<R: Serialize>(
        &self,
        now: DateTime<Utc>,
        batch: &[R],
    ) -> Result<Artifact, SinkError> {
        if batch.is_empty() {
            return Err(SinkError::EmptyBatch);
        }

        let (path, file) = self.create_artifact(now)?;
        match self.encode_into(file, batch, &path) {
            Ok((records, skipped)) => Ok(Artifact { path, records, skipped }),
            Err(e) => {
                if let Err(rm) = std::fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %rm, "could not remove partial artifact");
                }
                Err(e)
            }
        }
    }

    /// Reserve a fresh file name. Never truncates an existing artifact.
    fn create_artifact(&self, now: DateTime<Utc>) -> Result<(PathBuf, File), SinkError> {
        let mut attempt = 0;
        loop {
            let path = self.data_dir.join(artifact_name(now, attempt));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                    tracing::debug!(path = %path.display(), "artifact name taken, trying next suffix");
                    attempt += 1;
                }
                Err(source) => return Err(SinkError::Create { path, source }),
            }
        }
    }

    fn encode_into<R: Serialize>(
        &self,
        file: File,
        batch: &[R],
        path: &Path,
    ) -> Result<(usize, usize), SinkError> {
        let write_err = |source: std::io::Error| SinkError::Write { path: path.to_path_buf(), source };
        let finish_err = |source: std::io::Error| SinkError::Finish { path: path.to_path_buf(), source };

        let mut gz = GzEncoder::new(BufWriter::new(file), self.level);
        let mut line = Vec::with_capacity(1024);
        let mut written = 0;
        let mut skipped = 0;

        for (index, record) in batch.iter().enumerate() {
            line.clear();
            if let Err(e) = serde_json::to_writer(&mut line, record) {
                tracing::warn!(path = %path.display(), index, error = %e, "could not encode record, skipping");
                skipped += 1;
                continue;
            }
            line.push(b'\n');
            gz.write_all(&line).map_err(write_err)?;
            written += 1;
        }

        let buffered = gz.finish().map_err(finish_err)?;
        let file = buffered
            .into_inner()
            .map_err(|e| finish_err(e.into_error()))?;
        file.sync_all().map_err(finish_err)?;
        Ok((written, skipped))
    }
}

impl RecordSink for GzipJsonlSink {
    fn init(&self) -> Result<(), SinkError> {
        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o755);
        }
        builder.create(&self.data_dir).map_err(|source| SinkError::CreateDir {
            path: self.data_dir.clone(),
            source,
        })
    }

    fn write(&self, batch: Vec<Record>) -> Result<Artifact, SinkError> {
        self.write_records(&batch)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Helpers
// ═══════════════════════════════════════════════════════════════

/// `2024-11-20T14:03:07Z_skeets.jsonl.gz`, or `..._<n>_skeets.jsonl.gz`
/// for the n-th collision within the same second.
pub fn artifact_name(now: DateTime<Utc>, attempt: u32) -> String {
    let ts = now.format("%Y-%m-%dT%H:%M:%SZ");
    if attempt == 0 {
        format!("{ts}{ARTIFACT_SUFFIX}")
    } else {
        format!("{ts}_{attempt}{ARTIFACT_SUFFIX}")
    }
}

/// Decompress an artifact and decode every line back into a record.
pub fn read_artifact(path: &Path) -> Result<Vec<Record>, SinkError> {
    let file = File::open(path).map_err(|source| SinkError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(GzDecoder::new(file));

    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| SinkError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| SinkError::Decode {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}
