//! Append-only log storage bucketed by system and day.

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum LogStoreError {
    #[error("log bucket not found")]
    NotFound,
    #[error("log storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Which log a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogSystem {
    Request,
    App,
}

impl LogSystem {
    pub fn as_str(self) -> &'static str {
        match self {
            LogSystem::Request => "request",
            LogSystem::App => "app",
        }
    }

    /// Records typed `request` go to the request log, everything else to app.
    pub fn for_record_type(record_type: Option<&str>) -> Self {
        match record_type {
            Some("request") => LogSystem::Request,
            _ => LogSystem::App,
        }
    }
}

impl fmt::Display for LogSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogSystem {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "request" => Ok(LogSystem::Request),
            "app" => Ok(LogSystem::App),
            _ => Err(()),
        }
    }
}

/// Day bucket in `MMDDYYYY` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DateBucket(String);

impl DateBucket {
    pub fn today() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.format("%m%d%Y").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DateBucket {
    type Err = ();

    /// Accepts exactly eight digits forming a real calendar date.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(());
        }
        NaiveDate::parse_from_str(s, "%m%d%Y")
            .map(|_| Self(s.to_string()))
            .map_err(|_| ())
    }
}

impl fmt::Display for DateBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage for ingested log records.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append one record as a single line.
    async fn append(
        &self,
        system: LogSystem,
        bucket: &DateBucket,
        record: &Value,
    ) -> Result<(), LogStoreError>;

    /// All lines of a bucket, oldest first.
    async fn read(&self, system: LogSystem, bucket: &DateBucket) -> Result<Vec<String>, LogStoreError>;
}

/// Newline-delimited JSON files under `<root>/<system>/<MMDDYYYY>.log`.
pub struct FsLogStore {
    root: PathBuf,
    append_lock: Mutex<()>,
}

impl FsLogStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn bucket_path(&self, system: LogSystem, bucket: &DateBucket) -> PathBuf {
        self.root
            .join(system.as_str())
            .join(format!("{}.log", bucket.as_str()))
    }
}

#[async_trait]
impl LogStore for FsLogStore {
    async fn append(
        &self,
        system: LogSystem,
        bucket: &DateBucket,
        record: &Value,
    ) -> Result<(), LogStoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let path = self.bucket_path(system, bucket);
        // Serialize appends so concurrent lines never interleave
        let _guard = self.append_lock.lock().await;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read(&self, system: LogSystem, bucket: &DateBucket) -> Result<Vec<String>, LogStoreError> {
        let path = self.bucket_path(system, bucket);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(LogStoreError::NotFound),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}
