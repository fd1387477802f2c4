//! Log read queries: validation, search and paging.

use serde_json::{json, Value};
use std::collections::HashMap;

use crate::logs::store::{DateBucket, LogSystem};

/// Upper bound on lines returned by one read.
pub const MAX_PAGE_LINES: usize = 10_000;

/// Validated `GET /logger` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub system: LogSystem,
    pub date: DateBucket,
    pub lines: usize,
    pub start: usize,
    /// Lowercased search term; empty matches everything.
    pub search: String,
}

impl LogQuery {
    /// Parse query parameters. Errors are client-facing messages.
    pub fn from_params(
        params: &HashMap<String, String>,
        default_lines: usize,
    ) -> Result<Self, &'static str> {
        let system = params
            .get("type")
            .and_then(|t| t.parse::<LogSystem>().ok())
            .ok_or("Invalid type parameter")?;

        let date = params
            .get("date")
            .and_then(|d| d.parse::<DateBucket>().ok())
            .ok_or("Invalid date format. Use MMDDYYYY")?;

        let lines = match params.get("lines") {
            Some(v) => v.parse::<usize>().map_err(|_| "Invalid lines parameter")?,
            None => default_lines,
        }
        .min(MAX_PAGE_LINES);

        let start = match params.get("start") {
            Some(v) => v.parse::<usize>().map_err(|_| "Invalid start parameter")?,
            None => 0,
        };

        let search = params
            .get("search")
            .map(|s| s.to_lowercase())
            .unwrap_or_default();

        Ok(Self {
            system,
            date,
            lines,
            start,
            search,
        })
    }
}

/// One page of a log bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPage {
    pub content: String,
    /// Matching lines before paging.
    pub total_lines: usize,
}

impl LogPage {
    /// Filter by the case-insensitive search term, then slice.
    pub fn select(lines: &[String], query: &LogQuery) -> Self {
        let matching: Vec<&str> = lines
            .iter()
            .map(String::as_str)
            .filter(|line| query.search.is_empty() || line.to_lowercase().contains(&query.search))
            .collect();

        let content = matching
            .iter()
            .skip(query.start)
            .take(query.lines)
            .copied()
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            content,
            total_lines: matching.len(),
        }
    }

    /// Payload that gets signed.
    pub fn to_payload(&self, query: &LogQuery, request_id: &str, timestamp_ms: i64) -> Value {
        json!({
            "content": self.content,
            "lines": query.lines,
            "start": query.start,
            "totalLines": self.total_lines,
            "timestamp": timestamp_ms,
            "requestId": request_id,
            "type": query.system.as_str(),
            "date": query.date.as_str(),
        })
    }
}
