//! Structured logging for sysalloc stress and evidence runs.
//!
//! Provides:
//! - [`LogEntry`]: one JSONL record with required + optional fields.
//! - [`LogEmitter`]: writes JSONL lines to a file or an in-memory buffer.
//! - [`validate_log_line`] / [`validate_log_file`]: check JSONL against the schema.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sysalloc_core::{SysAllocLogLevel, SysAllocLogRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<SysAllocLogLevel> for LogLevel {
    fn from(level: SysAllocLogLevel) -> Self {
        match level {
            SysAllocLogLevel::Trace => Self::Trace,
            SysAllocLogLevel::Debug => Self::Debug,
            SysAllocLogLevel::Info => Self::Info,
            SysAllocLogLevel::Warn => Self::Warn,
            SysAllocLogLevel::Error => Self::Error,
        }
    }
}

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    // Required
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    // Optional
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    /// Hex address, `0x...`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ptr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alignment: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taken_bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oom_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Create a new log entry with required fields only.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            decision_id: None,
            symbol: None,
            backend: None,
            ptr: None,
            size: None,
            alignment: None,
            outcome: None,
            taken_bytes: None,
            oom_count: None,
            details: None,
        }
    }

    /// Convert an allocator lifecycle record.
    #[must_use]
    pub fn from_record(record: &SysAllocLogRecord) -> Self {
        let mut entry = Self::new(record.trace_id.clone(), record.level.into(), record.event);
        entry.decision_id = Some(record.decision_id);
        entry.symbol = Some(record.symbol.to_string());
        entry.backend = record.backend.map(str::to_string);
        entry.ptr = record.ptr.map(|p| format!("{p:#x}"));
        entry.size = record.size;
        entry.alignment = record.alignment;
        entry.outcome = Some(record.outcome.to_string());
        entry.taken_bytes = Some(record.taken_bytes);
        entry.oom_count = Some(record.oom_count);
        if !record.details.is_empty() {
            entry.details = Some(serde_json::Value::String(record.details.clone()));
        }
        entry
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

enum Sink {
    File(std::io::BufWriter<std::fs::File>),
    Buffer(Vec<u8>),
}

/// Writes structured JSONL log entries.
pub struct LogEmitter {
    sink: Sink,
    run_id: String,
    seq: u64,
    lines: usize,
}

impl LogEmitter {
    /// Create an emitter that writes to a file.
    pub fn to_file(path: &Path, run_id: &str) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self {
            sink: Sink::File(std::io::BufWriter::new(file)),
            run_id: run_id.to_string(),
            seq: 0,
            lines: 0,
        })
    }

    /// Create an emitter that collects lines in memory.
    #[must_use]
    pub fn to_buffer(run_id: &str) -> Self {
        Self {
            sink: Sink::Buffer(Vec::new()),
            run_id: run_id.to_string(),
            seq: 0,
            lines: 0,
        }
    }

    /// Trace id for harness-level events: `harness::<run_id>::<seq>`.
    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("harness::{}::{:03}", self.run_id, self.seq)
    }

    /// A harness-level entry with the next trace id, not yet written.
    pub fn entry(&mut self, level: LogLevel, event: &str) -> LogEntry {
        let trace_id = self.next_trace_id();
        LogEntry::new(trace_id, level, event)
    }

    /// Emit a harness-level event with a generated trace id.
    pub fn emit(&mut self, level: LogLevel, event: &str) -> std::io::Result<LogEntry> {
        let entry = self.entry(level, event);
        self.emit_entry(&entry)?;
        Ok(entry)
    }

    pub fn emit_entry(&mut self, entry: &LogEntry) -> std::io::Result<()> {
        let line = entry.to_jsonl().map_err(std::io::Error::other)?;
        match &mut self.sink {
            Sink::File(writer) => writeln!(writer, "{line}")?,
            Sink::Buffer(buf) => writeln!(buf, "{line}")?,
        }
        self.lines += 1;
        Ok(())
    }

    /// Emit every record, oldest first.
    pub fn emit_records<'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a SysAllocLogRecord>,
    ) -> std::io::Result<()> {
        for record in records {
            self.emit_entry(&LogEntry::from_record(record))?;
        }
        Ok(())
    }

    #[must_use]
    pub const fn lines_written(&self) -> usize {
        self.lines
    }

    /// Buffered output, empty for file sinks.
    #[must_use]
    pub fn buffer(&self) -> &[u8] {
        match &self.sink {
            Sink::File(_) => &[],
            Sink::Buffer(buf) => buf,
        }
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.sink {
            Sink::File(writer) => writer.flush(),
            Sink::Buffer(_) => Ok(()),
        }
    }
}

/// Validation error for a log line.
#[derive(Debug)]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: field '{}': {}",
            self.line_number, self.field, self.message
        )
    }
}

/// Validate a single JSONL line against the schema.
pub fn validate_log_line(
    line: &str,
    line_number: usize,
) -> Result<LogEntry, Vec<LogValidationError>> {
    let error = |field: &str, message: String| LogValidationError {
        line_number,
        field: field.to_string(),
        message,
    };

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return Err(vec![error("<json>", format!("invalid JSON: {e}"))]),
    };
    let Some(obj) = value.as_object() else {
        return Err(vec![error("<root>", "expected JSON object".to_string())]);
    };

    let mut errors = Vec::new();
    for field in ["timestamp", "trace_id", "level", "event"] {
        if !obj.contains_key(field) {
            errors.push(error(field, "required field missing".to_string()));
        }
    }

    if let Some(level) = obj.get("level").and_then(|v| v.as_str())
        && !["trace", "debug", "info", "warn", "error"].contains(&level)
    {
        errors.push(error("level", format!("invalid level: '{level}'")));
    }

    if let Some(trace_id) = obj.get("trace_id").and_then(|v| v.as_str())
        && !trace_id.contains("::")
    {
        errors.push(error(
            "trace_id",
            format!("trace_id should be '::'-separated, got: '{trace_id}'"),
        ));
    }

    if let Some(ptr) = obj.get("ptr").and_then(|v| v.as_str())
        && !ptr.starts_with("0x")
    {
        errors.push(error("ptr", format!("ptr should be hex, got: '{ptr}'")));
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    serde_json::from_value::<LogEntry>(value)
        .map_err(|e| vec![error("<deserialization>", format!("failed to deserialize: {e}"))])
}

/// Validate an entire JSONL file. Returns the line count and any errors.
pub fn validate_log_file(path: &Path) -> Result<(usize, Vec<LogValidationError>), std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    let mut all_errors = Vec::new();
    let mut line_count = 0;

    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        line_count += 1;
        if let Err(errs) = validate_log_line(line, i + 1) {
            all_errors.extend(errs);
        }
    }

    Ok((line_count, all_errors))
}

fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    let (year, month, day) = civil_from_days((secs / 86_400) as i64);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{:03}Z",
        (secs % 86_400) / 3600,
        (secs % 3600) / 60,
        secs % 60,
        duration.subsec_millis(),
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian date.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> SysAllocLogRecord {
        SysAllocLogRecord {
            decision_id: 7,
            trace_id: "core::sysalloc::allocate::0000000000000007".to_string(),
            level: SysAllocLogLevel::Debug,
            symbol: "allocate",
            event: "backend_attempt",
            backend: Some("mmap"),
            ptr: Some(0x7f00_0000_1000),
            size: Some(100),
            alignment: Some(16),
            outcome: "success",
            details: String::new(),
            taken_bytes: 4096,
            oom_count: 0,
        }
    }

    #[test]
    fn record_converts_with_hex_pointer() {
        let entry = LogEntry::from_record(&sample_record());
        assert_eq!(entry.level, LogLevel::Debug);
        assert_eq!(entry.ptr.as_deref(), Some("0x7f0000001000"));
        assert_eq!(entry.backend.as_deref(), Some("mmap"));
        assert!(entry.details.is_none());
        let line = entry.to_jsonl().unwrap();
        assert!(!line.contains("\"details\""));
        validate_log_line(&line, 1).unwrap();
    }

    #[test]
    fn emitter_generates_sequential_trace_ids() {
        let mut emitter = LogEmitter::to_buffer("run-42");
        let e1 = emitter.emit(LogLevel::Info, "start").unwrap();
        let e2 = emitter.emit(LogLevel::Info, "end").unwrap();
        assert_eq!(e1.trace_id, "harness::run-42::001");
        assert_eq!(e2.trace_id, "harness::run-42::002");
        assert_eq!(emitter.lines_written(), 2);
        let text = String::from_utf8(emitter.buffer().to_vec()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn validate_missing_required_field() {
        let json = r#"{"timestamp":"2026-01-01T00:00:00Z","level":"info","event":"test"}"#;
        let errs = validate_log_line(json, 3).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].field, "trace_id");
        assert_eq!(errs[0].line_number, 3);
    }

    #[test]
    fn validate_rejects_unknown_level_and_decimal_ptr() {
        let json = r#"{"timestamp":"t","trace_id":"a::b","level":"fatal","event":"e","ptr":"4096"}"#;
        let errs = validate_log_line(json, 1).unwrap_err();
        let fields: Vec<&str> = errs.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["level", "ptr"]);
    }

    #[test]
    fn validate_file_counts_lines_and_reports_bad_ones() {
        let path = std::env::temp_dir().join(format!(
            "sysalloc-validate-{}.jsonl",
            std::process::id()
        ));
        let mut emitter = LogEmitter::to_file(&path, "file-check").unwrap();
        let start = emitter.entry(LogLevel::Info, "start");
        emitter.emit_entry(&start).unwrap();
        emitter.emit_records(&[sample_record()]).unwrap();
        emitter.flush().unwrap();
        drop(emitter);

        let (lines, errors) = validate_log_file(&path).unwrap();
        assert_eq!(lines, 2);
        assert!(errors.is_empty(), "{errors:?}");

        let mut text = std::fs::read_to_string(&path).unwrap();
        text.push('\n');
        text.push_str(r#"{"timestamp":"t","trace_id":"flat","level":"info","event":"e"}"#);
        text.push('\n');
        std::fs::write(&path, text).unwrap();
        let (lines, errors) = validate_log_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(lines, 3, "blank lines are skipped");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "trace_id");
        assert_eq!(errors[0].line_number, 4);
    }

    #[test]
    fn validate_file_missing_is_io_error() {
        let path = std::env::temp_dir().join("sysalloc-no-such-log.jsonl");
        assert!(validate_log_file(&path).is_err());
    }

    #[test]
    fn civil_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(59), (1970, 3, 1));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
        assert_eq!(civil_from_days(19_782), (2024, 2, 29));
    }
}
