//! Shell audit trail
//!
//! Every terminal outcome of the shell gate is recorded here. The log is a
//! bounded in-memory ring buffer: once full, the oldest entry is dropped.

use crate::level::{ShellSource, TrustLevel};
use crate::redact::redact;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

/// Default number of entries kept
pub const AUDIT_CAPACITY: usize = 500;

/// What happened to a shell command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    /// Allowed without confirmation
    Allowed,
    /// Denied by a rule, the denylist or the trust policy
    Denied,
    /// Allowed after the user approved it
    Confirmed,
    /// Stopped at confirmation
    Blocked,
    /// High-risk command let through by the bypass flag
    Bypassed,
    /// Ran; carries exit code and duration
    Executed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Allowed => "allowed",
            AuditOutcome::Denied => "denied",
            AuditOutcome::Confirmed => "confirmed",
            AuditOutcome::Blocked => "blocked",
            AuditOutcome::Bypassed => "bypassed",
            AuditOutcome::Executed => "executed",
        }
    }
}

/// A single audit entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShellAuditEntry {
    pub timestamp: DateTime<Utc>,

    /// Command text, redacted
    pub command: String,

    pub source: ShellSource,

    pub trust_level: TrustLevel,

    pub cwd: PathBuf,

    pub outcome: AuditOutcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ShellAuditEntry {
    /// Create an entry stamped with the current time
    pub fn new(command: &str, source: ShellSource, cwd: &Path, outcome: AuditOutcome) -> Self {
        Self {
            timestamp: Utc::now(),
            command: redact(command),
            source,
            trust_level: source.trust_level(),
            cwd: cwd.to_path_buf(),
            outcome,
            reason: None,
            exit_code: None,
            duration_ms: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(redact(&reason.into()));
        self
    }

    pub fn with_execution(mut self, exit_code: Option<i32>, duration_ms: u64) -> Self {
        self.exit_code = exit_code;
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Destination for audit entries
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: ShellAuditEntry);
}

/// Bounded in-memory audit log
#[derive(Debug)]
pub struct AuditLog {
    entries: Mutex<VecDeque<ShellAuditEntry>>,
    capacity: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(AUDIT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(AUDIT_CAPACITY))),
            capacity: capacity.max(1),
        }
    }

    /// The process-wide log
    pub fn global() -> &'static AuditLog {
        static GLOBAL: OnceLock<AuditLog> = OnceLock::new();
        GLOBAL.get_or_init(AuditLog::new)
    }

    /// Append an entry, dropping the oldest when full
    pub fn push(&self, entry: ShellAuditEntry) {
        let mut entries = self.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Most recent entries first
    pub fn recent(&self, limit: usize) -> Vec<ShellAuditEntry> {
        self.query(AuditQuery::default().limit(limit))
    }

    /// Query with a filter, most recent first
    pub fn query(&self, query: AuditQuery) -> Vec<ShellAuditEntry> {
        let entries = self.lock();
        let matching = entries.iter().rev().filter(|entry| query.matches(entry)).cloned();
        match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }

    /// Get statistics
    pub fn stats(&self, since: Option<DateTime<Utc>>) -> AuditStats {
        let mut query = AuditQuery::default();
        if let Some(since) = since {
            query = query.since(since);
        }

        let mut stats = AuditStats::default();
        for entry in self.query(query) {
            stats.total += 1;
            match entry.outcome {
                AuditOutcome::Allowed => stats.allowed += 1,
                AuditOutcome::Denied => stats.denied += 1,
                AuditOutcome::Confirmed => stats.confirmed += 1,
                AuditOutcome::Blocked => stats.blocked += 1,
                AuditOutcome::Bypassed => stats.bypassed += 1,
                AuditOutcome::Executed => stats.executed += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ShellAuditEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for AuditLog {
    fn record(&self, entry: ShellAuditEntry) {
        self.push(entry);
    }
}

/// Forwards to [`AuditLog::global`]
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalAudit;

impl AuditSink for GlobalAudit {
    fn record(&self, entry: ShellAuditEntry) {
        AuditLog::global().push(entry);
    }
}

/// Query parameters for the audit log
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    source: Option<ShellSource>,
    outcome: Option<AuditOutcome>,
    trust_level: Option<TrustLevel>,
    since: Option<DateTime<Utc>>,
    limit: Option<usize>,
}

impl AuditQuery {
    /// Filter by source
    pub fn source(mut self, source: ShellSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Filter by outcome
    pub fn outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Filter by trust level
    pub fn trust_level(mut self, level: TrustLevel) -> Self {
        self.trust_level = Some(level);
        self
    }

    /// Filter by time
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Limit results
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, entry: &ShellAuditEntry) -> bool {
        if self.source.is_some_and(|s| s != entry.source) {
            return false;
        }
        if self.outcome.is_some_and(|o| o != entry.outcome) {
            return false;
        }
        if self.trust_level.is_some_and(|t| t != entry.trust_level) {
            return false;
        }
        if self.since.is_some_and(|since| entry.timestamp < since) {
            return false;
        }
        true
    }
}

/// Audit statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    pub total: usize,
    pub allowed: usize,
    pub denied: usize,
    pub confirmed: usize,
    pub blocked: usize,
    pub bypassed: usize,
    pub executed: usize,
}

impl AuditStats {
    /// Percentage of decisions that stopped a command
    pub fn block_rate(&self) -> f64 {
        let decisions = self.total - self.executed;
        if decisions == 0 {
            return 0.0;
        }
        ((self.denied + self.blocked) as f64) / (decisions as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(command: &str, source: ShellSource, outcome: AuditOutcome) -> ShellAuditEntry {
        ShellAuditEntry::new(command, source, Path::new("/work"), outcome)
    }

    #[test]
    fn test_ring_buffer_keeps_newest() {
        let log = AuditLog::new();
        for i in 0..(AUDIT_CAPACITY + 25) {
            log.push(entry(&format!("echo {}", i), ShellSource::Bash, AuditOutcome::Allowed));
        }
        assert_eq!(log.len(), AUDIT_CAPACITY);

        let recent = log.recent(1);
        assert_eq!(recent[0].command, format!("echo {}", AUDIT_CAPACITY + 24));

        let all = log.query(AuditQuery::default());
        assert_eq!(all.last().unwrap().command, "echo 25");
    }

    #[test]
    fn test_query_filters() {
        let log = AuditLog::with_capacity(10);
        log.push(entry("ls", ShellSource::Bash, AuditOutcome::Allowed));
        log.push(entry("rm -rf x", ShellSource::Bash, AuditOutcome::Blocked));
        log.push(entry("echo hi", ShellSource::ShellInterpolation, AuditOutcome::Denied));
        log.push(entry("git status", ShellSource::GitHelper, AuditOutcome::Allowed));

        assert_eq!(log.query(AuditQuery::default().outcome(AuditOutcome::Allowed)).len(), 2);
        assert_eq!(log.query(AuditQuery::default().source(ShellSource::Bash)).len(), 2);
        assert_eq!(
            log.query(AuditQuery::default().trust_level(TrustLevel::Implicit))[0].command,
            "echo hi"
        );
        assert_eq!(log.recent(2).len(), 2);
    }

    #[test]
    fn test_stats() {
        let log = AuditLog::with_capacity(10);
        log.push(entry("ls", ShellSource::Bash, AuditOutcome::Allowed));
        log.push(entry("rm -rf x", ShellSource::Bash, AuditOutcome::Blocked));
        log.push(entry("ls", ShellSource::Bash, AuditOutcome::Executed).with_execution(Some(0), 12));

        let stats = log.stats(None);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.blocked, 1);
        assert_eq!(stats.executed, 1);
        assert_eq!(stats.block_rate(), 50.0);

        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_entries_are_redacted() {
        let e = entry("GITHUB_TOKEN=abc npm publish", ShellSource::Bash, AuditOutcome::Allowed)
            .with_reason("token=abc");
        assert_eq!(e.command, "GITHUB_TOKEN=[REDACTED] npm publish");
        assert_eq!(e.reason.as_deref(), Some("token=[REDACTED]"));
        assert_eq!(e.trust_level, TrustLevel::Explicit);
    }
}
