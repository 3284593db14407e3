//! Per-item diagnostics for dropped requests, ads and keyword values.
//!
//! The transformation engine never fails a whole `build` or `interpret` call
//! because of one malformed item. Instead it reports the problem to a
//! [`DiagnosticSink`] supplied by the caller and carries on.

use std::fmt;
use std::sync::Mutex;

use serde::Serialize;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
}

/// The engine component that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Validation,
    Sizes,
    Keywords,
    AdPod,
    RequestBuilder,
    ResponseInterpreter,
    Native,
    Rtd,
    UserId,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Sizes => "sizes",
            Self::Keywords => "keywords",
            Self::AdPod => "adpod",
            Self::RequestBuilder => "request_builder",
            Self::ResponseInterpreter => "response_interpreter",
            Self::Native => "native",
            Self::Rtd => "rtd",
            Self::UserId => "user_id",
        };
        f.write_str(name)
    }
}

/// A single non-fatal problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub component: Component,
    /// What the diagnostic is about: a bid id, ad unit code, keyword key, etc.
    pub subject: String,
    pub message: String,
}

impl Diagnostic {
    pub fn warn(component: Component, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warn,
            component,
            subject: subject.into(),
            message: message.into(),
        }
    }

    pub fn info(component: Component, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            component,
            subject: subject.into(),
            message: message.into(),
        }
    }

    pub fn debug(
        component: Component,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Debug,
            component,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.component, self.subject, self.message)
    }
}

/// Receiver for diagnostics. Implementations must be safe to share between
/// threads because a single sink may observe concurrent `build` calls.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Debug => log::debug!("{}", diagnostic),
            Severity::Info => log::info!("{}", diagnostic),
            Severity::Warn => log::warn!("{}", diagnostic),
        }
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn report(&self, _diagnostic: Diagnostic) {}
}

/// Keeps diagnostics in memory so callers can inspect them afterwards.
#[derive(Debug, Default)]
pub struct CollectingSink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    #[must_use]
    pub fn entries(&self) -> Vec<Diagnostic> {
        match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    #[must_use]
    pub fn count_for(&self, component: Component) -> usize {
        self.entries()
            .iter()
            .filter(|d| d.component == component)
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diagnostic: Diagnostic) {
        match self.entries.lock() {
            Ok(mut guard) => guard.push(diagnostic),
            Err(poisoned) => poisoned.into_inner().push(diagnostic),
        }
    }
}
