use std::fmt;
use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic as CodespanDiagnostic, Label};
use serde::{Deserialize, Serialize};

use crate::document::ChapterCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    /// Capability notices; never counted as a warning.
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

/// Pipeline stage that raised a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Parse,
    Cache,
    Extract,
    Link,
    Enrich,
    Finalize,
    Io,
}

/// One structured error, warning or notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Stable kebab-case identifier, e.g. `untitled-chapter`.
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<ChapterCode>,
    pub stage: Stage,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        stage: Stage,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            severity,
            code: code.into(),
            message: message.into(),
            line: None,
            column: None,
            context: None,
            chapter: None,
            stage,
        }
    }

    pub fn error(stage: Stage, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, stage, code, message)
    }

    pub fn warning(stage: Stage, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, stage, code, message)
    }

    pub fn info(stage: Stage, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, stage, code, message)
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn in_chapter(mut self, chapter: Option<ChapterCode>) -> Self {
        self.chapter = chapter;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }

    /// Convert to a codespan-reporting diagnostic. `span` is the byte range
    /// of the offending source line, when the caller can resolve it.
    pub fn to_codespan(&self, file_id: usize, span: Option<Range<usize>>) -> CodespanDiagnostic<usize> {
        let severity = match self.severity {
            Severity::Error => codespan_reporting::diagnostic::Severity::Error,
            Severity::Warning => codespan_reporting::diagnostic::Severity::Warning,
            Severity::Info => codespan_reporting::diagnostic::Severity::Note,
        };
        let mut notes = Vec::new();
        if let Some(context) = &self.context {
            notes.push(format!("context: {}", context));
        }
        if let Some(chapter) = &self.chapter {
            notes.push(format!("chapter: {}", chapter));
        }
        let labels = match span {
            Some(span) => vec![Label::primary(file_id, span)],
            None => Vec::new(),
        };
        CodespanDiagnostic::new(severity)
            .with_message(&self.message)
            .with_code(&self.code)
            .with_labels(labels)
            .with_notes(notes)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.severity.as_str(), self.code)?;
        if let Some(line) = self.line {
            write!(f, " line {}", line)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Append-only collector for the diagnostics of one compile job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    records: Vec<Diagnostic>,
}

/// Severity counts at the end of a compile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticCounts {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
}

impl DiagnosticCounts {
    pub fn is_success(&self) -> bool {
        self.errors == 0
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => tracing::debug!(code = %diagnostic.code, "error: {}", diagnostic.message),
            Severity::Warning => tracing::debug!(code = %diagnostic.code, "warning: {}", diagnostic.message),
            Severity::Info => tracing::trace!(code = %diagnostic.code, "info: {}", diagnostic.message),
        }
        self.records.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.push(diagnostic);
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter().filter(move |d| d.severity == severity)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.with_severity(Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.with_severity(Severity::Warning)
    }

    pub fn with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Diagnostic> {
        self.records.iter().filter(move |d| d.code == code)
    }

    pub fn has_errors(&self) -> bool {
        self.records.iter().any(Diagnostic::is_error)
    }

    pub fn counts(&self) -> DiagnosticCounts {
        let mut counts = DiagnosticCounts::default();
        for record in &self.records {
            match record.severity {
                Severity::Error => counts.errors += 1,
                Severity::Warning => counts.warnings += 1,
                Severity::Info => counts.infos += 1,
            }
        }
        counts
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.records
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_severity() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::warning(Stage::Parse, "untitled-chapter", "no title").at_line(3));
        diags.push(Diagnostic::info(Stage::Extract, "capability-disabled", "contrast disabled"));
        diags.push(Diagnostic::error(Stage::Enrich, "pass-failed", "boom"));

        let counts = diags.counts();
        assert_eq!(counts.errors, 1);
        assert_eq!(counts.warnings, 1);
        assert_eq!(counts.infos, 1);
        assert!(!counts.is_success());
        assert_eq!(diags.with_code("untitled-chapter").count(), 1);
    }

    #[test]
    fn display_includes_code_and_line() {
        let diag = Diagnostic::warning(Stage::Parse, "unterminated-fence", "fence never closed").at_line(12);
        assert_eq!(diag.to_string(), "warning[unterminated-fence] line 12: fence never closed");
    }
}
