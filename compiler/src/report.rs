use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ssm::{Block, BlockKind, Diagnostic, Diagnostics, Severity, Stage};

/// Diagnostics sidecar written next to the SSM output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub validation_errors: Vec<Diagnostic>,
    pub validation_warnings: Vec<Diagnostic>,
    pub infos: Vec<Diagnostic>,
    pub summary: Summary,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total_blocks: usize,
    /// Includes validation errors.
    pub error_count: usize,
    pub warning_count: usize,
    pub compiler_version: String,
    pub schema_version: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub blocks_by_type: BTreeMap<String, usize>,
    pub chapters: usize,
    pub chapters_reused: usize,
    pub chapters_recompiled: usize,
    pub relations: usize,
    pub links: usize,
}

impl Report {
    pub fn build(blocks: &[Block], diagnostics: &Diagnostics, namespace: &str, chapters: usize, reused: usize) -> Self {
        let mut report = Report {
            errors: Vec::new(),
            warnings: Vec::new(),
            validation_errors: Vec::new(),
            validation_warnings: Vec::new(),
            infos: Vec::new(),
            summary: Summary {
                total_blocks: blocks.len(),
                error_count: 0,
                warning_count: 0,
                compiler_version: crate::COMPILER_VERSION.to_string(),
                schema_version: ssm::SCHEMA_VERSION.to_string(),
                namespace: namespace.to_string(),
            },
            metrics: Metrics {
                chapters,
                chapters_reused: reused,
                chapters_recompiled: chapters.saturating_sub(reused),
                ..Metrics::default()
            },
        };

        for diagnostic in diagnostics {
            let validation = diagnostic.stage == Stage::Finalize;
            let bucket = match (diagnostic.severity, validation) {
                (Severity::Error, false) => &mut report.errors,
                (Severity::Error, true) => &mut report.validation_errors,
                (Severity::Warning, false) => &mut report.warnings,
                (Severity::Warning, true) => &mut report.validation_warnings,
                (Severity::Info, _) => &mut report.infos,
            };
            bucket.push(diagnostic.clone());
        }
        let counts = diagnostics.counts();
        report.summary.error_count = counts.errors;
        report.summary.warning_count = counts.warnings;

        for block in blocks {
            *report
                .metrics
                .blocks_by_type
                .entry(block.block_type().to_string())
                .or_default() += 1;
            if matches!(block.kind, BlockKind::Relation(_)) {
                report.metrics.relations += 1;
            }
            report.metrics.links += block.links.len();
        }
        report
    }

    pub fn is_success(&self) -> bool {
        self.summary.error_count == 0
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
