use std::fmt;

use serde::Serialize;
use ssm::{Diagnostic, Diagnostics, Stage};

/// Common surface of optional extractors and enrichment passes.
pub trait Capability {
    fn name(&self) -> &'static str;

    /// Whether the implementation can run in this build.
    fn available(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Extractor,
    Pass,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::Extractor => f.write_str("extractor"),
            CapabilityKind::Pass => f.write_str("pass"),
        }
    }
}

/// One registry entry as reported by `ssmc passes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityStatus {
    pub kind: CapabilityKind,
    pub name: &'static str,
    pub available: bool,
    pub enabled: bool,
}

/// Pick the entries that will run, in registry order.
///
/// Disabled or unavailable entries get an info diagnostic; names in
/// `disabled` that match nothing get a warning.
pub fn select<'a, T>(
    kind: CapabilityKind,
    registry: &'a [Box<T>],
    disabled: &[String],
    diagnostics: &mut Diagnostics,
) -> Vec<&'a T>
where
    T: Capability + ?Sized,
{
    let stage = match kind {
        CapabilityKind::Extractor => Stage::Extract,
        CapabilityKind::Pass => Stage::Enrich,
    };

    for name in disabled {
        if !registry.iter().any(|entry| entry.name() == name) {
            diagnostics.push(Diagnostic::warning(
                stage,
                "unknown-capability",
                format!("unknown {} '{}' in disabled list", kind, name),
            ));
        }
    }

    let mut active = Vec::with_capacity(registry.len());
    for entry in registry {
        let reason = if disabled.iter().any(|d| d == entry.name()) {
            Some("disabled by configuration")
        } else if !entry.available() {
            Some("not available")
        } else {
            None
        };
        match reason {
            Some(reason) => {
                tracing::debug!(%kind, name = entry.name(), reason, "capability skipped");
                diagnostics.push(Diagnostic::info(
                    stage,
                    "capability-disabled",
                    format!("{} '{}' {}", kind, entry.name(), reason),
                ));
            }
            None => active.push(entry.as_ref()),
        }
    }
    active
}

pub fn describe<T>(kind: CapabilityKind, registry: &[Box<T>], disabled: &[String]) -> Vec<CapabilityStatus>
where
    T: Capability + ?Sized,
{
    registry
        .iter()
        .map(|entry| CapabilityStatus {
            kind,
            name: entry.name(),
            available: entry.available(),
            enabled: entry.available() && !disabled.iter().any(|d| d == entry.name()),
        })
        .collect()
}
