use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use crate::diagnostics::{Diagnostic, Stage};
use crate::document::{ChapterCode, Difficulty};

/// How many non-blank lines a boundary marker may look ahead for its title.
pub const TITLE_LOOKAHEAD: usize = 5;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static INLINE_CHAPTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s{0,3}#{1,3}\s+(?:chapter|ch\.)\s*(\d+)\b\s*[:.\-–—]?\s*(.*?)\s*#*\s*$")
        .expect("inline chapter pattern")
});

static CHAPTER_LIKE_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s{0,3}#{1,3}\s+(?:chapter|ch\.)(?:\s|$|[:.])").expect("chapter-like pattern")
});

static COMMENT_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*<!--\s*chapter\b[\s:]*(\d+)?\s*(?:[:\-–—]\s*(.*?))?\s*-->\s*$")
        .expect("comment marker pattern")
});

static BANNER_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*={3,}\s*chapter\s+(\d+)\s*(?:[:\-–—]\s*(.*?))?\s*=*\s*$")
        .expect("banner marker pattern")
});

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{0,3}#{1,6}\s+(.+?)\s*#*\s*$").expect("heading pattern"));

static BOLD_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\*\*(.+?)\*\*\s*$").expect("bold line pattern"));

static DIFFICULTY_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*(?:\[\s*([a-z]+)\s*\]|\(\s*(?:difficulty|level)\s*:\s*([a-z]+)\s*\))\s*$")
        .expect("difficulty pattern")
});

// ---------------------------------------------------------------------------
// Scan result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScannedChapter {
    pub number: u32,
    pub code: ChapterCode,
    pub title: Option<String>,
    pub difficulty: Option<Difficulty>,
    /// Line of the heading or boundary marker (1-based).
    pub marker_line: u32,
    pub end_line: u32,
}

#[derive(Debug, Default)]
pub(crate) struct Scan {
    pub chapters: Vec<ScannedChapter>,
    /// Title lines adopted by a boundary marker; blanked before structural parsing.
    pub consumed: BTreeSet<u32>,
    /// Fence openers that never close; their fence characters are neutralized.
    pub neutralized: BTreeSet<u32>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Split the document into chapters. Fenced code is verbatim: nothing inside
/// a fence is recognized as a marker. An unterminated fence is neutralized and
/// the scan is repeated so markers after it are still found.
pub(crate) fn scan(lines: &[&str]) -> Scan {
    let mut neutralized = BTreeSet::new();
    loop {
        let attempt = scan_once(lines, &neutralized);
        match attempt.unterminated {
            Some(line) if !neutralized.contains(&line) => {
                neutralized.insert(line);
            }
            _ => {
                let mut diagnostics: Vec<Diagnostic> = neutralized
                    .iter()
                    .map(|&line| {
                        Diagnostic::warning(
                            Stage::Parse,
                            "unterminated-fence",
                            "code fence is never closed; its content is treated as text",
                        )
                        .at_line(line)
                    })
                    .collect();
                diagnostics.extend(attempt.diagnostics);
                diagnostics.sort_by_key(|d| d.line);
                return Scan {
                    chapters: attempt.chapters,
                    consumed: attempt.consumed,
                    neutralized,
                    diagnostics,
                };
            }
        }
    }
}

struct Attempt {
    chapters: Vec<ScannedChapter>,
    consumed: BTreeSet<u32>,
    diagnostics: Vec<Diagnostic>,
    unterminated: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
struct Fence {
    marker: u8,
    len: usize,
    line: u32,
}

enum Marker {
    Heading {
        number: u32,
        title: Option<String>,
    },
    Boundary {
        number: Option<u32>,
        title: Option<String>,
    },
    Malformed(&'static str),
}

fn scan_once(lines: &[&str], neutralized: &BTreeSet<u32>) -> Attempt {
    let mut chapters: Vec<ScannedChapter> = Vec::new();
    let mut consumed = BTreeSet::new();
    let mut diagnostics = Vec::new();
    let mut seen_numbers: HashMap<u32, u32> = HashMap::new();
    let mut fence: Option<Fence> = None;

    for (i, raw) in lines.iter().enumerate() {
        let line_no = i as u32 + 1;
        let text = raw.trim_end_matches('\r');

        if let Some(open) = fence {
            if closes_fence(text, open) {
                fence = None;
            }
            continue;
        }
        if consumed.contains(&line_no) {
            continue;
        }
        if let Some((marker, len)) = opens_fence(text) {
            if !neutralized.contains(&line_no) {
                fence = Some(Fence {
                    marker,
                    len,
                    line: line_no,
                });
            }
            continue;
        }

        let (number, raw_title) = match match_marker(text) {
            None => continue,
            Some(Marker::Malformed(message)) => {
                diagnostics.push(
                    Diagnostic::warning(Stage::Parse, "malformed-chapter-heading", message)
                    .at_line(line_no)
                    .with_context(text.trim()),
                );
                continue;
            }
            Some(Marker::Boundary { number: None, .. }) => {
                diagnostics.push(
                    Diagnostic::warning(
                        Stage::Parse,
                        "malformed-chapter-marker",
                        "chapter boundary marker without a chapter number; ignored",
                    )
                    .at_line(line_no)
                    .with_context(text.trim()),
                );
                continue;
            }
            Some(Marker::Heading { number, title }) => (number, title),
            Some(Marker::Boundary {
                number: Some(number),
                title: Some(title),
            }) => (number, Some(title)),
            Some(Marker::Boundary {
                number: Some(number),
                title: None,
            }) => match lookahead_title(lines, i + 1, number) {
                Some((title_line, title)) => {
                    consumed.insert(title_line);
                    (number, Some(title))
                }
                None => (number, None),
            },
        };

        let (title, difficulty) = match raw_title {
            Some(raw_title) => {
                let (title, difficulty, unknown_tag) = split_difficulty(&raw_title);
                if let Some(tag) = unknown_tag {
                    diagnostics.push(
                        Diagnostic::warning(
                            Stage::Parse,
                            "unknown-difficulty",
                            format!("unrecognized difficulty tag '{}'", tag),
                        )
                        .at_line(line_no),
                    );
                }
                (title, difficulty)
            }
            None => (None, None),
        };

        let seen = seen_numbers.entry(number).or_insert(0);
        *seen += 1;
        let code = if *seen == 1 {
            ChapterCode::from_number(number)
        } else {
            let code = ChapterCode::duplicate(number, *seen);
            diagnostics.push(
                Diagnostic::warning(
                    Stage::Parse,
                    "duplicate-chapter",
                    format!("chapter {} appears more than once; renamed to {}", number, code),
                )
                .at_line(line_no)
                .in_chapter(Some(code.clone())),
            );
            code
        };

        if title.is_none() {
            diagnostics.push(
                Diagnostic::warning(
                    Stage::Parse,
                    "untitled-chapter",
                    format!("chapter {} has no title", number),
                )
                .at_line(line_no)
                .in_chapter(Some(code.clone())),
            );
        }

        if let Some(previous) = chapters.last_mut() {
            previous.end_line = line_no - 1;
        }
        chapters.push(ScannedChapter {
            number,
            code,
            title,
            difficulty,
            marker_line: line_no,
            end_line: lines.len() as u32,
        });
    }

    Attempt {
        chapters,
        consumed,
        diagnostics,
        unterminated: fence.map(|f| f.line),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn match_marker(text: &str) -> Option<Marker> {
    if let Some(caps) = INLINE_CHAPTER.captures(text) {
        let Ok(number) = caps[1].parse() else {
            return Some(Marker::Malformed(
                "chapter number is out of range; kept as a section",
            ));
        };
        return Some(Marker::Heading {
            number,
            title: non_empty(caps.get(2).map(|m| m.as_str())),
        });
    }
    if CHAPTER_LIKE_HEADING.is_match(text) {
        return Some(Marker::Malformed(
            "chapter-like heading without a chapter number; kept as a section",
        ));
    }
    if let Some(caps) = COMMENT_MARKER
        .captures(text)
        .or_else(|| BANNER_MARKER.captures(text))
    {
        return Some(Marker::Boundary {
            number: caps.get(1).and_then(|m| m.as_str().parse().ok()),
            title: non_empty(caps.get(2).map(|m| m.as_str())),
        });
    }
    None
}

/// Find a title for a boundary marker in the next few non-blank lines.
/// Returns the (1-based) line that supplied the title.
fn lookahead_title(lines: &[&str], from: usize, number: u32) -> Option<(u32, String)> {
    let mut inspected = 0;
    for (j, raw) in lines.iter().enumerate().skip(from) {
        let text = raw.trim_end_matches('\r');
        if text.trim().is_empty() {
            continue;
        }
        inspected += 1;
        if inspected > TITLE_LOOKAHEAD || opens_fence(text).is_some() {
            return None;
        }
        let line_no = j as u32 + 1;
        if let Some(caps) = INLINE_CHAPTER.captures(text) {
            // `<!-- CHAPTER 3 -->` followed by `# Chapter 3: Title` names the same chapter.
            let same = caps[1].parse::<u32>().ok() == Some(number);
            return match non_empty(caps.get(2).map(|m| m.as_str())) {
                Some(title) if same => Some((line_no, title)),
                _ => None,
            };
        }
        if COMMENT_MARKER.is_match(text) || BANNER_MARKER.is_match(text) {
            return None;
        }
        if let Some(caps) = HEADING.captures(text).or_else(|| BOLD_LINE.captures(text)) {
            if let Some(title) = non_empty(Some(&caps[1])) {
                return Some((line_no, title));
            }
        }
    }
    None
}

fn opens_fence(text: &str) -> Option<(u8, usize)> {
    let trimmed = text.trim_start_matches(' ');
    if text.len() - trimmed.len() > 3 {
        return None;
    }
    let marker = *trimmed.as_bytes().first()?;
    if marker != b'`' && marker != b'~' {
        return None;
    }
    let len = trimmed.bytes().take_while(|&b| b == marker).count();
    if len < 3 {
        return None;
    }
    // Backtick info strings may not contain backticks.
    if marker == b'`' && trimmed[len..].contains('`') {
        return None;
    }
    Some((marker, len))
}

fn closes_fence(text: &str, fence: Fence) -> bool {
    let trimmed = text.trim_start_matches(' ');
    if text.len() - trimmed.len() > 3 {
        return false;
    }
    let len = trimmed.bytes().take_while(|&b| b == fence.marker).count();
    len >= fence.len && trimmed[len..].trim().is_empty()
}

/// Split a trailing difficulty tag off a title.
/// Returns (title, difficulty, unrecognized tag text).
fn split_difficulty(raw: &str) -> (Option<String>, Option<Difficulty>, Option<String>) {
    let cleaned = clean_title(raw);
    let Some(caps) = DIFFICULTY_TAG.captures(&cleaned) else {
        return (non_empty(Some(&cleaned)), None, None);
    };
    let tag = caps
        .get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    match Difficulty::parse(&tag) {
        Some(difficulty) => {
            let start = caps.get(0).map(|m| m.start()).unwrap_or(cleaned.len());
            (non_empty(Some(&cleaned[..start])), Some(difficulty), None)
        }
        None => (non_empty(Some(&cleaned)), None, Some(tag)),
    }
}

fn clean_title(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '*' || c == '_' || c == '#')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(text: Option<&str>) -> Option<String> {
    let cleaned = clean_title(text?);
    if cleaned.is_empty() { None } else { Some(cleaned) }
}
