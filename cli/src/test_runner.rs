use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use ssm::{Diagnostic, Diagnostics, Severity};
use ssm_compiler::{Compilation, CompileError, CompileOptions, Compiler};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectedDiagnostic {
    /// Diagnostic code, e.g. `relation-incomplete`.
    pub code: String,

    /// If set, the diagnostic must point at this 1-based line of the
    /// markdown below the frontmatter.
    #[serde(default)]
    pub line: Option<u32>,
}

/// How a fixture's cache is prepared before the checked compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSetup {
    /// Compile once to write the cache, then recompile unchanged.
    Warm,
    /// Compile once, overwrite the cache with invalid syntax, then recompile.
    Corrupt,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Namespace to compile under. Defaults to "default".
    #[serde(default)]
    pub namespace: Option<String>,

    /// Extractors or passes to switch off.
    #[serde(default)]
    pub disable: Vec<String>,

    /// Exact block counts per type name; unlisted types are not checked.
    #[serde(default)]
    pub expect_blocks: BTreeMap<String, usize>,

    /// Expected warnings, in emission order. If present (even empty), the
    /// warning count is checked too.
    #[serde(default)]
    pub expect_warnings: Option<Vec<ExpectedDiagnostic>>,

    /// Expected errors. When absent, any error fails the test.
    #[serde(default)]
    pub expect_errors: Option<Vec<ExpectedDiagnostic>>,

    /// If true, the document must be rejected before compiling.
    #[serde(default)]
    pub expect_fatal: bool,

    /// Compile against a cache in a scratch directory. Without it the
    /// fixture never touches a cache.
    #[serde(default)]
    pub cache: Option<CacheSetup>,

    /// Number of chapters the checked compile must take from the cache.
    #[serde(default)]
    pub expect_reused: Option<usize>,
}

impl TestConfig {
    fn options(&self) -> CompileOptions {
        let mut options = CompileOptions {
            namespace: self.namespace.clone(),
            ..CompileOptions::default()
        };
        for name in &self.disable {
            options.disable(name);
        }
        options
    }
}

/// Split a `.test.md` file into its TOML config and markdown source.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}');

    let after_open = content
        .strip_prefix("---")
        .ok_or("missing opening --- frontmatter delimiter")?;
    let after_open = after_open
        .strip_prefix('\n')
        .or_else(|| after_open.strip_prefix("\r\n"))
        .unwrap_or(after_open);

    let close_pos = after_open
        .find("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;

    let toml_str = after_open[..close_pos].trim_end_matches('\r');
    let rest = &after_open[close_pos + 4..];
    let source = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    let config: TestConfig = toml::from_str(toml_str).map_err(|e| format!("TOML parse error: {}", e))?;
    Ok((config, source))
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

impl TestResult {
    fn label(&self) -> &str {
        self.description
            .as_deref()
            .or_else(|| self.path.file_stem().and_then(|s| s.to_str()))
            .unwrap_or("?")
    }
}

fn run_single_test(path: &Path) -> TestResult {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            return TestResult {
                path: path.to_path_buf(),
                description: None,
                outcome: TestOutcome::Fail(format!("cannot read file: {}", e)),
            };
        }
    };

    let (config, source) = match parse_test_file(&content) {
        Ok(pair) => pair,
        Err(e) => {
            return TestResult {
                path: path.to_path_buf(),
                description: None,
                outcome: TestOutcome::Fail(format!("frontmatter error: {}", e)),
            };
        }
    };

    let outcome = match check(&config, source) {
        None => TestOutcome::Pass,
        Some(reason) => TestOutcome::Fail(reason),
    };
    TestResult {
        path: path.to_path_buf(),
        description: config.description,
        outcome,
    }
}

/// Compile `source` under `config`. Returns `Some(reason)` on mismatch.
fn check(config: &TestConfig, source: &str) -> Option<String> {
    let result = match config.cache {
        None => Compiler::new(config.options()).compile_source(source, None),
        Some(setup) => match compile_cached(config, source, setup) {
            Ok(result) => result,
            Err(reason) => return Some(reason),
        },
    };

    let compilation = match (config.expect_fatal, result) {
        (true, Err(_)) => return None,
        (true, Ok(_)) => return Some("expected a fatal error, but the document compiled".into()),
        (false, Err(err)) => return Some(format!("unexpected fatal error: {}", err)),
        (false, Ok(compilation)) => compilation,
    };

    let no_errors = Vec::new();
    let expected_errors = config.expect_errors.as_ref().unwrap_or(&no_errors);
    if let Some(reason) = check_diagnostics("error", &compilation.diagnostics, Severity::Error, expected_errors) {
        return Some(reason);
    }
    if let Some(expected) = &config.expect_warnings {
        if let Some(reason) = check_diagnostics("warning", &compilation.diagnostics, Severity::Warning, expected) {
            return Some(reason);
        }
    }
    if let Some(expected) = config.expect_reused {
        if compilation.reused.len() != expected {
            return Some(format!(
                "expected {} reused chapter(s), got {}",
                expected,
                compilation.reused.len()
            ));
        }
    }
    check_blocks(&compilation, &config.expect_blocks)
}

/// Prime a cache in a scratch directory per `setup`, then compile again.
/// The outer error is a fixture setup failure.
fn compile_cached(
    config: &TestConfig,
    source: &str,
    setup: CacheSetup,
) -> Result<Result<Compilation, CompileError>, String> {
    let dir = tempfile::tempdir().map_err(|e| format!("cannot create scratch directory: {}", e))?;
    let path = dir.path().join("fixture.md");
    std::fs::write(&path, source).map_err(|e| format!("cannot write fixture source: {}", e))?;

    let compiler = Compiler::new(config.options());
    let primed = compiler
        .compile_source(source, Some(&path))
        .map_err(|e| format!("priming compile failed: {}", e))?;
    if setup == CacheSetup::Corrupt {
        let cache = primed.cache_path.ok_or("priming compile wrote no cache")?;
        std::fs::write(&cache, "{ \"source_hash\": ").map_err(|e| format!("cannot corrupt cache: {}", e))?;
    }
    Ok(compiler.compile_source(source, Some(&path)))
}

fn check_diagnostics(
    kind: &str,
    diagnostics: &Diagnostics,
    severity: Severity,
    expected: &[ExpectedDiagnostic],
) -> Option<String> {
    let actual: Vec<&Diagnostic> = diagnostics.with_severity(severity).collect();

    if actual.len() != expected.len() {
        let listed: Vec<String> = actual.iter().map(|d| format!("    - {}", d)).collect();
        return Some(format!(
            "expected {} {}(s), got {}\n  actual {}s:\n{}",
            expected.len(),
            kind,
            actual.len(),
            kind,
            if listed.is_empty() {
                "    (none)".to_string()
            } else {
                listed.join("\n")
            }
        ));
    }

    for (i, (actual, expected)) in actual.iter().zip(expected).enumerate() {
        if actual.code != expected.code {
            return Some(format!(
                "{}[{}]: expected code \"{}\", got: {}",
                kind, i, expected.code, actual
            ));
        }
        if let Some(line) = expected.line {
            match actual.line {
                Some(actual_line) if actual_line == line => {}
                Some(actual_line) => {
                    return Some(format!(
                        "{}[{}]: expected on line {}, but it is on line {}",
                        kind, i, line, actual_line
                    ));
                }
                None => {
                    return Some(format!("{}[{}]: expected on line {}, but it has no line", kind, i, line));
                }
            }
        }
    }

    None
}

fn check_blocks(compilation: &Compilation, expected: &BTreeMap<String, usize>) -> Option<String> {
    let actual = &compilation.report.metrics.blocks_by_type;
    let mismatches: Vec<String> = expected
        .iter()
        .filter_map(|(block_type, &want)| {
            let got = actual.get(block_type).copied().unwrap_or(0);
            (got != want).then(|| format!("  {}: expected {}, got {}", block_type, want, got))
        })
        .collect();
    if mismatches.is_empty() {
        None
    } else {
        Some(format!("block count mismatch\n{}", mismatches.join("\n")))
    }
}

/// `.test.md` files grouped by subfolder relative to `root`, sorted.
/// Files directly in `root` get category "".
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    collect_tests(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_tests(&path, root, out);
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.ends_with(".test.md"))
        {
            let category = path
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            out.entry(category).or_default().push(path);
        }
    }
}

fn category_label(category: &str) -> &str {
    if category.is_empty() { "(root)" } else { category }
}

pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }

    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no .test.md files found in {}", path.display());
        return;
    }

    eprintln!("available categories:");
    for (category, files) in &categories {
        eprintln!("  {} ({} tests)", category_label(category), files.len());
    }
}

struct Style {
    no_color: bool,
}

impl Style {
    fn paint(&self, text: &str, code: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        }
    }

    fn pass(&self) -> String {
        self.paint("PASS", "32")
    }

    fn fail(&self) -> String {
        self.paint("FAIL", "31")
    }

    fn bold(&self, text: &str) -> String {
        self.paint(text, "1")
    }
}

/// Select the categories to run. Unknown requests are reported and skipped.
fn select_categories<'a>(
    all: &'a BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<&'a str, &'a [PathBuf]> {
    if requested.is_empty() {
        return all.iter().map(|(k, v)| (k.as_str(), v.as_slice())).collect();
    }
    let mut selected = BTreeMap::new();
    for request in requested {
        let request = request.trim_matches('/');
        let nested = format!("{}/", request);
        let before = selected.len();
        for (category, files) in all {
            if category == request || category.starts_with(&nested) {
                selected.insert(category.as_str(), files.as_slice());
            }
        }
        if selected.len() == before && !all.contains_key(request) {
            let available: Vec<&str> = all.keys().map(|k| category_label(k)).collect();
            eprintln!(
                "warning: category '{}' not found (available: {})",
                request,
                available.join(", ")
            );
        }
    }
    selected
}

/// Run every `.test.md` under `path` (or the single file), optionally limited
/// to `categories`. Returns the exit code: 0 when everything passed.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let style = Style { no_color };

    let groups: Vec<(String, Vec<PathBuf>)> = if path.is_file() {
        vec![(String::new(), vec![path.to_path_buf()])]
    } else {
        let all = discover_categorized(path);
        if all.is_empty() {
            eprintln!("no .test.md files found in {}", path.display());
            return 1;
        }
        select_categories(&all, categories)
            .into_iter()
            .map(|(category, files)| (category.to_string(), files.to_vec()))
            .collect()
    };
    if groups.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let single = path.is_file();
    let mut passed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();

    for (category, files) in &groups {
        if !single {
            eprintln!();
            eprintln!("{}", style.bold(category_label(category)));
        }
        for file in files {
            let result = run_single_test(file);
            match &result.outcome {
                TestOutcome::Pass => {
                    passed += 1;
                    eprintln!("  {}  {}", style.pass(), result.label());
                }
                TestOutcome::Fail(_) => {
                    eprintln!("  {}  {}", style.fail(), result.label());
                    failures.push(result);
                }
            }
        }
    }

    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for failure in &failures {
            eprintln!();
            eprintln!("  --- {} ---", failure.path.display());
            if let TestOutcome::Fail(reason) = &failure.outcome {
                for line in reason.lines() {
                    eprintln!("  {}", line);
                }
            }
        }
    }

    eprintln!();
    if failures.is_empty() {
        eprintln!("test result: {}. {} passed, 0 failed", style.paint("ok", "32"), passed);
        0
    } else {
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            style.paint("FAILED", "31"),
            passed,
            failures.len(),
            passed + failures.len()
        );
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontmatter_splits_from_markdown() {
        let text = "---\ndescription = \"two chapters\"\nexpect_blocks = { chapter-meta = 2 }\n---\n# Chapter 1: A\n";
        let (config, source) = parse_test_file(text).unwrap();
        assert_eq!(config.description.as_deref(), Some("two chapters"));
        assert_eq!(config.expect_blocks["chapter-meta"], 2);
        assert_eq!(source, "# Chapter 1: A\n");
    }

    #[test]
    fn missing_frontmatter_is_reported() {
        assert!(parse_test_file("# Chapter 1: A\n").is_err());
        assert!(parse_test_file("---\ndescription = \"x\"\n").is_err());
    }

    #[test]
    fn unexpected_warnings_fail() {
        let config = TestConfig {
            expect_warnings: Some(Vec::new()),
            ..TestConfig::default()
        };
        let reason = check(&config, "# Chapter 1: Traits\n\n- Traits --> Generics\n").unwrap();
        assert!(reason.contains("expected 0 warning(s)"), "{}", reason);
    }

    #[test]
    fn fatal_expectation() {
        let config = TestConfig {
            expect_fatal: true,
            ..TestConfig::default()
        };
        assert!(check(&config, "   \n").is_none());
        assert!(check(&config, "# Chapter 1: A\n\nSome text.\n").is_some());
    }

    #[test]
    fn corrupt_cache_setup_warns_once() {
        let config = TestConfig {
            cache: Some(CacheSetup::Corrupt),
            expect_warnings: Some(vec![ExpectedDiagnostic {
                code: "cache-load-failed".into(),
                line: None,
            }]),
            expect_reused: Some(0),
            ..TestConfig::default()
        };
        let source = "# Chapter 1: Values\n\nValues in Rust live on the stack unless they are boxed explicitly.\n";
        assert_eq!(check(&config, source), None);

        let warm = TestConfig {
            cache: Some(CacheSetup::Warm),
            expect_reused: Some(1),
            ..TestConfig::default()
        };
        assert_eq!(check(&warm, source), None);
    }

    #[test]
    fn bundled_fixtures_pass() {
        let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
        assert_eq!(run_tests(&fixtures, true, &[]), 0);
    }
}
