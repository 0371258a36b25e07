mod test_runner;

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ssm::{Diagnostics, Severity};
use ssm_compiler::{Compilation, CompileOptions, Compiler};

#[derive(Parser)]
#[command(name = "ssmc", version, about = "Semantic block compiler for markdown documents")]
struct Cli {
    /// Disable colored diagnostic output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log more (repeatable); RUST_LOG applies otherwise
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a document to SSM
    Compile(CompileArgs),

    /// Compile without writing anything; exit status only
    Check(CheckArgs),

    /// List extractors and enrichment passes
    Passes(PassesArgs),

    /// Run .test.md fixture files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct CompileArgs {
    /// Markdown source file
    file: PathBuf,

    /// Write SSM here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the JSON diagnostics report here (default: next to --output)
    #[arg(long)]
    diagnostics: Option<PathBuf>,

    #[command(flatten)]
    options: OptionArgs,
}

#[derive(clap::Args)]
struct CheckArgs {
    /// Markdown source file
    file: PathBuf,

    #[command(flatten)]
    options: OptionArgs,
}

#[derive(clap::Args)]
struct PassesArgs {
    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Disable an extractor or pass by name. Repeatable.
    #[arg(long)]
    disable: Vec<String>,
}

/// Flags layered over the configuration file.
#[derive(clap::Args)]
struct OptionArgs {
    /// Configuration file (TOML); default: ssm.toml next to the source
    #[arg(long)]
    config: Option<PathBuf>,

    /// Symbol namespace (default: source file stem)
    #[arg(long)]
    namespace: Option<String>,

    /// Neither read nor write the incremental cache
    #[arg(long)]
    no_cache: bool,

    /// Directory for cache files
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Run extractors in parallel
    #[arg(long)]
    parallel: bool,

    /// Disable an extractor or pass by name. Repeatable.
    #[arg(long)]
    disable: Vec<String>,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.md file or directory containing them
    path: PathBuf,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Compile(args) => do_compile(args, cli.no_color, cli.verbose),
        Command::Check(args) => do_check(args, cli.no_color, cli.verbose),
        Command::Passes(args) => do_passes(args),
        Command::Test(args) => {
            if args.list_categories {
                test_runner::list_categories(&args.path);
                Ok(0)
            } else {
                Ok(test_runner::run_tests(&args.path, cli.no_color, &args.category))
            }
        }
    };

    match result {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("error: {:#}", err);
            process::exit(1);
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        1 => "debug".into(),
        _ => "trace".into(),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn do_compile(args: CompileArgs, no_color: bool, verbose: u8) -> anyhow::Result<i32> {
    let options = resolve_options(&args.file, &args.options)?;
    let (source, compilation) = compile(&args.file, options)?;
    render_diagnostics(&args.file, &source, &compilation.diagnostics, no_color, verbose > 0);

    match &args.output {
        Some(out) => {
            fs::write(out, &compilation.output).with_context(|| format!("cannot write '{}'", out.display()))?;
            tracing::info!(path = %out.display(), "wrote ssm");
        }
        None => print!("{}", compilation.output),
    }

    let report_path = args
        .diagnostics
        .clone()
        .or_else(|| args.output.as_ref().map(|out| out.with_extension("diagnostics.json")));
    if let Some(path) = report_path {
        let json = compilation.report.to_json().context("cannot encode diagnostics report")?;
        fs::write(&path, json).with_context(|| format!("cannot write '{}'", path.display()))?;
    }

    summarize(&args.file, &compilation);
    Ok(exit_code(&compilation))
}

fn do_check(args: CheckArgs, no_color: bool, verbose: u8) -> anyhow::Result<i32> {
    let mut options = resolve_options(&args.file, &args.options)?;
    // A check must not leave a cache file behind.
    options.cache.enabled = false;
    let (source, compilation) = compile(&args.file, options)?;
    render_diagnostics(&args.file, &source, &compilation.diagnostics, no_color, verbose > 0);
    summarize(&args.file, &compilation);
    Ok(exit_code(&compilation))
}

fn do_passes(args: PassesArgs) -> anyhow::Result<i32> {
    let mut options = match &args.config {
        Some(path) => CompileOptions::load(path)?,
        None => CompileOptions::default(),
    };
    for name in &args.disable {
        options.disable(name);
    }
    for status in Compiler::new(options).capabilities() {
        let state = match (status.available, status.enabled) {
            (false, _) => "unavailable",
            (true, false) => "disabled",
            (true, true) => "enabled",
        };
        println!("{:<10} {:<22} {}", status.kind.to_string(), status.name, state);
    }
    Ok(0)
}

fn resolve_options(file: &Path, args: &OptionArgs) -> anyhow::Result<CompileOptions> {
    let mut options = match &args.config {
        Some(path) => CompileOptions::load(path)?,
        None => CompileOptions::discover(file)?.unwrap_or_default(),
    };
    if let Some(namespace) = &args.namespace {
        options.namespace = Some(namespace.clone());
    }
    if args.no_cache {
        options.cache.enabled = false;
    }
    if let Some(dir) = &args.cache_dir {
        options.cache.dir = Some(dir.clone());
    }
    if args.parallel {
        options.parallel_extractors = true;
    }
    for name in &args.disable {
        options.disable(name);
    }
    Ok(options)
}

fn compile(file: &Path, options: CompileOptions) -> anyhow::Result<(String, Compilation)> {
    let source = fs::read_to_string(file).with_context(|| format!("cannot read '{}'", file.display()))?;
    let compilation = Compiler::new(options)
        .compile_source(&source, Some(file))
        .with_context(|| format!("cannot compile '{}'", file.display()))?;
    Ok((source, compilation))
}

fn exit_code(compilation: &Compilation) -> i32 {
    if compilation.is_success() { 0 } else { 1 }
}

fn summarize(file: &Path, compilation: &Compilation) {
    let summary = &compilation.report.summary;
    let status = if compilation.is_success() { "ok" } else { "failed" };
    eprintln!(
        "{}: {} ({} blocks, {} errors, {} warnings, {} of {} chapters reused)",
        status,
        file.display(),
        summary.total_blocks,
        summary.error_count,
        summary.warning_count,
        compilation.reused.len(),
        compilation.report.metrics.chapters,
    );
}

/// Render through codespan, labelling the offending source line when known.
/// Info notes only show with `-v`.
fn render_diagnostics(file: &Path, source: &str, diagnostics: &Diagnostics, no_color: bool, infos: bool) {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    let writer = StandardStream::stderr(color_choice);
    let config = term::Config::default();
    let mut files = SimpleFiles::new();
    let file_id = files.add(file.display().to_string(), source.to_string());

    for diagnostic in diagnostics {
        if diagnostic.severity == Severity::Info && !infos {
            continue;
        }
        let span = diagnostic.line.and_then(|line| line_span(source, line));
        let rendered = diagnostic.to_codespan(file_id, span);
        let _ = term::emit_to_write_style(&mut writer.lock(), &config, &files, &rendered);
    }
}

/// Byte range of 1-based `line`, without its terminator.
fn line_span(source: &str, line: u32) -> Option<Range<usize>> {
    let mut start = 0;
    for (number, text) in (1..).zip(source.split_inclusive('\n')) {
        if number == line {
            let end = start + text.trim_end_matches(['\n', '\r']).len();
            return Some(start..end);
        }
        start += text.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_span_covers_the_line_text() {
        let source = "# Chapter 1: A\r\n\nbody text\n";
        assert_eq!(line_span(source, 1), Some(0..14));
        assert_eq!(line_span(source, 2), Some(16..16));
        assert_eq!(&source[line_span(source, 3).unwrap()], "body text");
        assert_eq!(line_span(source, 9), None);
    }

    #[test]
    fn flags_override_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("book.md");
        fs::write(dir.path().join("ssm.toml"), "namespace = \"from-file\"\n[passes]\ndisabled = [\"qa-synthesis\"]\n")
            .unwrap();

        let args = OptionArgs {
            config: None,
            namespace: Some("from-flag".into()),
            no_cache: true,
            cache_dir: None,
            parallel: true,
            disable: vec!["contrast".into()],
        };
        let options = resolve_options(&file, &args).unwrap();
        assert_eq!(options.namespace.as_deref(), Some("from-flag"));
        assert!(!options.cache.enabled);
        assert!(options.parallel_extractors);
        assert!(options.passes.is_disabled("qa-synthesis"));
        assert!(options.extractors.is_disabled("contrast"));
    }

    #[test]
    fn cli_parses_compile_flags() {
        let cli = Cli::parse_from([
            "ssmc", "compile", "book.md", "-o", "book.ssm", "--disable", "terms", "--disable", "qa-synthesis", "-v",
        ]);
        assert_eq!(cli.verbose, 1);
        let Command::Compile(args) = cli.command else {
            panic!("expected compile");
        };
        assert_eq!(args.output, Some(PathBuf::from("book.ssm")));
        assert_eq!(args.options.disable, ["terms", "qa-synthesis"]);
    }
}
