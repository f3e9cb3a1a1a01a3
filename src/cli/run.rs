//! Orchestration: builds the registry, cache, evaluators, and walker
//! from parsed arguments, drives the walk, and computes the exit code.

use crate::cache::Cache;
use crate::cli::args::{CaseChoice, Cli, ColorWhen, HaltChoice};
use crate::cli::help;
use crate::error::{self, FfError};
use crate::eval::{CaseMode, EvalOptions, Evaluator};
use crate::expr::{parse_expression, parse_test, Expr, Shorthand};
use crate::output::{
    write_json_array, write_json_lines, ColorScheme, CommandTemplate, CountSink, ExecRunner,
    FieldSpec, HaltMode, Limit, RecordWriter,
};
use crate::registry::{AttrId, Registry};
use crate::types::{Modifier, ParseContext, ValueKind};
use crate::walk::{DepthRange, Row, RowSpec, WalkOptions, Walker, INTERRUPTED};
use log::debug;
use rayon::prelude::*;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use termcolor::{ColorChoice, StandardStream};

extern "C" fn on_interrupt(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

fn install_interrupt_handler() {
    unsafe {
        libc::signal(libc::SIGINT, on_interrupt as libc::sighandler_t);
    }
}

/// Entry point called from `main`; all errors are rendered here and
/// mapped to their exit codes.
pub fn run(cli: Cli) -> i32 {
    match run_inner(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ff: {e}");
            e.exit_code()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Records,
    Json,
    JsonLines,
    Count,
    Exec,
    ExecBatch,
}

/// One resolved output/count column.
struct Column {
    id: AttrId,
    name: String,
    kind: ValueKind,
    modifier: Option<Modifier>,
}

fn default_cache_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".cache/ff.db"),
        None => PathBuf::from(".ff.db"),
    }
}

fn resolve_fields(
    registry: &Registry,
    fields: &[FieldSpec],
    sort_list: bool,
) -> Result<Vec<Column>, FfError> {
    fields
        .iter()
        .map(|field| {
            let id = registry.resolve(&field.name)?;
            if let Some(modifier) = field.modifier {
                let valid = if sort_list {
                    modifier == Modifier::Version
                } else {
                    modifier.is_output()
                };
                if !valid {
                    return Err(FfError::Usage(format!(
                        "modifier not applicable to '{}' here",
                        field.name
                    )));
                }
            }
            Ok(Column {
                id,
                name: field.name.clone(),
                kind: registry.def(id).kind,
                modifier: field.modifier,
            })
        })
        .collect()
}

fn run_inner(cli: &Cli) -> Result<i32, FfError> {
    let registry = Registry::with_builtins()?;

    if cli.help_attributes {
        help::print_attributes(&mut io::stdout(), &registry)?;
        return Ok(error::EXIT_SUCCESS);
    }
    if cli.help_types {
        help::print_types(&mut io::stdout())?;
        return Ok(error::EXIT_SUCCESS);
    }
    if cli.help_plugins {
        help::print_plugins(&mut io::stdout(), &registry)?;
        return Ok(error::EXIT_SUCCESS);
    }

    let cache_path = cli.cache.clone().unwrap_or_else(default_cache_path);
    if cli.clean_cache {
        let cache = Cache::open(&cache_path);
        let removed = cache.clean();
        cache.vacuum()?;
        eprintln!("ff: removed {removed} stale cache records");
        return Ok(error::EXIT_SUCCESS);
    }
    let cache = if cli.no_cache {
        None
    } else {
        Some(Cache::open(&cache_path))
    };
    let cache = cache.as_ref();

    // positional tokens are tests unless they look like directories
    let mut roots: Vec<PathBuf> = Vec::new();
    for dir in &cli.directories {
        if !fs::metadata(dir).map(|m| m.is_dir()).unwrap_or(false) {
            return Err(FfError::Usage(format!(
                "'{}' is not a directory",
                dir.display()
            )));
        }
        roots.push(dir.clone());
    }
    let mut tokens: Vec<String> = Vec::new();
    for token in &cli.tokens {
        if token.contains('/') && fs::symlink_metadata(token).is_ok() {
            if !fs::metadata(token).map(|m| m.is_dir()).unwrap_or(false) {
                return Err(FfError::Usage(format!("'{token}' is not a directory")));
            }
            roots.push(PathBuf::from(token));
        } else {
            tokens.push(token.clone());
        }
    }
    if roots.is_empty() {
        roots.push(PathBuf::from("."));
    }
    if cli.absolute {
        roots = roots
            .into_iter()
            .map(|root| {
                fs::canonicalize(&root)
                    .map_err(|e| FfError::Usage(format!("'{}': {e}", root.display())))
            })
            .collect::<Result<_, _>>()?;
    }

    let shorthand = Shorthand::default();
    let expr = parse_expression(&tokens, &shorthand)?;

    let mut exclusions: Vec<Expr> = Vec::new();
    for test in &cli.exclude {
        exclusions.push(Expr::Test(parse_test(test, &shorthand)?));
    }
    if cli.hide {
        exclusions.push(Expr::Test(parse_test("hide=yes", &shorthand)?));
    }
    if cli.ignore {
        exclusions.push(Expr::Test(parse_test("ignore.ignored=yes", &shorthand)?));
    }

    let opts = EvalOptions {
        case: match cli.case {
            CaseChoice::Smart => CaseMode::Smart,
            CaseChoice::Ignore => CaseMode::Insensitive,
            CaseChoice::Sensitive => CaseMode::Sensitive,
        },
        parse: ParseContext { si: cli.si },
    };
    let matcher = Evaluator::bind(&expr, &registry, cache, &opts)?;
    let exclusion = Evaluator::bind_exclusions(&exclusions, &registry, cache, &opts)?;

    // exactly one output mode per invocation; --json composes with
    // --count (counts render as one JSON object)
    let exec_args = cli.exec.as_ref().or(cli.exec_batch.as_ref());
    if exec_args.is_some() && (cli.count.is_some() || cli.json || cli.jsonl) {
        return Err(FfError::Usage(
            "-x/-X cannot be combined with --count or --json".to_string(),
        ));
    }
    let mode = if cli.count.is_some() {
        Mode::Count
    } else if cli.json {
        Mode::Json
    } else if cli.jsonl {
        Mode::JsonLines
    } else if cli.exec.is_some() {
        Mode::Exec
    } else if cli.exec_batch.is_some() {
        Mode::ExecBatch
    } else {
        Mode::Records
    };

    // resolve the column set the walker must materialize
    let columns: Vec<Column> = match mode {
        Mode::Count => {
            let fields = FieldSpec::parse_list(cli.count.as_deref().expect("count mode"))?;
            let columns = resolve_fields(&registry, &fields, false)?;
            for column in &columns {
                if column.kind.count_policy().is_none() {
                    return Err(FfError::Usage(format!(
                        "attribute '{}' of type {} is not countable",
                        column.name,
                        column.kind.name()
                    )));
                }
            }
            columns
        }
        Mode::Exec | Mode::ExecBatch => {
            let args = exec_args.expect("exec mode");
            let names = CommandTemplate::referenced_attributes(args);
            let fields: Vec<FieldSpec> = names
                .into_iter()
                .map(|name| FieldSpec {
                    name,
                    modifier: None,
                })
                .collect();
            resolve_fields(&registry, &fields, false)?
        }
        Mode::Records | Mode::Json | Mode::JsonLines => {
            resolve_fields(&registry, &FieldSpec::parse_list(&cli.output)?, false)?
        }
    };

    let sort_columns = match &cli.sort {
        Some(list) => resolve_fields(&registry, &FieldSpec::parse_list(list)?, true)?,
        None => Vec::new(),
    };

    let limit = match (&cli.limit, cli.first) {
        (Some(_), true) => {
            return Err(FfError::Usage("-1 conflicts with --limit".to_string()));
        }
        (Some(slice), false) => Some(Limit::parse(slice)?),
        (None, true) => Some(Limit::Slice {
            start: None,
            stop: Some(1),
        }),
        (None, false) => None,
    };
    if limit.is_some() && cli.sort.is_none() {
        eprintln!("ff: warning: --limit without --sort; result order is unstable");
    }

    let depth = match &cli.depth {
        Some(range) => DepthRange::parse(range)
            .ok_or_else(|| FfError::Usage(format!("invalid depth range '{range}'")))?,
        None => DepthRange::default(),
    };

    let track_ignores = cli.ignore
        || matcher.uses_ignore()
        || exclusion.as_ref().is_some_and(Evaluator::uses_ignore);

    let options = WalkOptions {
        follow_symlinks: cli.follow,
        one_file_system: cli.one_file_system,
        depth,
        workers: cli.jobs.unwrap_or_else(num_cpus::get).max(1),
        ignore_files: cli
            .ignore_files
            .split(',')
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
        track_ignores,
        no_parent_ignore: cli.no_parent_ignore,
    };

    let colorize = std::env::var_os("NO_COLOR").is_none()
        && match cli.color {
            ColorWhen::Always => true,
            ColorWhen::Never => false,
            ColorWhen::Auto => io::stdout().is_terminal(),
        };
    let scheme = colorize.then(ColorScheme::from_env);

    let stop = Arc::new(AtomicBool::new(false));
    install_interrupt_handler();

    let runner = match exec_args {
        Some(args) => {
            let template = CommandTemplate::parse(args, |name| {
                columns
                    .iter()
                    .position(|column| column.name == name)
                    .ok_or_else(|| FfError::Usage(format!("unknown placeholder '{{{name}}}'")))
            })?;
            let halt = match cli.halt {
                HaltChoice::Never => HaltMode::Never,
                HaltChoice::Soon => HaltMode::Soon,
                HaltChoice::Now => HaltMode::Now,
            };
            Some(ExecRunner::new(template, halt, Arc::clone(&stop)))
        }
        None => None,
    };

    let spec = RowSpec {
        columns: columns.iter().map(|column| column.id).collect(),
        sort: sort_columns
            .iter()
            .map(|column| (column.id, column.modifier == Some(Modifier::Version)))
            .collect(),
    };

    let walker = Walker {
        registry: &registry,
        cache,
        matcher: &matcher,
        exclusion: exclusion.as_ref(),
        options,
        stop: Arc::clone(&stop),
    };

    // streaming is only possible without sorting, limiting, or batching
    let buffered = cli.sort.is_some()
        || limit.is_some()
        || matches!(mode, Mode::Json | Mode::ExecBatch);

    let stdout = StandardStream::stdout(if colorize {
        ColorChoice::Always
    } else {
        ColorChoice::Never
    });
    let kinds: Vec<ValueKind> = columns.iter().map(|column| column.kind).collect();
    let modifiers: Vec<Option<Modifier>> = columns.iter().map(|column| column.modifier).collect();
    let keys: Vec<String> = columns.iter().map(|column| column.name.clone()).collect();

    let stats;
    if buffered {
        let mut rows: Vec<Row> = Vec::new();
        stats = walker.run(&roots, &spec, |row| rows.push(row), None);

        if cli.sort.is_some() {
            rows.par_sort_by(|a, b| {
                a.sort_keys
                    .cmp(&b.sort_keys)
                    .then_with(|| a.path.cmp(&b.path))
            });
            if cli.reverse {
                rows.reverse();
            }
        }
        if let Some(limit) = limit {
            let (start, stop_idx) = limit.resolve(rows.len());
            rows.truncate(stop_idx);
            rows.drain(..start);
        }

        emit_buffered(
            mode, rows, &keys, &kinds, modifiers, scheme.as_ref(), stdout, cli, runner.as_ref(),
        )?;
    } else {
        match mode {
            Mode::Records => {
                let mut writer = RecordWriter::new(
                    stdout,
                    cli.sep.clone(),
                    cli.print0,
                    cli.all,
                    modifiers,
                    &kinds,
                    scheme.as_ref(),
                );
                stats = walker.run(
                    &roots,
                    &spec,
                    |row| {
                        if let Err(e) = writer.write_row(&row) {
                            debug!("write error: {e}");
                        }
                    },
                    None,
                );
                writer.flush()?;
            }
            Mode::JsonLines => {
                let mut out = io::BufWriter::new(io::stdout());
                stats = walker.run(
                    &roots,
                    &spec,
                    |row| {
                        if let Err(e) = write_json_lines(&mut out, &keys, std::slice::from_ref(&row))
                        {
                            debug!("write error: {e}");
                        }
                    },
                    None,
                );
                out.flush()?;
            }
            Mode::Count => {
                let mut sink = CountSink::new(
                    columns
                        .iter()
                        .map(|column| {
                            (
                                column.name.clone(),
                                column.kind.count_policy().expect("validated countable"),
                            )
                        })
                        .collect(),
                );
                stats = walker.run(&roots, &spec, |row| sink.add(&row.values), None);
                write_counts(&sink, cli)?;
            }
            Mode::Exec => {
                let runner = runner.as_ref().expect("exec mode has a runner");
                stats = walker.run(&roots, &spec, |_| {}, Some(&|row| runner.run_one(&row)));
            }
            Mode::Json | Mode::ExecBatch => unreachable!("always buffered"),
        }
    }

    if let Some(cache) = cache {
        cache.flush()?;
    }

    let exec_failures = runner.map(|runner| runner.failures()).unwrap_or(0);
    debug!(
        "walk finished: {} matched, {} walk errors, {} exec failures",
        stats.matched, stats.walk_errors, exec_failures
    );

    if INTERRUPTED.load(Ordering::SeqCst) {
        return Ok(error::EXIT_WALK);
    }
    if exec_failures > 0 {
        return Ok(error::EXIT_SUBPROCESS);
    }
    if cli.fail && stats.matched == 0 {
        return Ok(error::EXIT_NO_MATCHES);
    }
    Ok(error::EXIT_SUCCESS)
}

fn write_counts(sink: &CountSink, cli: &Cli) -> Result<(), FfError> {
    let mut out = io::stdout();
    if cli.json || cli.jsonl {
        serde_json::to_writer(&mut out, &sink.to_json())
            .map_err(|e| FfError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        out.write_all(b"\n")?;
    } else {
        sink.write_text(&mut out)?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn emit_buffered(
    mode: Mode,
    rows: Vec<Row>,
    keys: &[String],
    kinds: &[ValueKind],
    modifiers: Vec<Option<Modifier>>,
    scheme: Option<&ColorScheme>,
    stdout: StandardStream,
    cli: &Cli,
    runner: Option<&ExecRunner>,
) -> Result<(), FfError> {
    match mode {
        Mode::Records => {
            let mut writer = RecordWriter::new(
                stdout,
                cli.sep.clone(),
                cli.print0,
                cli.all,
                modifiers,
                kinds,
                scheme,
            );
            for row in &rows {
                writer.write_row(row)?;
            }
            writer.flush()?;
        }
        Mode::Json => {
            let mut out = io::BufWriter::new(io::stdout());
            write_json_array(&mut out, keys, &rows)?;
            out.flush()?;
        }
        Mode::JsonLines => {
            let mut out = io::BufWriter::new(io::stdout());
            write_json_lines(&mut out, keys, &rows)?;
            out.flush()?;
        }
        Mode::Count => {
            let mut sink = CountSink::new(
                keys.iter()
                    .zip(kinds)
                    .map(|(name, kind)| {
                        (
                            name.clone(),
                            kind.count_policy().expect("validated countable"),
                        )
                    })
                    .collect(),
            );
            for row in &rows {
                sink.add(&row.values);
            }
            write_counts(&sink, cli)?;
        }
        Mode::Exec => {
            let runner = runner.expect("exec mode has a runner");
            // stream-after-sort: dispatch in the final order
            for row in &rows {
                runner.run_one(row);
            }
        }
        Mode::ExecBatch => {
            let runner = runner.expect("exec mode has a runner");
            runner.run_batch(&rows);
        }
    }
    Ok(())
}
