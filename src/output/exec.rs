//! External command dispatch: `-x` (once per result) and `-X` (once,
//! batched).

use crate::error::FfError;
use crate::types::format_value;
use crate::walk::Row;
use log::debug;
use std::collections::HashSet;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Behavior when a subprocess fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HaltMode {
    /// Ignore and continue.
    #[default]
    Never,
    /// Stop dispatching new work, drain in-flight.
    Soon,
    /// Stop dispatching and terminate in-flight subprocesses.
    Now,
}

impl HaltMode {
    pub fn parse(input: &str) -> Option<HaltMode> {
        match input {
            "never" => Some(HaltMode::Never),
            "soon" => Some(HaltMode::Soon),
            "now" => Some(HaltMode::Now),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    /// `{}`
    FullPath,
    /// `{/}`
    Basename,
    /// `{//}`
    Parent,
    /// `{.}`
    NoExt,
    /// `{/.}`
    BasenameNoExt,
    /// `{..}`
    Ext,
    /// `{attribute}`, resolved to a row column.
    Attr(usize),
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl Segment {
    fn render(&self, row: &Row) -> String {
        let path = &row.path;
        match self {
            Segment::Literal(text) => text.clone(),
            Segment::FullPath => path_text(path),
            Segment::Basename => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path_text(path)),
            Segment::Parent => path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(path_text)
                .unwrap_or_else(|| ".".to_string()),
            Segment::NoExt => path_text(&path.with_extension("")),
            Segment::BasenameNoExt => path
                .file_stem()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Segment::Ext => path
                .extension()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Segment::Attr(index) => row
                .values
                .get(*index)
                .map(|value| format_value(value, None))
                .unwrap_or_default(),
        }
    }
}

/// A parsed command template. `{{` and `}}` are literal braces; an
/// argument list without any placeholder gets the full path appended as
/// the sole positional argument.
pub struct CommandTemplate {
    args: Vec<Vec<Segment>>,
    has_placeholders: bool,
}

impl CommandTemplate {
    /// Parses template arguments. `lookup` resolves an attribute
    /// placeholder name to its row column index.
    pub fn parse(
        args: &[String],
        mut lookup: impl FnMut(&str) -> Result<usize, FfError>,
    ) -> Result<CommandTemplate, FfError> {
        let mut parsed = Vec::with_capacity(args.len());
        let mut has_placeholders = false;
        for arg in args {
            let segments = parse_arg(arg, &mut lookup)?;
            if segments
                .iter()
                .any(|segment| !matches!(segment, Segment::Literal(_)))
            {
                has_placeholders = true;
            }
            parsed.push(segments);
        }
        Ok(CommandTemplate {
            args: parsed,
            has_placeholders,
        })
    }

    pub fn has_placeholders(&self) -> bool {
        self.has_placeholders
    }

    /// The attribute names a template may reference; used to extend the
    /// row spec before walking.
    pub fn referenced_attributes(args: &[String]) -> Vec<String> {
        let mut names = Vec::new();
        for arg in args {
            let _ = parse_arg(arg, &mut |name: &str| {
                names.push(name.to_string());
                Ok(0)
            });
        }
        names
    }

    /// Argument vector for one result (`-x`).
    pub fn per_entry_command(&self, row: &Row) -> Vec<String> {
        let mut argv: Vec<String> = self
            .args
            .iter()
            .map(|segments| render(segments, row))
            .collect();
        if !self.has_placeholders {
            argv.push(path_text(&row.path));
        }
        argv
    }

    /// Argument vector for all results at once (`-X`): every
    /// placeholder-bearing argument repeats per result, in order.
    pub fn batch_command(&self, rows: &[Row]) -> Vec<String> {
        let mut argv = Vec::new();
        for segments in &self.args {
            if segments
                .iter()
                .any(|segment| !matches!(segment, Segment::Literal(_)))
            {
                for row in rows {
                    argv.push(render(segments, row));
                }
            } else {
                argv.push(
                    segments
                        .iter()
                        .map(|segment| match segment {
                            Segment::Literal(text) => text.as_str(),
                            _ => unreachable!("literal-only argument"),
                        })
                        .collect(),
                );
            }
        }
        if !self.has_placeholders {
            argv.extend(rows.iter().map(|row| path_text(&row.path)));
        }
        argv
    }
}

fn render(segments: &[Segment], row: &Row) -> String {
    segments.iter().map(|segment| segment.render(row)).collect()
}

fn parse_arg(
    arg: &str,
    lookup: &mut impl FnMut(&str) -> Result<usize, FfError>,
) -> Result<Vec<Segment>, FfError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = arg.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut inner = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => inner.push(c),
                        None => {
                            return Err(FfError::Usage(format!(
                                "unclosed placeholder in template '{arg}'"
                            )))
                        }
                    }
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(match inner.as_str() {
                    "" => Segment::FullPath,
                    "/" => Segment::Basename,
                    "//" => Segment::Parent,
                    "." => Segment::NoExt,
                    "/." => Segment::BasenameNoExt,
                    ".." => Segment::Ext,
                    name => Segment::Attr(lookup(name)?),
                });
            }
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Spawns and reaps template commands, tracking failures and driving
/// the `--halt` policy.
pub struct ExecRunner {
    template: CommandTemplate,
    halt: HaltMode,
    stop: Arc<AtomicBool>,
    failures: AtomicUsize,
    /// Pids of in-flight children, for `--halt now`.
    children: Mutex<HashSet<i32>>,
}

impl ExecRunner {
    pub fn new(template: CommandTemplate, halt: HaltMode, stop: Arc<AtomicBool>) -> ExecRunner {
        ExecRunner {
            template,
            halt,
            stop,
            failures: AtomicUsize::new(0),
            children: Mutex::new(HashSet::new()),
        }
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    /// Runs the command for one result; called on the walker workers so
    /// fan-out is bounded by the worker count.
    pub fn run_one(&self, row: &Row) {
        if self.stop.load(Ordering::SeqCst) {
            return;
        }
        self.run_command(self.template.per_entry_command(row));
    }

    /// Runs the single batched command (`-X`).
    pub fn run_batch(&self, rows: &[Row]) {
        if rows.is_empty() {
            return;
        }
        self.run_command(self.template.batch_command(rows));
    }

    fn run_command(&self, argv: Vec<String>) {
        let Some((program, args)) = argv.split_first() else {
            return;
        };
        let child = Command::new(program).args(args).spawn();
        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                debug!("cannot spawn '{program}': {e}");
                self.fail();
                return;
            }
        };
        let pid = child.id() as i32;
        self.children.lock().expect("children mutex").insert(pid);
        let status = child.wait();
        self.children.lock().expect("children mutex").remove(&pid);
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => {
                debug!("'{program}' exited with {status}");
                self.fail();
            }
            Err(e) => {
                debug!("cannot wait for '{program}': {e}");
                self.fail();
            }
        }
    }

    fn fail(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        match self.halt {
            HaltMode::Never => {}
            HaltMode::Soon => {
                self.stop.store(true, Ordering::SeqCst);
            }
            HaltMode::Now => {
                self.stop.store(true, Ordering::SeqCst);
                for &pid in self.children.lock().expect("children mutex").iter() {
                    unsafe {
                        libc::kill(pid, libc::SIGTERM);
                    }
                }
            }
        }
    }
}
