//! Parallel directory traversal.
//!
//! A pool of worker threads shares an unbounded queue of directory
//! tasks. Each worker fully consumes one directory before taking the
//! next task, so traversal is breadth-first across the pool and locally
//! depth-first within a worker. An atomic counter tracks outstanding
//! directories; the worker that retires the last one sends a shutdown
//! message per worker.
//!
//! Per-entry read errors are debug-logged and skipped; they never
//! terminate the walk.

use crate::cache::Cache;
use crate::context::{Context, Entry};
use crate::eval::Evaluator;
use crate::ignores::{IgnoreRules, IgnoreStack};
use crate::registry::{AttrId, Registry};
use crate::types::{sort_key, SortKey, Value};
use crossbeam::channel::{unbounded, Sender};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Set by the interrupt handler; halts new dispatch, in-flight
/// directories drain.
pub static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Depth window `[start, stop)` for emitted entries; direct children of
/// a starting point have depth 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepthRange {
    pub start: usize,
    pub stop: Option<usize>,
}

impl DepthRange {
    /// Parses `N` (max depth), `a:b`, `a:`, or `:b`.
    pub fn parse(input: &str) -> Option<DepthRange> {
        let trimmed = input.trim();
        if let Some((start, stop)) = trimmed.split_once(':') {
            let start = if start.is_empty() {
                0
            } else {
                start.parse().ok()?
            };
            let stop = if stop.is_empty() {
                None
            } else {
                Some(stop.parse().ok()?)
            };
            Some(DepthRange { start, stop })
        } else {
            let max: usize = trimmed.parse().ok()?;
            Some(DepthRange {
                start: 0,
                stop: Some(max + 1),
            })
        }
    }

    pub fn contains(&self, depth: usize) -> bool {
        depth >= self.start && self.stop.is_none_or(|stop| depth < stop)
    }

    /// Whether a directory at `depth` can still contain emittable
    /// entries; past the upper bound traversal is pruned.
    pub fn descend(&self, depth: usize) -> bool {
        self.stop.is_none_or(|stop| depth + 1 < stop)
    }
}

/// Walk configuration fixed at startup.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// `-L`: stat through symlinks.
    pub follow_symlinks: bool,
    /// `--mount`: stay on the starting point's device.
    pub one_file_system: bool,
    pub depth: DepthRange,
    pub workers: usize,
    /// Recognized ignore file names, in precedence order.
    pub ignore_files: Vec<String>,
    /// Maintain the ignore stack and attach decisions to entries.
    pub track_ignores: bool,
    /// Skip ignore files in ancestors of the starting points.
    pub no_parent_ignore: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        WalkOptions {
            follow_symlinks: false,
            one_file_system: false,
            depth: DepthRange::default(),
            workers: 1,
            ignore_files: vec![
                ".gitignore".into(),
                ".ignore".into(),
                ".fdignore".into(),
                ".ffignore".into(),
            ],
            track_ignores: false,
            no_parent_ignore: false,
        }
    }
}

/// Attributes to materialize per matched entry while its context is
/// alive: output columns and sort keys.
#[derive(Debug, Clone, Default)]
pub struct RowSpec {
    pub columns: Vec<AttrId>,
    /// `(attribute, version-sort)` pairs.
    pub sort: Vec<(AttrId, bool)>,
}

/// One matched entry with its materialized values.
#[derive(Debug)]
pub struct Row {
    pub path: PathBuf,
    pub values: Vec<Value>,
    pub sort_keys: Vec<SortKey>,
    /// `(kind, executable)` for path colorization.
    pub hint: Option<(crate::types::FileKind, bool)>,
}

/// Totals collected during a walk.
#[derive(Debug, Default)]
pub struct WalkStats {
    pub matched: usize,
    pub walk_errors: usize,
}

struct DirTask {
    /// Path in output space (as the starting point was given; empty for
    /// the `.` starting point so children print without a `./` prefix).
    path: PathBuf,
    /// Absolute counterpart, the space every ignore rule is rooted in.
    abs: PathBuf,
    depth: usize,
    dev: u64,
    ignores: IgnoreStack,
}

impl DirTask {
    fn read_path(&self) -> &Path {
        if self.path.as_os_str().is_empty() {
            Path::new(".")
        } else {
            &self.path
        }
    }
}

enum Task {
    Dir(DirTask),
    Done,
}

pub struct Walker<'a> {
    pub registry: &'a Registry,
    pub cache: Option<&'a Cache>,
    pub matcher: &'a Evaluator,
    pub exclusion: Option<&'a Evaluator>,
    pub options: WalkOptions,
    /// Cooperative stop: set by signal handling or `--halt`; workers
    /// stop dispatching new directories and drain.
    pub stop: Arc<AtomicBool>,
}

impl Walker<'_> {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst) || INTERRUPTED.load(Ordering::SeqCst)
    }

    /// Walks `roots`, calling `on_row` on the caller's thread for every
    /// matched entry, or `worker_row` on the discovering worker when
    /// given (per-entry exec without sorting).
    pub fn run(
        &self,
        roots: &[PathBuf],
        spec: &RowSpec,
        mut on_row: impl FnMut(Row),
        worker_row: Option<&(dyn Fn(Row) + Sync)>,
    ) -> WalkStats {
        let pending = Arc::new(AtomicUsize::new(0));
        let matched = AtomicUsize::new(0);
        let walk_errors = AtomicUsize::new(0);
        let (task_tx, task_rx) = unbounded::<Task>();
        let (row_tx, row_rx) = unbounded::<Row>();

        for root in roots {
            match self.seed(root) {
                Some(task) => {
                    pending.fetch_add(1, Ordering::SeqCst);
                    task_tx.send(Task::Dir(task)).expect("queue open");
                }
                None => {
                    walk_errors.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
        if pending.load(Ordering::SeqCst) == 0 {
            for _ in 0..self.options.workers {
                task_tx.send(Task::Done).expect("queue open");
            }
        }

        std::thread::scope(|scope| {
            for _ in 0..self.options.workers {
                let task_rx = task_rx.clone();
                let task_tx = task_tx.clone();
                let row_tx = row_tx.clone();
                let pending = Arc::clone(&pending);
                let matched = &matched;
                let walk_errors = &walk_errors;
                scope.spawn(move || {
                    while let Ok(task) = task_rx.recv() {
                        let task = match task {
                            Task::Done => break,
                            Task::Dir(task) => task,
                        };
                        if !self.stopped() {
                            self.process_dir(
                                task,
                                spec,
                                &task_tx,
                                &row_tx,
                                worker_row,
                                &pending,
                                matched,
                                walk_errors,
                            );
                        }
                        if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                            for _ in 0..self.options.workers {
                                task_tx.send(Task::Done).expect("queue open");
                            }
                        }
                    }
                });
            }
            drop(row_tx);
            drop(task_tx);

            // the sink runs here, serialized on the caller's thread
            while let Ok(row) = row_rx.recv() {
                on_row(row);
            }
        });

        WalkStats {
            matched: matched.load(Ordering::SeqCst),
            walk_errors: walk_errors.load(Ordering::SeqCst),
        }
    }

    fn seed(&self, root: &Path) -> Option<DirTask> {
        let meta = match fs::metadata(root) {
            Ok(meta) => meta,
            Err(e) => {
                debug!("cannot stat starting point {}: {e}", root.display());
                return None;
            }
        };
        use std::os::unix::fs::MetadataExt;
        let abs = match fs::canonicalize(root) {
            Ok(abs) => abs,
            Err(e) => {
                debug!("cannot canonicalize {}: {e}", root.display());
                return None;
            }
        };
        let mut ignores = IgnoreStack::empty();
        if self.options.track_ignores && !self.options.no_parent_ignore {
            ignores = self.parent_ignores(&abs);
        }
        let path = if root == Path::new(".") {
            PathBuf::new()
        } else {
            root.to_path_buf()
        };
        Some(DirTask {
            path,
            abs,
            depth: 0,
            dev: meta.dev(),
            ignores,
        })
    }

    /// Loads ignore files from every strict ancestor of `dir`, outermost
    /// first so deeper rules take precedence.
    fn parent_ignores(&self, dir: &Path) -> IgnoreStack {
        let mut ancestors: Vec<&Path> = dir.ancestors().skip(1).collect();
        ancestors.reverse();
        let mut stack = IgnoreStack::empty();
        for ancestor in ancestors {
            for name in &self.options.ignore_files {
                if let Some(rules) = IgnoreRules::load(&ancestor.join(name)) {
                    stack = stack.push(rules);
                }
            }
        }
        stack
    }

    #[allow(clippy::too_many_arguments)]
    fn process_dir(
        &self,
        task: DirTask,
        spec: &RowSpec,
        task_tx: &Sender<Task>,
        row_tx: &Sender<Row>,
        worker_row: Option<&(dyn Fn(Row) + Sync)>,
        pending: &AtomicUsize,
        matched: &AtomicUsize,
        walk_errors: &AtomicUsize,
    ) {
        let entries = match fs::read_dir(task.read_path()) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("cannot read directory {}: {e}", task.read_path().display());
                walk_errors.fetch_add(1, Ordering::SeqCst);
                return;
            }
        };

        let mut ignores = task.ignores.clone();
        if self.options.track_ignores {
            for name in &self.options.ignore_files {
                if let Some(rules) = IgnoreRules::load(&task.abs.join(name)) {
                    ignores = ignores.push(rules);
                }
            }
        }

        let depth = task.depth + 1;
        for dirent in entries {
            let dirent = match dirent {
                Ok(dirent) => dirent,
                Err(e) => {
                    debug!("readdir error under {}: {e}", task.path.display());
                    walk_errors.fetch_add(1, Ordering::SeqCst);
                    continue;
                }
            };
            let name = dirent.file_name();
            let path = task.path.join(&name);
            let abs = task.abs.join(&name);

            let metadata = if self.options.follow_symlinks {
                fs::metadata(&path)
                    .or_else(|_| fs::symlink_metadata(&path))
                    .ok()
            } else {
                dirent.metadata().ok()
            };
            if metadata.is_none() {
                debug!("cannot stat {}", path.display());
            }
            let is_dir = metadata.as_ref().is_some_and(|m| m.is_dir());

            let mut entry = Entry::new(path.clone(), depth, metadata.clone());
            if self.options.track_ignores {
                entry.ignore = Some(ignores.decide(&abs, is_dir));
            }
            let mut ctx = Context::new(self.registry, self.cache, entry);

            // exclusion prunes: a matching directory is not descended into
            if let Some(exclusion) = self.exclusion {
                if exclusion.matches(&mut ctx) {
                    continue;
                }
            }

            if self.options.one_file_system {
                use std::os::unix::fs::MetadataExt;
                if metadata.as_ref().is_some_and(|m| m.dev() != task.dev) {
                    continue;
                }
            }

            if self.options.depth.contains(depth) && self.matcher.matches(&mut ctx) {
                matched.fetch_add(1, Ordering::SeqCst);
                let hint = metadata.as_ref().map(|m| {
                    use std::os::unix::fs::MetadataExt;
                    let ft = m.file_type();
                    let kind = if ft.is_dir() {
                        crate::types::FileKind::Directory
                    } else if ft.is_symlink() {
                        crate::types::FileKind::Symlink
                    } else {
                        crate::types::FileKind::File
                    };
                    (kind, m.mode() & 0o111 != 0)
                });
                let row = Row {
                    path: path.clone(),
                    values: spec.columns.iter().map(|&id| ctx.get(id)).collect(),
                    sort_keys: spec
                        .sort
                        .iter()
                        .map(|&(id, version)| sort_key(&ctx.get(id), version))
                        .collect(),
                    hint,
                };
                match worker_row {
                    Some(dispatch) => dispatch(row),
                    None => {
                        let _ = row_tx.send(row);
                    }
                }
            }

            if is_dir && self.options.depth.descend(depth) && !self.stopped() {
                pending.fetch_add(1, Ordering::SeqCst);
                let _ = task_tx.send(Task::Dir(DirTask {
                    path,
                    abs,
                    depth,
                    dev: task.dev,
                    ignores: ignores.clone(),
                }));
            }
        }
    }
}
