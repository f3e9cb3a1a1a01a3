//! CLI argument parsing using clap.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Case sensitivity choice for string operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CaseChoice {
    /// Case-insensitive unless the literal contains uppercase
    Smart,
    /// Always case-insensitive
    Ignore,
    /// Always case-sensitive
    Sensitive,
}

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorWhen {
    /// Automatically detect if stdout is a terminal
    Auto,
    /// Always use color
    Always,
    /// Never use color
    Never,
}

/// Subprocess failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HaltChoice {
    /// Ignore failures and continue
    Never,
    /// Stop dispatching new work, drain in-flight
    Soon,
    /// Stop dispatching and terminate in-flight subprocesses
    Now,
}

/// ff — find files by attribute expression
#[derive(Parser, Debug)]
#[command(name = "ff")]
#[command(about = "Parallel filesystem search with a typed attribute expression language")]
#[command(version)]
pub struct Cli {
    /// Tests or directories; a token is a directory iff it contains '/'
    /// and names an existing filesystem entry
    pub tokens: Vec<String>,

    /// Treat PATH as a directory to search regardless of its spelling
    #[arg(short = 'D', long = "directory", value_name = "PATH")]
    pub directories: Vec<PathBuf>,

    /// Exclude entries matching TEST; matching directories are not
    /// descended into
    #[arg(short = 'e', long = "exclude", value_name = "TEST")]
    pub exclude: Vec<String>,

    /// Exclude hidden entries (name starting with a dot)
    #[arg(short = 'H', long = "hide")]
    pub hide: bool,

    /// Exclude entries matching gitignore-style ignore files
    #[arg(short = 'I', long = "ignore")]
    pub ignore: bool,

    /// Do not read ignore files from ancestors of the starting points
    #[arg(long = "no-parent-ignore")]
    pub no_parent_ignore: bool,

    /// Comma-separated list of recognized ignore file names
    #[arg(
        long = "ignore-files",
        value_name = "LIST",
        default_value = ".gitignore,.ignore,.fdignore,.ffignore"
    )]
    pub ignore_files: String,

    /// Depth window: N (max depth), 'a:b', 'a:' or ':b'
    #[arg(short = 'd', long = "depth", value_name = "RANGE")]
    pub depth: Option<String>,

    /// Case sensitivity for string operators
    #[arg(short = 'c', long = "case", value_enum, default_value = "smart")]
    pub case: CaseChoice,

    /// Follow symbolic links
    #[arg(short = 'L', long = "follow")]
    pub follow: bool,

    /// Do not cross filesystem boundaries
    #[arg(
        long = "one-file-system",
        visible_alias = "mount",
        alias = "xdev"
    )]
    pub one_file_system: bool,

    /// Run CMD once per result, substituting placeholders
    #[arg(
        short = 'x',
        long = "exec",
        value_name = "CMD",
        num_args = 1..,
        allow_hyphen_values = true,
        value_terminator = ";"
    )]
    pub exec: Option<Vec<String>>,

    /// Run CMD once with all results
    #[arg(
        short = 'X',
        long = "exec-batch",
        value_name = "CMD",
        num_args = 1..,
        allow_hyphen_values = true,
        value_terminator = ";",
        conflicts_with = "exec"
    )]
    pub exec_batch: Option<Vec<String>>,

    /// What to do when a subprocess fails
    #[arg(long = "halt", value_enum, default_value = "never")]
    pub halt: HaltChoice,

    /// When to colorize the path attribute
    #[arg(short = 'C', long = "color", value_enum, default_value = "auto")]
    pub color: ColorWhen,

    /// Output absolute paths
    #[arg(short = 'a', long = "absolute-path")]
    pub absolute: bool,

    /// Terminate records with NUL instead of newline
    #[arg(short = '0', long = "print0")]
    pub print0: bool,

    /// Enable debug diagnostics
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Sort results by the given attribute list (default: path)
    #[arg(
        short = 'S',
        long = "sort",
        value_name = "ATTRS",
        num_args = 0..=1,
        default_missing_value = "path"
    )]
    pub sort: Option<String>,

    /// Reverse the sort order
    #[arg(short = 'R', long = "reverse")]
    pub reverse: bool,

    /// Count per attribute instead of printing records
    #[arg(
        long = "count",
        value_name = "ATTRS",
        num_args = 0..=1,
        default_missing_value = "size,type"
    )]
    pub count: Option<String>,

    /// Limit results: '[start]:[stop]' or 'pagesize,page'
    #[arg(short = 'l', long = "limit", value_name = "SLICE")]
    pub limit: Option<String>,

    /// Only the first result (same as -l :1)
    #[arg(short = '1')]
    pub first: bool,

    /// Attributes to print per record
    #[arg(short = 'o', long = "output", value_name = "ATTRS", default_value = "path")]
    pub output: String,

    /// Separator between output fields
    #[arg(long = "sep", value_name = "S", default_value = " ")]
    pub sep: String,

    /// Keep records with null fields
    #[arg(long = "all")]
    pub all: bool,

    /// Emit one JSON array of objects
    #[arg(long = "json")]
    pub json: bool,

    /// Emit one JSON object per line
    #[arg(long = "jsonl", visible_alias = "ndjson", conflicts_with = "json")]
    pub jsonl: bool,

    /// Exit with status 1 when nothing matches
    #[arg(long = "fail")]
    pub fail: bool,

    /// Size suffixes K, M, ... mean powers of 1000
    #[arg(long = "si")]
    pub si: bool,

    /// Cache file location
    #[arg(long = "cache", value_name = "PATH", env = "FF_CACHE")]
    pub cache: Option<PathBuf>,

    /// Disable the attribute cache
    #[arg(long = "no-cache")]
    pub no_cache: bool,

    /// Drop stale cache records and exit
    #[arg(long = "clean-cache")]
    pub clean_cache: bool,

    /// Number of worker threads (default: one per CPU)
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    pub jobs: Option<usize>,

    /// List every available attribute and exit
    #[arg(long = "help-attributes")]
    pub help_attributes: bool,

    /// List the value types and their operators and exit
    #[arg(long = "help-types")]
    pub help_types: bool,

    /// List the attribute providers and exit
    #[arg(long = "help-plugins")]
    pub help_plugins: bool,
}

/// Splits `FF_OPTIONS` into tokens, honoring single/double quotes and
/// backslash escapes.
pub fn split_options(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_token = true;
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                        in_token = true;
                    }
                }
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

/// Argv with `FF_OPTIONS` spliced in after the program name.
pub fn argv_with_env_options() -> Vec<String> {
    let mut argv: Vec<String> = std::env::args().collect();
    if let Ok(options) = std::env::var("FF_OPTIONS") {
        let extra = split_options(&options);
        argv.splice(1..1, extra);
    }
    argv
}
