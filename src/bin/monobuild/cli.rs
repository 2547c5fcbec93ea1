//! CLI definitions using clap.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Arg, CommandFactory, Parser};
use serde::Serialize;

use monobuild::builder::MessageFormat;
use monobuild::ops::BuildOptions;

/// monobuild - build every package of a TypeScript monorepo in dependency order
#[derive(Parser, Debug)]
#[command(name = "monobuild")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Only build packages whose name matches this glob (repeatable)
    #[arg(long, value_name = "GLOB", env = "MONOBUILD_SCOPE", value_delimiter = ',')]
    pub scope: Vec<String>,

    /// Skip packages whose name matches this glob (repeatable)
    #[arg(long, value_name = "GLOB", env = "MONOBUILD_IGNORE", value_delimiter = ',')]
    pub ignore: Vec<String>,

    /// Rebuild packages when their sources change
    #[arg(long, env = "MONOBUILD_WATCH")]
    pub watch: bool,

    /// Directory to start workspace discovery from
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Output format for build messages
    #[arg(long, value_enum, default_value_t = MessageFormat::Human)]
    pub message_format: MessageFormat,

    /// Warn about packages without entry points
    #[arg(long)]
    pub warn_empty: bool,

    /// Unrecognized arguments; accepted and ignored
    #[arg(skip)]
    pub extra: Vec<String>,
}

/// The parsed options, as echoed to stdout.
#[derive(Debug, Serialize)]
pub struct Options<'a> {
    pub scope: &'a [String],
    pub ignore: &'a [String],
    pub watch: bool,
    pub extra: &'a [String],
}

impl Cli {
    /// Parse the process arguments, setting unrecognized ones aside.
    ///
    /// Exits on malformed known arguments, like [`Parser::parse`].
    pub fn parse_lenient() -> Self {
        Self::try_parse_lenient(std::env::args_os()).unwrap_or_else(|e| e.exit())
    }

    /// Parse `args`, moving unrecognized ones into `extra`.
    pub fn try_parse_lenient<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let (known, extra) = split_unknown(args);
        let mut cli = Cli::try_parse_from(known)?;
        cli.extra = extra;
        Ok(cli)
    }

    /// View of the options that drive package selection.
    pub fn options(&self) -> Options<'_> {
        Options {
            scope: &self.scope,
            ignore: &self.ignore,
            watch: self.watch,
            extra: &self.extra,
        }
    }

    /// Options for the build operation.
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            scope: self.scope.clone(),
            ignore: self.ignore.clone(),
            watch: self.watch,
            jobs: self.jobs,
            warn_empty: self.warn_empty,
        }
    }
}

/// Split `args` into those clap knows about and the rest.
///
/// A known flag that takes a value keeps the following token with it.
fn split_unknown<I, T>(args: I) -> (Vec<OsString>, Vec<String>)
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut cmd = Cli::command();
    cmd.build();

    let mut args = args.into_iter().map(Into::into);
    let mut known: Vec<OsString> = args.next().into_iter().collect();
    let mut extra = Vec::new();
    let mut expects_value = false;

    for arg in args {
        if expects_value {
            known.push(arg);
            expects_value = false;
            continue;
        }

        let text = arg.to_string_lossy().into_owned();
        match lookup_flag(&cmd, &text) {
            Some((flag, inline_value)) => {
                expects_value = flag.get_action().takes_values() && !inline_value;
                known.push(arg);
            }
            None => extra.push(text),
        }
    }

    (known, extra)
}

/// Find the argument a token names, and whether it carries its value inline.
fn lookup_flag<'c>(cmd: &'c clap::Command, token: &str) -> Option<(&'c Arg, bool)> {
    if let Some(long) = token.strip_prefix("--") {
        let (name, inline) = match long.split_once('=') {
            Some((name, _)) => (name, true),
            None => (long, false),
        };
        if name.is_empty() {
            return None;
        }
        return cmd
            .get_arguments()
            .find(|a| a.get_long() == Some(name))
            .map(|a| (a, inline));
    }

    let shorts = token.strip_prefix('-')?;
    let short = shorts.chars().next()?;
    cmd.get_arguments()
        .find(|a| a.get_short() == Some(short))
        .map(|a| (a, shorts.len() > 1))
}
