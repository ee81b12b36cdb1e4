//! Command-line flags (spec.md §6, precision from `original_source/
//! src/cli/main.c` and `usage.c`).

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "htq", version, about = "Command-line HTML search and extraction engine", long_about = None)]
pub struct Cli {
    /// Read the query expression from FILE instead of the positional
    /// argument or `-e`.
    #[arg(short = 'f', long = "expr-file", value_name = "FILE")]
    pub expr_file: Option<PathBuf>,

    /// The query expression, given inline instead of the positional
    /// argument or `-f`.
    #[arg(short = 'e', long = "expr", value_name = "EXPR")]
    pub expr: Option<String>,

    /// Write output to FILE instead of stdout.
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Write error messages to FILE instead of stderr.
    #[arg(short = 'E', long = "errors", value_name = "FILE")]
    pub errors: Option<PathBuf>,

    /// Recurse into directories given as input paths.
    #[arg(short = 'r')]
    pub recursive: bool,

    /// Recurse into directories given as input paths, following
    /// symlinks.
    #[arg(short = 'R')]
    pub recursive_follow_symlinks: bool,

    /// List-structure shortcut: equivalent to a query of
    /// `* | "%I %c %s %n\n"` over the whole document.
    #[arg(short = 'l')]
    pub list: bool,

    /// Reference URL used to resolve relative URLs for the `U` output
    /// field type.
    #[arg(short = 'u', long = "url", value_name = "URL")]
    pub url: Option<String>,

    /// The query expression (when neither `-f` nor `-e` nor `-l` is
    /// given) followed by input files; with `-f`/`-e`/`-l`, every
    /// positional is an input file. No input files means read from
    /// stdin.
    #[arg(value_name = "QUERY-OR-FILE")]
    pub positionals: Vec<PathBuf>,
}
