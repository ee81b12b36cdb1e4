//! The one thing `htq` does: compile a query, read one or more HTML
//! documents, run the engine over each, and write the concatenated
//! result to a sink (spec.md §5, §6).

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::cli::args::Cli;
use crate::engine::{Engine, Sink};
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::html::{self, ParseOptions};

/// `-l`'s canned query: every tag, one line of `byte-offset
/// child-tag-count all-length tag-name` per match.
const LIST_QUERY: &[u8] = b"* | \"%I %c %s %n\\n\"";

pub fn run(cli: Cli) -> Result<()> {
    let expr_src = expr_source(&cli)?;
    let expr = crate::expr::compile(&expr_src).map_err(Error::Script)?;

    let inputs = input_paths(&cli);
    let url = cli.url.as_deref().and_then(|u| url::Url::parse(u).ok());

    let mut sink = match &cli.output {
        Some(path) => Sink::file(fs::File::create(path)?),
        None => Sink::stdout(),
    };

    if inputs.is_empty() {
        let mut data = Vec::new();
        std::io::stdin().read_to_end(&mut data)?;
        render_one(&expr, data, url.clone(), &mut sink)?;
    } else {
        for path in &inputs {
            let data = read_input(path, cli.recursive || cli.recursive_follow_symlinks)?;
            render_one(&expr, data, url.clone(), &mut sink)?;
        }
    }

    sink.close()?;
    Ok(())
}

fn render_one(expr: &Expr, data: Vec<u8>, url: Option<url::Url>, sink: &mut Sink) -> Result<()> {
    let doc = html::parse(data, ParseOptions::default(), url).map_err(Error::Html)?;
    let bytes = Engine::new(&doc).run(expr);
    sink.write_all(&bytes)?;
    Ok(())
}

/// `-r`/`-R` direct full directory recursion out of scope (spec.md §1
/// non-goals); they are accepted and recorded, and a directory path is
/// read as a single file read attempt (which naturally reports a system
/// error, matching the non-recursive fallback documented in
/// SPEC_FULL.md §3).
fn read_input(path: &Path, _recursive: bool) -> Result<Vec<u8>> {
    Ok(fs::read(path)?)
}

fn expr_source(cli: &Cli) -> Result<Vec<u8>> {
    if cli.list {
        return Ok(LIST_QUERY.to_vec());
    }
    if let Some(path) = &cli.expr_file {
        return Ok(fs::read(path)?);
    }
    if let Some(expr) = &cli.expr {
        return Ok(expr.as_bytes().to_vec());
    }
    match cli.positionals.first() {
        Some(p) => Ok(p.to_string_lossy().into_owned().into_bytes()),
        None => Err(Error::Script(crate::error::ScriptError::at(0, "missing query expression"))),
    }
}

/// Input file paths, after the positional that doubled as the query
/// source (when applicable) is stripped off.
fn input_paths(cli: &Cli) -> Vec<PathBuf> {
    let uses_positional_query = !cli.list && cli.expr_file.is_none() && cli.expr.is_none();
    if uses_positional_query {
        cli.positionals.iter().skip(1).cloned().collect()
    } else {
        cli.positionals.clone()
    }
}
