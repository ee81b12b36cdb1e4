//! The boundary between the execution engine's in-memory render and a
//! caller-supplied [`Sink`] (spec.md §4.8/§5). Kept as its own module to
//! mirror the teacher's "internals vs. I/O" split even though this
//! implementation computes the whole output in memory before handing it
//! to the sink, rather than streaming writes as matches are found.

use crate::expr::Expr;
use crate::html::Doc;

use super::exec::Engine;
use super::sink::Sink;

/// Runs `expr` against `doc` and writes the result into `sink`.
pub fn render(expr: &Expr, doc: &Doc, sink: &mut Sink) -> std::io::Result<()> {
    let bytes = Engine::new(doc).run(expr);
    sink.write_all(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::{parse, ParseOptions};

    #[test]
    fn render_writes_bytes_to_sink() {
        let doc = parse(b"<a>1</a>".to_vec(), ParseOptions::default(), None).unwrap();
        let expr = crate::expr::compile(b"a").unwrap();
        let mut sink = Sink::buffer();
        render(&expr, &doc, &mut sink).unwrap();
        assert_eq!(sink.close().unwrap(), Some(b"<a>1</a>\n".to_vec()));
    }
}
