//! The output sink (spec.md §5): the engine always renders into an
//! in-memory buffer; `Sink` is where that buffer meets the outside
//! world — a file opened with `-o`, or stdout.

use std::fs::File;
use std::io::{self, Write};

pub enum Sink {
    Buffer(Vec<u8>),
    File(File),
    Stdout,
}

impl Sink {
    pub fn buffer() -> Self {
        Sink::Buffer(Vec::new())
    }

    pub fn file(f: File) -> Self {
        Sink::File(f)
    }

    pub fn stdout() -> Self {
        Sink::Stdout
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Sink::Buffer(buf) => {
                buf.extend_from_slice(bytes);
                Ok(())
            }
            Sink::File(f) => f.write_all(bytes),
            Sink::Stdout => io::stdout().write_all(bytes),
        }
    }

    /// Flushes a file/stdout sink, or returns the accumulated buffer for
    /// a `Sink::Buffer` (used by tests and by callers that want the bytes
    /// rather than a side effect).
    pub fn close(mut self) -> io::Result<Option<Vec<u8>>> {
        match &mut self {
            Sink::Buffer(_) => {}
            Sink::File(f) => f.flush()?,
            Sink::Stdout => io::stdout().flush()?,
        }
        Ok(match self {
            Sink::Buffer(buf) => Some(buf),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_sink_accumulates_writes() {
        let mut sink = Sink::buffer();
        sink.write_all(b"ab").unwrap();
        sink.write_all(b"cd").unwrap();
        assert_eq!(sink.close().unwrap(), Some(b"abcd".to_vec()));
    }
}
