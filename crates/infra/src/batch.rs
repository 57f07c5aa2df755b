//! Batched-write sink for bulk loads.
//!
//! Writes one `subject predicate object graph .` line per triple in
//! N-Triples term syntax, so the output can be fed to a bulk loader.

use std::io::Write;

use triplebind_core::{Iri, StoreError, Triple};

pub struct BatchWriter<'w, W: Write + ?Sized> {
    sink: &'w mut W,
    lines: usize,
}

impl<'w, W: Write + ?Sized> BatchWriter<'w, W> {
    pub fn new(sink: &'w mut W) -> Self {
        Self { sink, lines: 0 }
    }

    /// Append every triple and flush the sink.
    pub fn write_triples(&mut self, triples: &[Triple], graph: &Iri) -> Result<(), StoreError> {
        for t in triples {
            self.sink.write_all(t.to_nquad_line(graph).as_bytes())?;
            self.lines += 1;
        }
        self.sink.flush()?;
        Ok(())
    }

    pub fn lines_written(&self) -> usize {
        self.lines
    }
}
