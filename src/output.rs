// ========================================================================================
//
//                            BUFFERED OUTPUT WRITER
//
// ========================================================================================
//
// All engine output funnels through this writer. Formatted text accumulates in
// one in-memory buffer and is handed to the sink in bulk once the buffer
// crosses the flush threshold, plus unconditionally at `finish`. Syscall count
// stays flat no matter how many pairs qualify.
//
// Numeric formatting is `format!("{:.4}")`: fixed four fractional digits,
// locale-independent, identical on every platform.

use std::fmt::Write as FmtWrite;
use std::io::{self, Write};

use crate::types::Variant;

/// Buffer capacity reserved up front.
const BUFFER_CAPACITY: usize = 1024 * 1024;

/// Flush once the buffer grows past this. Below capacity so one more record
/// never forces a reallocation.
const FLUSH_THRESHOLD: usize = 900 * 1024;

/// Column header for the streaming pair report.
pub const STREAM_HEADER: &str = "CHROM_A\tPOS_A\tID_A\tCHROM_B\tPOS_B\tID_B\tR2";

pub struct OutputWriter<W: Write> {
    sink: W,
    buf: String,
}

impl<W: Write> OutputWriter<W> {
    pub fn new(sink: W) -> Self {
        OutputWriter {
            sink,
            buf: String::with_capacity(BUFFER_CAPACITY),
        }
    }

    /// The one-line header that precedes streaming pair records.
    pub fn stream_header(&mut self) -> io::Result<()> {
        self.line(STREAM_HEADER)
    }

    /// One qualifying pair, older member first.
    pub fn pair(&mut self, older: &Variant, newer: &Variant, r2: f64) -> io::Result<()> {
        // Writing into a String is infallible; the unwrap can never fire.
        writeln!(
            self.buf,
            "{}\t{}\t{}\t{}\t{}\t{}\t{:.4}",
            older.chromosome(),
            older.position(),
            older.id(),
            newer.chromosome(),
            newer.position(),
            newer.id(),
            r2
        )
        .unwrap();
        self.flush_if_full()
    }

    /// One pre-formatted line (matrix rows and framing).
    pub fn line(&mut self, text: &str) -> io::Result<()> {
        self.buf.push_str(text);
        self.buf.push('\n');
        self.flush_if_full()
    }

    fn flush_if_full(&mut self) -> io::Result<()> {
        if self.buf.len() >= FLUSH_THRESHOLD {
            self.flush_all()?;
        }
        Ok(())
    }

    fn flush_all(&mut self) -> io::Result<()> {
        self.sink.write_all(self.buf.as_bytes())?;
        self.buf.clear();
        Ok(())
    }

    /// Drains the buffer and flushes the sink. Must run on every exit path
    /// that produced output.
    pub fn finish(&mut self) -> io::Result<()> {
        self.flush_all()?;
        self.sink.flush()
    }
}
