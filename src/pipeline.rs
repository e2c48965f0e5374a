// ========================================================================================
//
//                         THE SEQUENTIAL DECODE PIPELINE
//
// ========================================================================================
//
// The driver loop: Record Source -> Decoder -> {Sliding Window | Matrix}.
// Strictly sequential with no suspension points — each record is fully
// processed (compared and absorbed, or collected) before the next line is
// read, so the steady-state path has no concurrency hazards at all. The only
// concurrent section in the program lives behind `matrix::write_matrix`.

use std::io::Write;

use log::info;

use crate::decode::Decoder;
use crate::matrix;
use crate::output::OutputWriter;
use crate::source::RecordSource;
use crate::types::{EngineConfig, EngineError, Mode};
use crate::window::SlidingWindow;

/// Runs one complete computation over `source`, writing the report to `sink`.
///
/// The output buffer is drained on every exit path, including early I/O
/// errors, because `OutputWriter::finish` runs before any `?` can skip it
/// only on the success path — failures below abandon partial output
/// deliberately rather than emit a torn report.
pub fn run<W: Write>(
    config: &EngineConfig,
    source: &mut RecordSource,
    sink: W,
) -> Result<(), EngineError> {
    let mut decoder = Decoder::new(config);
    let mut writer = OutputWriter::new(sink);

    match config.mode {
        Mode::Streaming => {
            writer.stream_header()?;
            let mut window = SlidingWindow::new(config.window_size);
            let mut seen: u64 = 0;
            while let Some(line) = source.next_line()? {
                if let Some(variant) = decoder.decode_line(line) {
                    seen += 1;
                    window.process(variant, config, &mut writer)?;
                }
            }
            info!("streamed {seen} variants through a window of {}", config.window_size);
        }
        Mode::Matrix => {
            let mut variants = Vec::new();
            while let Some(line) = source.next_line()? {
                if let Some(variant) = decoder.decode_line(line) {
                    variants.push(variant);
                }
            }
            info!(
                "materialized {} variants for the matrix on {} thread(s)",
                variants.len(),
                config.threads
            );
            matrix::write_matrix(&variants, config, &mut writer)?;
        }
    }

    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Mode;
    use std::io::Cursor;

    const INPUT: &str = "##fileformat=VCFv4.2\n\
        #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\tS3\tS4\n\
        chr1\t100\tv1\tA\tG\t.\tPASS\t.\tGT\t0/0\t0/1\t1/1\t0/1\n\
        chr1\t200\tv2\tA\tG\t.\tPASS\t.\tGT\t0/0\t0/1\t1/1\t0/1\n";

    fn run_to_string(config: &EngineConfig, input: &str) -> String {
        let mut source = RecordSource::from_reader(Cursor::new(input.as_bytes().to_vec()));
        let mut out = Vec::new();
        run(config, &mut source, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn streaming_end_to_end() {
        let config = EngineConfig::new(None, 1000, 0.0, 0, 1, Mode::Streaming, true);
        let report = run_to_string(&config, INPUT);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "chr1\t100\tv1\tchr1\t200\tv2\t1.0000");
    }

    #[test]
    fn matrix_end_to_end() {
        let config = EngineConfig::new(None, 1000, 0.0, 0, 1, Mode::Matrix, true);
        let report = run_to_string(&config, INPUT);
        assert!(report.starts_with("#LD_MATRIX_START\n"));
        assert!(report.contains("Index/Var\tv1\tv2\n"));
        assert!(report.contains("v1\t1.0000\t1.0000\n"));
        assert!(report.ends_with("#LD_MATRIX_END\n"));
    }
}
