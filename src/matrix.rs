// ========================================================================================
//
//                          ALL-PAIRS MATRIX ENGINE
//
// ========================================================================================
//
// The alternative to the sliding window: materialize every qualifying variant
// for the region, then emit the dense MxM r^2 matrix. Quadratic in M and
// intended for small regions only; memory is O(M x samples).
//
// Row computation is the one concurrent section of the whole program. When
// the configured thread count exceeds one and M is large enough to amortize
// spawn cost, a fixed pool of scoped workers shares exactly one piece of
// state: an atomic row counter. Each worker claims the next unclaimed row
// index, renders that entire row into its own private buffer, and loops until
// every row is claimed. Correctness does not depend on which worker claims
// which row, only on every index in [0, M) being claimed exactly once; the
// rendered rows are stitched back together in row-index order, so the output
// is byte-identical to the inline single-threaded path no matter how the
// scheduler interleaves the workers.

use std::fmt::Write as FmtWrite;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use crate::kernel;
use crate::output::OutputWriter;
use crate::types::{EngineConfig, Variant};

/// Framing lines carried over from the classic matrix report format.
pub const MATRIX_START: &str = "#LD_MATRIX_START";
pub const MATRIX_END: &str = "#LD_MATRIX_END";
pub const MATRIX_EMPTY: &str = "No or only one variant in the region => no pairwise LD.";

/// Corner label of the header row.
const CORNER_LABEL: &str = "Index/Var";

/// Below this many variants the rows are cheap enough that spawning a worker
/// pool costs more than it buys. A tuning constant, not a correctness knob.
const PARALLEL_MIN_VARIANTS: usize = 64;

/// Renders row `i` of the matrix: the variant's own label, then one r^2 cell
/// per column at four decimal places, diagonal pinned to exactly 1.0.
fn render_row(variants: &[Variant], i: usize, buf: &mut String) {
    buf.push_str(variants[i].id());
    for (j, other) in variants.iter().enumerate() {
        if i == j {
            buf.push_str("\t1.0000");
        } else {
            let r2 = kernel::r_squared(&variants[i], other);
            write!(buf, "\t{r2:.4}").unwrap();
        }
    }
}

/// Renders all rows on the calling thread.
fn render_rows_inline(variants: &[Variant]) -> Vec<String> {
    let mut rows = Vec::with_capacity(variants.len());
    let mut buf = String::new();
    for i in 0..variants.len() {
        buf.clear();
        render_row(variants, i, &mut buf);
        rows.push(buf.clone());
    }
    rows
}

/// Renders all rows on a fixed worker pool coordinated by one atomic
/// claim-next-row counter.
fn render_rows_parallel(variants: &[Variant], threads: usize) -> Vec<String> {
    let m = variants.len();
    let next_row = AtomicUsize::new(0);
    let workers = threads.min(m);

    let mut claimed: Vec<(usize, String)> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| {
                    let mut rendered: Vec<(usize, String)> = Vec::new();
                    loop {
                        // Relaxed is enough: the counter is the only shared
                        // state and claim order is irrelevant.
                        let row = next_row.fetch_add(1, Ordering::Relaxed);
                        if row >= m {
                            break;
                        }
                        let mut buf = String::new();
                        render_row(variants, row, &mut buf);
                        rendered.push((row, buf));
                    }
                    rendered
                })
            })
            .collect();

        let mut all = Vec::with_capacity(m);
        for handle in handles {
            match handle.join() {
                Ok(rows) => all.extend(rows),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        all
    });

    // Completion order depends on scheduling; output order must not.
    claimed.sort_by_key(|(row, _)| *row);
    claimed.into_iter().map(|(_, text)| text).collect()
}

/// Emits the full matrix report for the materialized variant list.
pub fn write_matrix<W: Write>(
    variants: &[Variant],
    config: &EngineConfig,
    writer: &mut OutputWriter<W>,
) -> io::Result<()> {
    writer.line(MATRIX_START)?;

    if variants.len() < 2 {
        writer.line(MATRIX_EMPTY)?;
        writer.line(MATRIX_END)?;
        return Ok(());
    }

    let mut header = String::from(CORNER_LABEL);
    for v in variants {
        header.push('\t');
        header.push_str(v.id());
    }
    writer.line(&header)?;

    let rows = if config.threads > 1 && variants.len() >= PARALLEL_MIN_VARIANTS {
        render_rows_parallel(variants, config.threads)
    } else {
        render_rows_inline(variants)
    };
    for row in &rows {
        writer.line(row)?;
    }

    writer.line(MATRIX_END)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GenotypeCode, Mode};

    fn variant(pos: u64, codes: &[i8]) -> Variant {
        Variant::new(
            "1".into(),
            pos,
            format!("1:{pos}"),
            codes.iter().map(|&c| GenotypeCode(c)).collect(),
        )
    }

    fn config(threads: usize) -> EngineConfig {
        EngineConfig::new(None, 1000, 0.0, 0, threads, Mode::Matrix, true)
    }

    fn render(variants: &[Variant], threads: usize) -> String {
        let mut out = Vec::new();
        let mut writer = OutputWriter::new(&mut out);
        write_matrix(variants, &config(threads), &mut writer).unwrap();
        writer.finish().unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn degenerate_inputs_emit_the_empty_marker() {
        for count in [0usize, 1] {
            let variants: Vec<Variant> =
                (0..count).map(|i| variant(10 * (i as u64 + 1), &[0, 1, 2, 1])).collect();
            let report = render(&variants, 1);
            assert_eq!(
                report,
                format!("{MATRIX_START}\n{MATRIX_EMPTY}\n{MATRIX_END}\n")
            );
        }
    }

    #[test]
    fn matrix_shape_and_diagonal() {
        let variants = vec![
            variant(10, &[0, 1, 2, 1]),
            variant(20, &[0, 1, 2, 1]),
            variant(30, &[1, 0, 1, 2]),
        ];
        let report = render(&variants, 1);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], MATRIX_START);
        assert_eq!(lines[1], "Index/Var\t1:10\t1:20\t1:30");
        assert_eq!(lines[2], "1:10\t1.0000\t1.0000\t0.0000");
        assert_eq!(lines[3], "1:20\t1.0000\t1.0000\t0.0000");
        assert_eq!(lines[4], "1:30\t0.0000\t0.0000\t1.0000");
        assert_eq!(lines[5], MATRIX_END);
    }

    #[test]
    fn matrix_is_symmetric() {
        let variants: Vec<Variant> = (0..8)
            .map(|i| {
                variant(
                    10 * (i + 1),
                    &[
                        (i % 3) as i8,
                        ((i + 1) % 3) as i8,
                        ((i * 2) % 3) as i8,
                        (i % 2) as i8,
                        -1,
                        ((i + 2) % 3) as i8,
                    ],
                )
            })
            .collect();
        let report = render(&variants, 1);
        let cells: Vec<Vec<&str>> = report
            .lines()
            .skip(2)
            .take(variants.len())
            .map(|line| line.split('\t').skip(1).collect())
            .collect();
        for i in 0..variants.len() {
            for j in 0..variants.len() {
                assert_eq!(cells[i][j], cells[j][i], "asymmetry at ({i},{j})");
            }
        }
    }

    #[test]
    fn parallel_rendering_is_byte_identical_to_inline() {
        // Enough variants to cross the parallel threshold.
        let variants: Vec<Variant> = (0..PARALLEL_MIN_VARIANTS as u64 + 8)
            .map(|i| {
                variant(
                    10 * (i + 1),
                    &[
                        (i % 3) as i8,
                        ((i + 1) % 4 % 3) as i8,
                        ((i * 7) % 3) as i8,
                        ((i * 5) % 2) as i8,
                    ],
                )
            })
            .collect();
        let single = render(&variants, 1);
        let multi = render(&variants, 4);
        assert_eq!(single, multi);
    }

    #[test]
    fn every_row_is_claimed_exactly_once() {
        let variants: Vec<Variant> = (0..100)
            .map(|i| variant(10 * (i + 1), &[(i % 3) as i8, ((i + 1) % 3) as i8, 1, 0]))
            .collect();
        let rows = render_rows_parallel(&variants, 8);
        assert_eq!(rows.len(), variants.len());
        for (i, row) in rows.iter().enumerate() {
            assert!(row.starts_with(variants[i].id()), "row {i} out of order");
        }
    }
}
