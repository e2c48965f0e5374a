// ========================================================================================
//
//                        CORE DATA TYPES FOR THE LDSCAN ENGINE
//
// ========================================================================================
//
// This module is the canonical dictionary for the data structures shared across the
// major architectural boundaries of the application (`decode`, `kernel`, `window`,
// `matrix`, `pipeline`, `main`).
//
// By centralizing these definitions we keep a single source of truth and a one-way
// dependency graph: high-level modules depend on these core types, never on each
// other's implementation details. Types used by only one module do not belong here.

use std::path::PathBuf;

use thiserror::Error;

// ========================================================================================
//                              GENOTYPE DOSAGE CODES
// ========================================================================================

/// A per-sample genotype dosage at a biallelic site.
///
/// The payload is one of `0` (homozygous reference), `1` (heterozygous),
/// `2` (homozygous alternate), or the negative missing sentinel. The `i8`
/// representation keeps a variant's genotype vector dense (one byte per sample)
/// and lets the statistics kernel test for missingness with a single sign check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct GenotypeCode(pub i8);

impl GenotypeCode {
    /// The sentinel for a missing, malformed, or non-biallelic genotype call.
    pub const MISSING: GenotypeCode = GenotypeCode(-1);

    pub const HOM_REF: GenotypeCode = GenotypeCode(0);
    pub const HET: GenotypeCode = GenotypeCode(1);
    pub const HOM_ALT: GenotypeCode = GenotypeCode(2);

    #[inline(always)]
    pub fn is_missing(self) -> bool {
        self.0 < 0
    }
}

// ========================================================================================
//                                      VARIANT
// ========================================================================================

/// The per-variant summary statistics needed to fast-reject hopeless pair
/// comparisons before the expensive joint scan.
///
/// These fields are derived exactly once from the genotype vector when the
/// `Variant` is constructed, and the vector is never mutated afterwards, so
/// they can never fall out of sync with the codes they summarize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariantSummary {
    /// Number of samples with a non-missing code.
    pub valid_count: u32,
    /// Sum of the non-missing codes.
    pub sum: u64,
    /// Sum of the squared non-missing codes.
    pub sum_squares: u64,
    /// `sum / valid_count`, or 0.0 when no sample is valid.
    pub mean: f64,
    /// `E[x^2] - E[x]^2` over the non-missing codes, or 0.0 when no sample is valid.
    pub variance: f64,
}

impl VariantSummary {
    fn from_codes(codes: &[GenotypeCode]) -> Self {
        let mut valid_count: u32 = 0;
        let mut sum: u64 = 0;
        let mut sum_squares: u64 = 0;
        for code in codes {
            if code.is_missing() {
                continue;
            }
            let x = code.0 as u64;
            valid_count += 1;
            sum += x;
            sum_squares += x * x;
        }
        if valid_count == 0 {
            return VariantSummary {
                valid_count: 0,
                sum: 0,
                sum_squares: 0,
                mean: 0.0,
                variance: 0.0,
            };
        }
        let n = valid_count as f64;
        let mean = sum as f64 / n;
        let variance = sum_squares as f64 / n - mean * mean;
        VariantSummary {
            valid_count,
            sum,
            sum_squares,
            mean,
            variance,
        }
    }
}

/// One decoded variant record: its coordinates, its label, and one genotype
/// dosage code per sample in input column order.
///
/// A `Variant` is immutable after decoding. Its summary statistics are computed
/// once by the constructor and reused by every pairwise comparison it takes
/// part in.
#[derive(Debug, Clone)]
pub struct Variant {
    chromosome: String,
    position: u64,
    id: String,
    codes: Vec<GenotypeCode>,
    summary: VariantSummary,
}

impl Variant {
    pub fn new(chromosome: String, position: u64, id: String, codes: Vec<GenotypeCode>) -> Self {
        let summary = VariantSummary::from_codes(&codes);
        Variant {
            chromosome,
            position,
            id,
            codes,
            summary,
        }
    }

    #[inline(always)]
    pub fn chromosome(&self) -> &str {
        &self.chromosome
    }

    #[inline(always)]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// The variant's label: the ID column, or the synthesized `chrom:pos` form
    /// when the input carried `.` in that field.
    #[inline(always)]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline(always)]
    pub fn codes(&self) -> &[GenotypeCode] {
        &self.codes
    }

    #[inline(always)]
    pub fn summary(&self) -> &VariantSummary {
        &self.summary
    }
}

// ========================================================================================
//                                 RUN CONFIGURATION
// ========================================================================================

/// An inclusive genomic interval on a single chromosome, parsed from the
/// `chrom:start-end` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub chromosome: String,
    pub start: u64,
    pub end: u64,
}

impl Region {
    /// Parses `chrom:start-end`. Both bounds are inclusive; `start > end`,
    /// a missing separator, or a non-numeric bound is a configuration error.
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let err = || EngineError::InvalidRegion(text.to_string());
        let (chromosome, range) = text.split_once(':').ok_or_else(err)?;
        let (start, end) = range.split_once('-').ok_or_else(err)?;
        if chromosome.is_empty() {
            return Err(err());
        }
        let start: u64 = start.parse().map_err(|_| err())?;
        let end: u64 = end.parse().map_err(|_| err())?;
        if start > end {
            return Err(err());
        }
        Ok(Region {
            chromosome: chromosome.to_string(),
            start,
            end,
        })
    }

    #[inline(always)]
    pub fn contains(&self, chromosome: &str, position: u64) -> bool {
        chromosome == self.chromosome && position >= self.start && position <= self.end
    }
}

/// Which pair-enumeration strategy the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// Single-pass sliding window: each new variant is compared against the
    /// most recent `window_size` variants only.
    Streaming,
    /// Materialize every qualifying variant and emit the dense MxM r^2 matrix.
    Matrix,
}

/// The immutable configuration snapshot for one run.
///
/// Built exactly once in `main` before any record is read, then passed by
/// reference into every component. There is no ambient or global state.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Restrict the computation to variants inside this region, if set.
    pub region: Option<Region>,
    /// Sliding-window capacity in variants (streaming mode only).
    pub window_size: usize,
    /// Emission threshold: pairs with r^2 below this are not reported.
    /// Always within [0, 1].
    pub min_r2: f64,
    /// Maximum genomic distance between same-chromosome pair members.
    /// 0 means unlimited.
    pub max_distance: u64,
    /// Worker threads for matrix row computation. Always >= 1 after resolution.
    pub threads: usize,
    pub mode: Mode,
    /// Suppress per-record diagnostics on stderr.
    pub quiet: bool,
}

impl EngineConfig {
    /// Normalizes raw flag values into a valid configuration: the threshold is
    /// clamped into [0, 1] and a thread count of 0 resolves to the number of
    /// available CPUs.
    pub fn new(
        region: Option<Region>,
        window_size: usize,
        min_r2: f64,
        max_distance: u64,
        threads: usize,
        mode: Mode,
        quiet: bool,
    ) -> Self {
        let min_r2 = if min_r2.is_nan() {
            0.0
        } else {
            min_r2.clamp(0.0, 1.0)
        };
        let threads = if threads == 0 {
            num_cpus::get()
        } else {
            threads
        };
        EngineConfig {
            region,
            window_size: window_size.max(1),
            min_r2,
            max_distance,
            threads,
            mode,
            quiet,
        }
    }
}

// ========================================================================================
//                                   ERROR TAXONOMY
// ========================================================================================

/// Unrecoverable, configuration-class failures.
///
/// Everything else the engine encounters mid-stream (short records, malformed
/// positions, bad genotype tokens) is a skip-and-continue condition handled at
/// the decode layer, never an `EngineError`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid region '{0}': expected chrom:start-end with start <= end")]
    InvalidRegion(String),

    #[error("cannot open input file '{path}': {source}")]
    InputOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
