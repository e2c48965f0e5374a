// ========================================================================================
//
//                  RECORD DECODER AND GENOTYPE ENCODER
//
// ========================================================================================
//
// The airlock between raw record bytes and validated `Variant` values. One
// decoded line either produces a fully-built, immutable `Variant` or an
// explicit "skip this line" outcome; nothing half-parsed ever crosses this
// boundary, and no data-quality problem aborts the run.
//
// The decode contract, in order:
//
//   1. Metadata lines (`#...`) carry no records. The single `#CHROM` column
//      header fixes the sample count for the whole input; it must precede the
//      first data line.
//   2. A data line splits on tab into at least 10 fields. Fewer is a dropped
//      record with a diagnostic.
//   3. The region filter, when configured, discards records on other
//      chromosomes or outside the inclusive bounds.
//   4. Per-sample genotype tokens degrade individually: a malformed token
//      becomes the missing sentinel for that sample only.

use log::{debug, warn};

use crate::types::{EngineConfig, GenotypeCode, Variant};

/// The 6-character marker that introduces the column header line.
const CHROM_HEADER_PREFIX: &[u8] = b"#CHROM";

/// CHROM, POS, ID, REF, ALT, QUAL, FILTER, INFO, FORMAT.
const FIXED_FIELD_COUNT: usize = 9;

/// A record needs the fixed fields plus at least one sample column.
const MIN_FIELD_COUNT: usize = FIXED_FIELD_COUNT + 1;

// ========================================================================================
//                                FIELD-SPAN TABLE
// ========================================================================================

/// A reusable table of `(offset, length)` spans for one tab-split line.
///
/// This replaces pointer-walking over the raw buffer with bounds-checked
/// subslicing, and it is the same table whether the line came from the memory
/// map or from a stream buffer. The backing vector keeps its capacity across
/// records, so the steady state allocates nothing.
#[derive(Debug, Default)]
pub struct FieldSpans {
    spans: Vec<(u32, u32)>,
}

impl FieldSpans {
    pub fn new() -> Self {
        FieldSpans {
            spans: Vec::with_capacity(16),
        }
    }

    /// Splits `line` on tab. Every byte belongs to exactly one field; two
    /// adjacent tabs produce an empty field.
    pub fn split(&mut self, line: &[u8]) {
        self.spans.clear();
        let mut start = 0usize;
        for tab in memchr::memchr_iter(b'\t', line) {
            self.spans.push((start as u32, (tab - start) as u32));
            start = tab + 1;
        }
        self.spans.push((start as u32, (line.len() - start) as u32));
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// The bytes of field `index` within `line`, or `None` past the last field.
    #[inline(always)]
    pub fn field<'l>(&self, line: &'l [u8], index: usize) -> Option<&'l [u8]> {
        let (offset, len) = *self.spans.get(index)?;
        Some(&line[offset as usize..offset as usize + len as usize])
    }
}

// ========================================================================================
//                               GENOTYPE ENCODING
// ========================================================================================

/// Converts one raw sample-column field into a tri-state dosage code.
///
/// Only the sub-token before the first `:` matters; trailing colon-delimited
/// sub-fields (depth, quality, ...) are irrelevant here. A valid token is two
/// single-digit biallelic alleles joined by `/` or `|`; phasing does not
/// affect the code. Everything else (empty, `.`, `./.`, haploid, multi-digit,
/// allele values above 1) is the missing sentinel.
#[inline]
pub fn encode_genotype(field: &[u8]) -> GenotypeCode {
    let token = match memchr::memchr(b':', field) {
        Some(colon) => &field[..colon],
        None => field,
    };
    if token.len() != 3 {
        return GenotypeCode::MISSING;
    }
    let sep = token[1];
    if sep != b'/' && sep != b'|' {
        return GenotypeCode::MISSING;
    }
    let a = token[0].wrapping_sub(b'0');
    let b = token[2].wrapping_sub(b'0');
    if a > 1 || b > 1 {
        // Covers `.` alleles, non-digits, and multi-allelic values alike.
        return GenotypeCode::MISSING;
    }
    GenotypeCode((a + b) as i8)
}

// ========================================================================================
//                                  RECORD DECODER
// ========================================================================================

/// Streaming decoder for one input. Holds the header state (sample count) and
/// the reusable span table; configuration is borrowed, immutable, and shared
/// with every other component.
pub struct Decoder<'cfg> {
    config: &'cfg EngineConfig,
    sample_count: Option<usize>,
    spans: FieldSpans,
}

impl<'cfg> Decoder<'cfg> {
    pub fn new(config: &'cfg EngineConfig) -> Self {
        Decoder {
            config,
            sample_count: None,
            spans: FieldSpans::new(),
        }
    }

    /// Sample count fixed by the `#CHROM` header, once seen.
    pub fn sample_count(&self) -> Option<usize> {
        self.sample_count
    }

    /// Decodes one line. `None` means "no record here": metadata, an empty
    /// line, a filtered-out record, or a dropped malformed record.
    pub fn decode_line(&mut self, line: &[u8]) -> Option<Variant> {
        if line.is_empty() {
            return None;
        }
        if line[0] == b'#' {
            if self.sample_count.is_none() && line.starts_with(CHROM_HEADER_PREFIX) {
                self.spans.split(line);
                self.sample_count = Some(self.spans.len().saturating_sub(FIXED_FIELD_COUNT));
            }
            return None;
        }

        let Some(sample_count) = self.sample_count else {
            warn!("data line before #CHROM header; record dropped");
            return None;
        };

        self.spans.split(line);
        if self.spans.len() < MIN_FIELD_COUNT {
            warn!(
                "record with {} fields (need at least {}); record dropped",
                self.spans.len(),
                MIN_FIELD_COUNT
            );
            return None;
        }

        let chromosome = match std::str::from_utf8(self.spans.field(line, 0)?) {
            Ok(c) => c,
            Err(_) => {
                debug!("non-UTF-8 chromosome field; record dropped");
                return None;
            }
        };
        // Permissive numeric parsing: a bad position is a skipped record,
        // never an abort.
        let position = match lexical_core::parse::<u64>(self.spans.field(line, 1)?) {
            Ok(p) => p,
            Err(_) => {
                debug!("unparsable position on chromosome {chromosome}; record dropped");
                return None;
            }
        };

        if let Some(region) = &self.config.region {
            if !region.contains(chromosome, position) {
                return None;
            }
        }

        let id_field = self.spans.field(line, 2)?;
        let id = if id_field == b"." || id_field.is_empty() {
            format!("{chromosome}:{position}")
        } else {
            String::from_utf8_lossy(id_field).into_owned()
        };

        let mut codes = Vec::with_capacity(sample_count);
        for sample in 0..sample_count {
            let code = match self.spans.field(line, FIXED_FIELD_COUNT + sample) {
                Some(field) => encode_genotype(field),
                // A truncated record leaves its remaining samples missing.
                None => GenotypeCode::MISSING,
            };
            codes.push(code);
        }

        Some(Variant::new(
            chromosome.to_string(),
            position,
            id,
            codes,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EngineConfig, Mode, Region};

    fn config(region: Option<Region>) -> EngineConfig {
        EngineConfig::new(region, 1000, 0.0, 0, 1, Mode::Streaming, false)
    }

    const HEADER: &[u8] = b"#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\tS3\tS4";

    fn decode_all(config: &EngineConfig, lines: &[&[u8]]) -> Vec<Variant> {
        let mut decoder = Decoder::new(config);
        lines
            .iter()
            .filter_map(|line| decoder.decode_line(line))
            .collect()
    }

    #[test]
    fn genotype_truth_table() {
        assert_eq!(encode_genotype(b"0/0"), GenotypeCode::HOM_REF);
        assert_eq!(encode_genotype(b"0/1"), GenotypeCode::HET);
        assert_eq!(encode_genotype(b"1/0"), GenotypeCode::HET);
        assert_eq!(encode_genotype(b"1/1"), GenotypeCode::HOM_ALT);
        // Phasing is irrelevant.
        assert_eq!(encode_genotype(b"0|1"), GenotypeCode::HET);
        assert_eq!(encode_genotype(b"1|1"), GenotypeCode::HOM_ALT);
        // Sub-fields after the first colon are ignored.
        assert_eq!(encode_genotype(b"0/1:35:99"), GenotypeCode::HET);
        // Missing and malformed tokens.
        assert_eq!(encode_genotype(b""), GenotypeCode::MISSING);
        assert_eq!(encode_genotype(b"."), GenotypeCode::MISSING);
        assert_eq!(encode_genotype(b"./."), GenotypeCode::MISSING);
        assert_eq!(encode_genotype(b".|."), GenotypeCode::MISSING);
        assert_eq!(encode_genotype(b"0/."), GenotypeCode::MISSING);
        assert_eq!(encode_genotype(b"1"), GenotypeCode::MISSING);
        assert_eq!(encode_genotype(b"0-1"), GenotypeCode::MISSING);
        // Multi-allelic sites are out of scope.
        assert_eq!(encode_genotype(b"2/0"), GenotypeCode::MISSING);
        assert_eq!(encode_genotype(b"0/2"), GenotypeCode::MISSING);
        assert_eq!(encode_genotype(b"10/0"), GenotypeCode::MISSING);
    }

    #[test]
    fn decodes_a_basic_record() {
        let config = config(None);
        let variants = decode_all(
            &config,
            &[HEADER, b"chr1\t100\trs42\tA\tG\t.\tPASS\t.\tGT\t0/0\t0/1\t1/1\t./."],
        );
        assert_eq!(variants.len(), 1);
        let v = &variants[0];
        assert_eq!(v.chromosome(), "chr1");
        assert_eq!(v.position(), 100);
        assert_eq!(v.id(), "rs42");
        assert_eq!(
            v.codes(),
            &[
                GenotypeCode::HOM_REF,
                GenotypeCode::HET,
                GenotypeCode::HOM_ALT,
                GenotypeCode::MISSING
            ]
        );
        assert_eq!(v.summary().valid_count, 3);
    }

    #[test]
    fn synthesizes_id_from_coordinates() {
        let config = config(None);
        let variants = decode_all(
            &config,
            &[HEADER, b"chr1\t250\t.\tA\tG\t.\tPASS\t.\tGT\t0/0\t0/1\t1/1\t0/0"],
        );
        assert_eq!(variants[0].id(), "chr1:250");
    }

    #[test]
    fn drops_data_before_header() {
        let config = config(None);
        let variants = decode_all(
            &config,
            &[b"chr1\t100\t.\tA\tG\t.\tPASS\t.\tGT\t0/0\t0/1\t1/1\t0/0", HEADER],
        );
        assert!(variants.is_empty());
    }

    #[test]
    fn drops_short_and_unparsable_records() {
        let config = config(None);
        let variants = decode_all(
            &config,
            &[
                HEADER,
                b"chr1\t100\t.\tA\tG",
                b"chr1\tnot-a-number\t.\tA\tG\t.\tPASS\t.\tGT\t0/0\t0/1\t1/1\t0/0",
                b"chr1\t-5\t.\tA\tG\t.\tPASS\t.\tGT\t0/0\t0/1\t1/1\t0/0",
            ],
        );
        assert!(variants.is_empty());
    }

    #[test]
    fn region_filter_is_inclusive_and_chromosome_exact() {
        let config = config(Some(Region::parse("chr1:100-200").unwrap()));
        let variants = decode_all(
            &config,
            &[
                HEADER,
                b"chr1\t150\tin\tA\tG\t.\tPASS\t.\tGT\t0/0\t0/1\t1/1\t0/0",
                b"chr2\t150\tother\tA\tG\t.\tPASS\t.\tGT\t0/0\t0/1\t1/1\t0/0",
                b"chr1\t250\tpast\tA\tG\t.\tPASS\t.\tGT\t0/0\t0/1\t1/1\t0/0",
                b"chr1\t100\tlow\tA\tG\t.\tPASS\t.\tGT\t0/0\t0/1\t1/1\t0/0",
                b"chr1\t200\thigh\tA\tG\t.\tPASS\t.\tGT\t0/0\t0/1\t1/1\t0/0",
            ],
        );
        let ids: Vec<&str> = variants.iter().map(|v| v.id()).collect();
        assert_eq!(ids, vec!["in", "low", "high"]);
    }

    #[test]
    fn truncated_sample_columns_become_missing() {
        let config = config(None);
        let variants = decode_all(
            &config,
            &[HEADER, b"chr1\t100\t.\tA\tG\t.\tPASS\t.\tGT\t0/1"],
        );
        assert_eq!(
            variants[0].codes(),
            &[
                GenotypeCode::HET,
                GenotypeCode::MISSING,
                GenotypeCode::MISSING,
                GenotypeCode::MISSING
            ]
        );
    }

    #[test]
    fn span_table_covers_every_byte() {
        let mut spans = FieldSpans::new();
        let line = b"a\t\tbc\t";
        spans.split(line);
        assert_eq!(spans.len(), 4);
        assert_eq!(spans.field(line, 0), Some(&b"a"[..]));
        assert_eq!(spans.field(line, 1), Some(&b""[..]));
        assert_eq!(spans.field(line, 2), Some(&b"bc"[..]));
        assert_eq!(spans.field(line, 3), Some(&b""[..]));
        assert_eq!(spans.field(line, 4), None);
    }
}
