// ========================================================================================
//
//                      THE PAIR-STATISTICS KERNEL
//
// ========================================================================================
//
// The computational heart of the engine. For one candidate pair of variants it
// accumulates, over the sample positions where *both* codes are non-missing,
// the six quantities a Pearson correlation needs:
//
//     n, sum(x), sum(y), sum(xy), sum(x^2), sum(y^2)
//
// This loop runs once per candidate pair, potentially billions of times, so it
// must be branch-light. The vectorized path processes 32 sample positions per
// iteration, masking out lanes where either input carries the missing
// sentinel, and reduces the accumulators horizontally at the end. Because the
// codes are tiny integers, every intermediate value before the final division
// is integer-exact: summation order is immaterial and the scalar and
// vectorized paths produce bit-for-bit identical sums. The test suite holds
// them to that.
//
// Finalization turns the sums into r^2. Two degenerate situations — fewer
// than two jointly-valid samples, and zero variance on either side — both
// answer 0.0: an undefined correlation is reported as absence of LD, not as
// an error, and no caller distinguishes the two.

use crate::types::{GenotypeCode, Variant};

/// The six accumulators for one pair, restricted to jointly non-missing
/// sample positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairSums {
    pub n: u64,
    pub sum_x: u64,
    pub sum_y: u64,
    pub sum_xy: u64,
    pub sum_xx: u64,
    pub sum_yy: u64,
}

impl PairSums {
    fn add(&mut self, other: &PairSums) {
        self.n += other.n;
        self.sum_x += other.sum_x;
        self.sum_y += other.sum_y;
        self.sum_xy += other.sum_xy;
        self.sum_xx += other.sum_xx;
        self.sum_yy += other.sum_yy;
    }
}

/// Accumulates pair statistics over two equal-length code vectors, dispatching
/// to the widest implementation the host supports.
#[inline]
pub fn accumulate_pair_stats(a: &[GenotypeCode], b: &[GenotypeCode]) -> PairSums {
    debug_assert_eq!(a.len(), b.len(), "pair statistics need equal-length code vectors");
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return unsafe { accumulate_avx2(a, b) };
        }
    }
    accumulate_scalar(a, b)
}

/// The reference implementation: one position at a time, skip if either side
/// is missing.
pub fn accumulate_scalar(a: &[GenotypeCode], b: &[GenotypeCode]) -> PairSums {
    let mut sums = PairSums::default();
    for (ca, cb) in a.iter().zip(b.iter()) {
        if ca.is_missing() || cb.is_missing() {
            continue;
        }
        let x = ca.0 as u64;
        let y = cb.0 as u64;
        sums.n += 1;
        sums.sum_x += x;
        sums.sum_y += y;
        sums.sum_xy += x * y;
        sums.sum_xx += x * x;
        sums.sum_yy += y * y;
    }
    sums
}

/// AVX2 accumulation, 32 codes per iteration.
///
/// Lane masking: `cmpgt(code, -1)` marks valid lanes; AND-ing both masks and
/// then AND-ing each code vector with the joint mask zeroes every position
/// where either side is missing, so masked lanes contribute nothing to any
/// accumulator. Byte sums ride on `SAD` against zero (codes are 0..=2, so the
/// unsigned view is exact); products ride on widen-to-i16 + `PMADDWD` into
/// i32 lanes, which cannot overflow below ~8 billion samples.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn accumulate_avx2(a: &[GenotypeCode], b: &[GenotypeCode]) -> PairSums {
    use std::arch::x86_64::*;

    const LANES: usize = 32;

    let len = a.len().min(b.len());
    let a_ptr = a.as_ptr() as *const i8;
    let b_ptr = b.as_ptr() as *const i8;

    let zero = _mm256_setzero_si256();
    let neg_one = _mm256_set1_epi8(-1);

    let mut n: u64 = 0;
    let mut acc_x = zero; // four u64 lanes (SAD output)
    let mut acc_y = zero;
    let mut acc_xy = zero; // eight i32 lanes (PMADDWD output)
    let mut acc_xx = zero;
    let mut acc_yy = zero;

    let mut i = 0;
    while i + LANES <= len {
        let va = _mm256_loadu_si256(a_ptr.add(i) as *const __m256i);
        let vb = _mm256_loadu_si256(b_ptr.add(i) as *const __m256i);

        let valid = _mm256_and_si256(
            _mm256_cmpgt_epi8(va, neg_one),
            _mm256_cmpgt_epi8(vb, neg_one),
        );
        n += (_mm256_movemask_epi8(valid) as u32).count_ones() as u64;

        let xa = _mm256_and_si256(va, valid);
        let xb = _mm256_and_si256(vb, valid);

        acc_x = _mm256_add_epi64(acc_x, _mm256_sad_epu8(xa, zero));
        acc_y = _mm256_add_epi64(acc_y, _mm256_sad_epu8(xb, zero));

        // Unpack interleaves within 128-bit halves; the ordering does not
        // matter because everything lands in order-independent sums.
        let a_lo = _mm256_unpacklo_epi8(xa, zero);
        let a_hi = _mm256_unpackhi_epi8(xa, zero);
        let b_lo = _mm256_unpacklo_epi8(xb, zero);
        let b_hi = _mm256_unpackhi_epi8(xb, zero);

        acc_xy = _mm256_add_epi32(acc_xy, _mm256_madd_epi16(a_lo, b_lo));
        acc_xy = _mm256_add_epi32(acc_xy, _mm256_madd_epi16(a_hi, b_hi));
        acc_xx = _mm256_add_epi32(acc_xx, _mm256_madd_epi16(a_lo, a_lo));
        acc_xx = _mm256_add_epi32(acc_xx, _mm256_madd_epi16(a_hi, a_hi));
        acc_yy = _mm256_add_epi32(acc_yy, _mm256_madd_epi16(b_lo, b_lo));
        acc_yy = _mm256_add_epi32(acc_yy, _mm256_madd_epi16(b_hi, b_hi));

        i += LANES;
    }

    let mut sums = PairSums {
        n,
        sum_x: reduce_u64(acc_x),
        sum_y: reduce_u64(acc_y),
        sum_xy: reduce_i32(acc_xy),
        sum_xx: reduce_i32(acc_xx),
        sum_yy: reduce_i32(acc_yy),
    };

    // Scalar tail for the remainder.
    let tail = accumulate_scalar(&a[i..len], &b[i..len]);
    sums.add(&tail);
    sums
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn reduce_u64(v: std::arch::x86_64::__m256i) -> u64 {
    let mut lanes = [0u64; 4];
    std::arch::x86_64::_mm256_storeu_si256(lanes.as_mut_ptr() as *mut _, v);
    lanes.iter().sum()
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn reduce_i32(v: std::arch::x86_64::__m256i) -> u64 {
    let mut lanes = [0i32; 8];
    std::arch::x86_64::_mm256_storeu_si256(lanes.as_mut_ptr() as *mut _, v);
    lanes.iter().map(|&x| x as u64).sum()
}

// ========================================================================================
//                                  FINALIZATION
// ========================================================================================

/// Finalizes the sums into r^2.
pub fn r2_from_sums(sums: &PairSums) -> f64 {
    if sums.n < 2 {
        return 0.0;
    }
    let n = sums.n as f64;
    let mean_x = sums.sum_x as f64 / n;
    let mean_y = sums.sum_y as f64 / n;
    let cov = sums.sum_xy as f64 / n - mean_x * mean_y;
    let var_x = sums.sum_xx as f64 / n - mean_x * mean_x;
    let var_y = sums.sum_yy as f64 / n - mean_y * mean_y;
    if var_x <= 0.0 || var_y <= 0.0 {
        return 0.0;
    }
    let r = cov / (var_x.sqrt() * var_y.sqrt());
    let r2 = r * r;
    // Rounding in the final division can land a hair above 1.
    if r2 > 1.0 { 1.0 } else { r2 }
}

/// The squared Pearson correlation of two variants' dosage vectors over their
/// jointly non-missing samples.
///
/// A variant whose whole-vector variance is zero can never correlate with
/// anything, so the O(samples) joint scan is skipped outright for it.
pub fn r_squared(a: &Variant, b: &Variant) -> f64 {
    if a.summary().variance <= 0.0 || b.summary().variance <= 0.0 {
        return 0.0;
    }
    let sums = accumulate_pair_stats(a.codes(), b.codes());
    r2_from_sums(&sums)
}
