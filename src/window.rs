// ========================================================================================
//
//                        STREAMING SLIDING-WINDOW ENGINE
//
// ========================================================================================
//
// Single-pass, bounded-memory pair enumeration. The engine holds the most
// recent `capacity` decoded variants in a FIFO queue. Each newly decoded
// variant is compared against every held variant in queue order (oldest
// first), qualifying pairs are emitted immediately, then the new variant is
// appended and the oldest evicted if the queue ran over capacity.
//
// Memory is O(capacity x samples), time is O(variants x capacity), and for a
// fixed input the emitted pair set and order are fully determined: pairs
// appear in arrival order of their newer member, older member first within
// each line. End of input needs no flush because every pair is emitted the
// moment it becomes comparable.

use std::collections::VecDeque;
use std::io::{self, Write};

use crate::kernel;
use crate::output::OutputWriter;
use crate::types::{EngineConfig, Variant};

pub struct SlidingWindow {
    held: VecDeque<Variant>,
    capacity: usize,
}

/// True when a maximum distance is configured and the two positions are
/// farther apart than allowed. Pruning only applies within one chromosome;
/// a cross-chromosome pair has no genomic distance and is never pruned.
#[inline]
fn prunable(a: &Variant, b: &Variant, max_distance: u64) -> bool {
    max_distance > 0
        && a.chromosome() == b.chromosome()
        && a.position().abs_diff(b.position()) > max_distance
}

impl SlidingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        SlidingWindow {
            held: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Compares `variant` against the window, emits qualifying pairs, then
    /// absorbs it (evicting the least-recently-inserted variant when full).
    pub fn process<W: Write>(
        &mut self,
        variant: Variant,
        config: &EngineConfig,
        writer: &mut OutputWriter<W>,
    ) -> io::Result<()> {
        for held in &self.held {
            if prunable(held, &variant, config.max_distance) {
                continue;
            }
            let r2 = kernel::r_squared(held, &variant);
            if r2 >= config.min_r2 {
                writer.pair(held, &variant, r2)?;
            }
        }
        self.held.push_back(variant);
        if self.held.len() > self.capacity {
            self.held.pop_front();
        }
        Ok(())
    }
}
