//! Seeded reservoir sampling over a stream of record batches.
//!
//! Knuth's Algorithm R: after `n` rows have been offered every row is in the
//! reservoir with probability `capacity / n`. Rows are referenced by
//! `(batch, row)` slots and gathered with the `interleave` kernel, so the
//! reservoir never copies a row until it is compacted or finished.

use arrow::array::Array;
use arrow::compute::interleave;
use arrow::record_batch::RecordBatch;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::Result;

/// Retained batches before the reservoir is compacted into a single batch.
const MAX_RETAINED_BATCHES: usize = 64;

pub(crate) struct BatchReservoir {
    capacity: usize,
    rng: StdRng,
    seen: u64,
    batches: Vec<RecordBatch>,
    slots: Vec<(usize, usize)>,
}

impl BatchReservoir {
    pub(crate) fn new(capacity: usize, seed: u64) -> Self {
        Self {
            capacity,
            rng: StdRng::seed_from_u64(seed),
            seen: 0,
            batches: Vec::new(),
            slots: Vec::with_capacity(capacity.min(1 << 20)),
        }
    }

    /// Offers every row of `batch` to the reservoir.
    pub(crate) fn offer(&mut self, batch: RecordBatch) -> Result<()> {
        if self.capacity == 0 || batch.num_rows() == 0 {
            return Ok(());
        }

        let slot = self.batches.len();
        let mut referenced = false;
        for row in 0..batch.num_rows() {
            if self.slots.len() < self.capacity {
                self.slots.push((slot, row));
                referenced = true;
            } else {
                let j = self.rng.random_range(0..=self.seen);
                if j < self.capacity as u64 {
                    self.slots[j as usize] = (slot, row);
                    referenced = true;
                }
            }
            self.seen += 1;
        }

        if referenced {
            self.batches.push(batch);
            if self.batches.len() > MAX_RETAINED_BATCHES {
                self.compact()?;
            }
        }
        Ok(())
    }

    /// Number of rows offered so far.
    pub(crate) fn seen(&self) -> u64 {
        self.seen
    }

    /// Returns the sampled rows as a single batch, or nothing when no row was offered.
    pub(crate) fn finish(self) -> Result<Vec<RecordBatch>> {
        if self.slots.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![self.gather()?])
    }

    fn compact(&mut self) -> Result<()> {
        let batch = self.gather()?;
        self.slots = (0..batch.num_rows()).map(|row| (0, row)).collect();
        self.batches = vec![batch];
        Ok(())
    }

    fn gather(&self) -> Result<RecordBatch> {
        let schema = self.batches[0].schema();
        let columns = (0..schema.fields().len())
            .map(|c| {
                let arrays: Vec<&dyn Array> =
                    self.batches.iter().map(|b| b.column(c).as_ref()).collect();
                interleave(&arrays, &self.slots)
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(RecordBatch::try_new(schema, columns)?)
    }
}
