//! Two-tier batched writes.
//!
//! Rows are written in bounded batches, each batch as one multi-row
//! upsert statement. When a batch statement fails, its rows are retried
//! one at a time so a single bad row cannot block the rest; each row
//! that still fails is returned with its error.

use crate::error::PlanResult;

#[derive(Debug, Clone)]
pub struct RowWriteFailure<R> {
    pub row: R,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct BatchWriteOutcome<R> {
    pub written: usize,
    /// Batches that had to be retried row by row.
    pub degraded_batches: usize,
    pub failures: Vec<RowWriteFailure<R>>,
}

impl<R> Default for BatchWriteOutcome<R> {
    fn default() -> Self {
        Self {
            written: 0,
            degraded_batches: 0,
            failures: Vec::new(),
        }
    }
}

pub fn write_in_batches<R, B, W>(
    rows: &[R],
    batch_size: usize,
    mut write_batch: B,
    mut write_row: W,
) -> BatchWriteOutcome<R>
where
    R: Clone,
    B: FnMut(&[R]) -> PlanResult<()>,
    W: FnMut(&R) -> PlanResult<()>,
{
    let mut outcome = BatchWriteOutcome::default();
    for chunk in rows.chunks(batch_size.max(1)) {
        match write_batch(chunk) {
            Ok(()) => outcome.written += chunk.len(),
            Err(batch_err) => {
                outcome.degraded_batches += 1;
                log::warn!(
                    "Batch of {} rows failed ({batch_err}); retrying row by row",
                    chunk.len()
                );
                for row in chunk {
                    match write_row(row) {
                        Ok(()) => outcome.written += 1,
                        Err(e) => outcome.failures.push(RowWriteFailure {
                            row: row.clone(),
                            error: e.to_string(),
                        }),
                    }
                }
            }
        }
    }
    outcome
}
