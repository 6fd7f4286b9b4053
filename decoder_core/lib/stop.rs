use crate::error::{DecodeError, Result};

/// Latches stop state for each batch row and reports whether every row has
/// stopped.
///
/// `stop_found` is the caller-owned latch, one slot per row; a slot that is
/// already `true` is never re-examined and never reset. Returns `true` once
/// all rows have emitted a stop token at some step.
pub fn update_stop_latches(
    decoded_ids: &[u32],
    stop_ids: &[u32],
    stop_found: &mut [bool],
) -> Result<bool> {
    if decoded_ids.len() != stop_found.len() {
        return Err(DecodeError::invalid_arg(format!(
            "decoded ids and stop latches must have the same length, got {} and {}",
            decoded_ids.len(),
            stop_found.len()
        )));
    }
    for (latch, &id) in stop_found.iter_mut().zip(decoded_ids) {
        if *latch {
            continue;
        }
        if stop_ids.contains(&id) {
            *latch = true;
        }
    }
    Ok(stop_found.iter().all(|&found| found))
}

/// Session-owned stop state: the configured stop-token set plus one latch per
/// batch row.
pub struct StopTracker {
    stop_ids: Vec<u32>,
    stop_found: Vec<bool>,
}

impl StopTracker {
    pub fn new(stop_ids: Vec<u32>, batch_size: usize) -> Self {
        Self {
            stop_ids,
            stop_found: vec![false; batch_size],
        }
    }

    /// Feeds one decode step's emitted ids; returns whether all rows are done.
    pub fn update(&mut self, decoded_ids: &[u32]) -> Result<bool> {
        update_stop_latches(decoded_ids, &self.stop_ids, &mut self.stop_found)
    }

    pub fn is_stopped(&self, row: usize) -> bool {
        self.stop_found[row]
    }

    pub fn all_stopped(&self) -> bool {
        self.stop_found.iter().all(|&found| found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latches_rows_on_stop_tokens() {
        let mut stop_found = vec![false; 3];
        let all = update_stop_latches(&[5, 1, 2], &[1, 2], &mut stop_found).unwrap();
        assert!(!all);
        assert_eq!(stop_found, vec![false, true, true]);
    }

    #[test]
    fn latch_is_monotonic() {
        let mut stop_found = vec![false; 2];
        update_stop_latches(&[9, 7], &[9], &mut stop_found).unwrap();
        assert_eq!(stop_found, vec![true, false]);
        // Row 0 emits a non-stop token afterwards; its latch must hold.
        let all = update_stop_latches(&[3, 9], &[9], &mut stop_found).unwrap();
        assert!(all);
        assert_eq!(stop_found, vec![true, true]);
    }

    #[test]
    fn all_stopped_only_when_every_row_latched() {
        let mut stop_found = vec![true, false];
        assert!(!update_stop_latches(&[0, 0], &[9], &mut stop_found).unwrap());
        assert!(update_stop_latches(&[0, 9], &[9], &mut stop_found).unwrap());
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let mut stop_found = vec![false; 2];
        assert!(update_stop_latches(&[1, 2, 3], &[1], &mut stop_found).is_err());
    }

    #[test]
    fn tracker_threads_state_across_steps() {
        let mut tracker = StopTracker::new(vec![100, 101], 2);
        assert!(!tracker.update(&[1, 100]).unwrap());
        assert!(!tracker.is_stopped(0));
        assert!(tracker.is_stopped(1));
        assert!(tracker.update(&[101, 5]).unwrap());
        assert!(tracker.all_stopped());
    }
}
