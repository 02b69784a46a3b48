use std::collections::BTreeSet;

/// Hook deciding whether a successful read should be reported as failed.
///
/// Receives the 1-based read attempt number across the whole run, so
/// reopening the source does not reset the schedule.
pub trait FaultPoint: Send {
    fn should_fail(&mut self, read_attempt: u64) -> bool;
}

/// Production setting: reads are never tampered with
#[derive(Debug, Default)]
pub struct NoFaults;

impl FaultPoint for NoFaults {
    fn should_fail(&mut self, _read_attempt: u64) -> bool {
        false
    }
}

/// Fail a fixed set of read attempts
#[derive(Debug, Default, Clone)]
pub struct FailAtReads {
    attempts: BTreeSet<u64>,
}

impl FailAtReads {
    pub fn new<I: IntoIterator<Item = u64>>(attempts: I) -> Self {
        Self {
            attempts: attempts.into_iter().collect(),
        }
    }
}

impl FaultPoint for FailAtReads {
    fn should_fail(&mut self, read_attempt: u64) -> bool {
        self.attempts.contains(&read_attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_at_reads() {
        let mut faults = FailAtReads::new([3, 100]);
        let failed: Vec<u64> = (1..=120).filter(|n| faults.should_fail(*n)).collect();
        assert_eq!(failed, vec![3, 100]);
    }

    #[test]
    fn test_no_faults() {
        let mut faults = NoFaults;
        assert!((1..=1000).all(|n| !faults.should_fail(n)));
    }
}
