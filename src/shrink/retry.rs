//! Bounded "shrink until the tool refuses" loop.

use anyhow::Result;

/// How the shrink loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShrinkOutcome {
    /// At least one step succeeded.
    Shrunk { final_size: u64, iterations: u64 },
    /// The very first step was refused; the ceiling is already minimal.
    MinimumReached { final_size: u64 },
}

impl ShrinkOutcome {
    pub fn final_size(&self) -> u64 {
        match *self {
            ShrinkOutcome::Shrunk { final_size, .. } => final_size,
            ShrinkOutcome::MinimumReached { final_size } => final_size,
        }
    }

    pub fn iterations(&self) -> u64 {
        match *self {
            ShrinkOutcome::Shrunk { iterations, .. } => iterations,
            ShrinkOutcome::MinimumReached { .. } => 0,
        }
    }
}

/// Call `step` until it fails, at most `ceiling / quantum` times.
///
/// A failing step is the expected way out of the loop and is not an error:
/// it only means the filesystem can't get any smaller.
pub fn shrink_until_failure<F>(ceiling: u64, quantum: u64, mut step: F) -> ShrinkOutcome
where
    F: FnMut() -> Result<()>,
{
    if quantum == 0 {
        return ShrinkOutcome::MinimumReached {
            final_size: ceiling,
        };
    }

    let max_iterations = ceiling / quantum;
    let mut iterations = 0;
    while iterations < max_iterations {
        if let Err(e) = step() {
            tracing::info!("shrink step refused after {} iterations: {:#}", iterations, e);
            break;
        }
        iterations += 1;
    }

    let final_size = ceiling - quantum * iterations;
    if iterations == 0 {
        ShrinkOutcome::MinimumReached { final_size }
    } else {
        ShrinkOutcome::Shrunk {
            final_size,
            iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    #[test]
    fn stops_at_first_failure() {
        let mut calls = 0;
        let outcome = shrink_until_failure(1000, 10, || {
            calls += 1;
            if calls > 7 {
                bail!("ERROR: unable to resize");
            }
            Ok(())
        });
        assert_eq!(
            outcome,
            ShrinkOutcome::Shrunk {
                final_size: 930,
                iterations: 7
            }
        );
        assert_eq!(calls, 8);
    }

    #[test]
    fn immediate_failure_is_minimum_reached() {
        let outcome = shrink_until_failure(1000, 10, || bail!("too small"));
        assert_eq!(outcome, ShrinkOutcome::MinimumReached { final_size: 1000 });
        assert_eq!(outcome.iterations(), 0);
    }

    #[test]
    fn always_terminates_when_step_never_fails() {
        let mut calls = 0u64;
        let outcome = shrink_until_failure(1005, 10, || {
            calls += 1;
            Ok(())
        });
        assert_eq!(calls, 100);
        assert_eq!(outcome.final_size(), 5);
    }

    #[test]
    fn final_size_matches_successful_iterations() {
        for stop_after in [0u64, 1, 5, 31] {
            let mut calls = 0;
            let outcome = shrink_until_failure(32 * 1024, 1024, || {
                calls += 1;
                if calls > stop_after {
                    bail!("refused");
                }
                Ok(())
            });
            assert_eq!(outcome.iterations(), stop_after);
            assert_eq!(outcome.final_size(), 32 * 1024 - stop_after * 1024);
        }
    }

    #[test]
    fn zero_quantum_does_nothing() {
        let outcome = shrink_until_failure(1000, 0, || panic!("must not be called"));
        assert_eq!(outcome, ShrinkOutcome::MinimumReached { final_size: 1000 });
    }
}
