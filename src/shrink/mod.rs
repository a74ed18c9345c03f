//! Filesystem shrinker.
//!
//! There is no reliable way to ask btrfs how small it can get, so the
//! shrinker first cuts down to the allocated size plus some headroom, then
//! keeps taking fixed steps off until the resize is refused. The resulting
//! size is recorded for `part-rebuild` and, when a backing file is given,
//! the file is truncated to match.

pub mod btrfs;
pub mod retry;
pub mod strategy;

pub use btrfs::BtrfsMount;
pub use retry::{shrink_until_failure, ShrinkOutcome};
pub use strategy::{Margin, ShrinkStrategy, StrategyKind};

use anyhow::{bail, Context, Result};
use std::fs::OpenOptions;
use std::path::Path;

use crate::process::Cmd;
use crate::state::SizeRecord;

/// Operations the shrinker needs from a mounted filesystem.
pub trait Filesystem {
    /// Current size of the mounted filesystem in bytes.
    fn mount_size(&mut self) -> Result<u64>;

    /// Bytes allocated across all block groups.
    fn allocated(&mut self) -> Result<u64>;

    /// Resize to an absolute size.
    fn resize_to(&mut self, size: u64) -> Result<()>;

    /// Shrink by `quantum` bytes. An error means the filesystem refused.
    fn shrink_by(&mut self, quantum: u64) -> Result<()>;

    /// Flush pending allocations.
    fn sync(&mut self) -> Result<()>;
}

/// Everything the shrink measured and decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShrinkReport {
    pub mount_size: u64,
    pub allocated: u64,
    pub ceiling: u64,
    pub outcome: ShrinkOutcome,
}

impl ShrinkReport {
    pub fn final_size(&self) -> u64 {
        self.outcome.final_size()
    }

    /// Bytes to cut from the backing file.
    pub fn reclaimed(&self) -> u64 {
        self.ceiling - self.final_size()
    }
}

/// Shrink `fs` as far as it will go.
///
/// Failures while measuring or during the first resize are fatal. A refused
/// step inside the loop ends it normally; if the per-step sync fails the
/// step isn't counted.
pub fn shrink_filesystem<F: Filesystem>(fs: &mut F, strategy: &ShrinkStrategy) -> Result<ShrinkReport> {
    if strategy.quantum == 0 {
        bail!("shrink quantum must be greater than zero");
    }

    let mount_size = fs.mount_size().context("querying mount size")?;
    let allocated = fs.allocated().context("querying allocated block groups")?;
    let ceiling = strategy.ceiling(allocated, mount_size);
    println!(
        "[shrink] allocated {} bytes, mount {} bytes, first pass to {} bytes",
        allocated, mount_size, ceiling
    );

    fs.resize_to(ceiling)
        .with_context(|| format!("initial resize to {} bytes", ceiling))?;

    let quantum = strategy.quantum;
    let sync = strategy.sync_each_step;
    let outcome = shrink_until_failure(ceiling, quantum, || {
        fs.shrink_by(quantum)?;
        if sync {
            fs.sync()?;
        }
        Ok(())
    });

    match outcome {
        ShrinkOutcome::Shrunk {
            final_size,
            iterations,
        } => println!(
            "[shrink] took {} steps of {} bytes, final size {} bytes",
            iterations, quantum, final_size
        ),
        ShrinkOutcome::MinimumReached { final_size } => {
            println!("[shrink] already at minimum, final size {} bytes", final_size)
        }
    }

    Ok(ShrinkReport {
        mount_size,
        allocated,
        ceiling,
        outcome,
    })
}

/// Write the record `part-rebuild` reads.
pub fn record_size(report: &ShrinkReport, state_file: &Path) -> Result<()> {
    SizeRecord::now(report.final_size()).write(state_file)?;
    println!(
        "[shrink] recorded {} bytes in {}",
        report.final_size(),
        state_file.display()
    );
    Ok(())
}

/// Cut `bytes` off the end of `file`.
pub fn truncate_by(file: &Path, bytes: u64) -> Result<u64> {
    let handle = OpenOptions::new()
        .write(true)
        .open(file)
        .with_context(|| format!("opening '{}'", file.display()))?;
    let len = handle.metadata()?.len();
    if bytes > len {
        bail!(
            "cannot truncate {} bytes from '{}' which is only {} bytes",
            bytes,
            file.display(),
            len
        );
    }
    let new_len = len - bytes;
    handle
        .set_len(new_len)
        .with_context(|| format!("truncating '{}' to {} bytes", file.display(), new_len))?;
    Ok(new_len)
}

/// Unmount the filesystem and shrink its backing file by what was reclaimed.
pub fn unmount_and_truncate(mountpoint: &Path, backing_file: &Path, report: &ShrinkReport) -> Result<()> {
    Cmd::new("umount")
        .arg_path(mountpoint)
        .error_msg(format!("unmounting {}", mountpoint.display()))
        .run()?;
    println!("[shrink] unmounted {}", mountpoint.display());

    let new_len = truncate_by(backing_file, report.reclaimed())?;
    println!(
        "[shrink] truncated {} by {} bytes to {} bytes",
        backing_file.display(),
        report.reclaimed(),
        new_len
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::fs;

    const MIB: u64 = strategy::MIB;

    /// Simulated filesystem that refuses to go below `min_size`.
    struct FakeFs {
        mount_size: u64,
        allocated: u64,
        size: u64,
        min_size: u64,
        syncs: usize,
        fail_sync: bool,
        fail_initial_resize: bool,
    }

    impl FakeFs {
        fn new(mount_size: u64, allocated: u64, min_size: u64) -> Self {
            Self {
                mount_size,
                allocated,
                size: mount_size,
                min_size,
                syncs: 0,
                fail_sync: false,
                fail_initial_resize: false,
            }
        }
    }

    impl Filesystem for FakeFs {
        fn mount_size(&mut self) -> Result<u64> {
            Ok(self.mount_size)
        }

        fn allocated(&mut self) -> Result<u64> {
            Ok(self.allocated)
        }

        fn resize_to(&mut self, size: u64) -> Result<()> {
            if self.fail_initial_resize || size < self.min_size {
                return Err(anyhow!("ERROR: unable to resize"));
            }
            self.size = size;
            Ok(())
        }

        fn shrink_by(&mut self, quantum: u64) -> Result<()> {
            if self.size < self.min_size + quantum {
                return Err(anyhow!("ERROR: unable to resize: No space left on device"));
            }
            self.size -= quantum;
            Ok(())
        }

        fn sync(&mut self) -> Result<()> {
            if self.fail_sync {
                return Err(anyhow!("sync failed"));
            }
            self.syncs += 1;
            Ok(())
        }
    }

    #[test]
    fn shrinks_to_near_minimum() {
        let mut fs = FakeFs::new(8192 * MIB, 2048 * MIB, 1900 * MIB);
        let strategy = ShrinkStrategy::new(StrategyKind::Proportional);
        let report = shrink_filesystem(&mut fs, &strategy).unwrap();

        assert_eq!(report.ceiling, 3072 * MIB);
        assert_eq!(report.final_size(), fs.size);
        assert!(report.final_size() >= 1900 * MIB);
        assert!(report.final_size() < 1900 * MIB + strategy.quantum);
        assert_eq!(fs.syncs as u64, report.outcome.iterations());
        assert_eq!(report.reclaimed(), report.ceiling - report.final_size());
    }

    #[test]
    fn ceiling_capped_by_mount_size() {
        let mut fs = FakeFs::new(1024 * MIB, 1000 * MIB, 990 * MIB);
        let strategy = ShrinkStrategy::new(StrategyKind::FixedMargin);
        let report = shrink_filesystem(&mut fs, &strategy).unwrap();

        assert_eq!(report.ceiling, 1024 * MIB);
        assert!(report.final_size() <= report.mount_size);
        assert_eq!(fs.syncs, 0);
    }

    #[test]
    fn initial_resize_failure_is_fatal() {
        let mut fs = FakeFs::new(8192 * MIB, 2048 * MIB, 0);
        fs.fail_initial_resize = true;
        let strategy = ShrinkStrategy::new(StrategyKind::Proportional);
        let err = shrink_filesystem(&mut fs, &strategy).unwrap_err();
        assert!(format!("{:#}", err).contains("initial resize"));
    }

    #[test]
    fn failed_sync_ends_loop_without_counting_step() {
        let mut fs = FakeFs::new(8192 * MIB, 2048 * MIB, 0);
        fs.fail_sync = true;
        let strategy = ShrinkStrategy::new(StrategyKind::Proportional);
        let report = shrink_filesystem(&mut fs, &strategy).unwrap();

        assert_eq!(
            report.outcome,
            ShrinkOutcome::MinimumReached {
                final_size: report.ceiling
            }
        );
    }

    #[test]
    fn zero_quantum_rejected() {
        let mut fs = FakeFs::new(8192 * MIB, 2048 * MIB, 0);
        let strategy = ShrinkStrategy::new(StrategyKind::FixedMargin).with_quantum(0);
        assert!(shrink_filesystem(&mut fs, &strategy).is_err());
    }

    #[test]
    fn records_final_size() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("btrfs.json");
        let report = ShrinkReport {
            mount_size: 100,
            allocated: 40,
            ceiling: 60,
            outcome: ShrinkOutcome::Shrunk {
                final_size: 50,
                iterations: 5,
            },
        };
        record_size(&report, &state).unwrap();
        assert_eq!(SizeRecord::read(&state).unwrap().size, 50);
    }

    #[test]
    fn truncate_by_shortens_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("root.raw");
        fs::write(&file, vec![0u8; 4096]).unwrap();

        assert_eq!(truncate_by(&file, 1024).unwrap(), 3072);
        assert_eq!(fs::metadata(&file).unwrap().len(), 3072);
    }

    #[test]
    fn truncate_by_refuses_more_than_length() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("root.raw");
        fs::write(&file, vec![0u8; 100]).unwrap();

        assert!(truncate_by(&file, 101).is_err());
        assert_eq!(fs::metadata(&file).unwrap().len(), 100);
    }
}
