//! Shrink strategies: how much headroom the first resize keeps, and how big
//! each subsequent step is.

use serde::Deserialize;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;

/// Named strategy selectable from the command line or config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// 1.5x the allocated size, 32 MiB steps, sync after every step.
    #[default]
    Proportional,
    /// Allocated size plus 512 MiB, 128 KiB steps (one compressed extent).
    FixedMargin,
}

/// Headroom added on top of the allocated block-group total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Margin {
    /// Multiply by `numerator / denominator`, rounding up.
    Ratio { numerator: u64, denominator: u64 },
    /// Add a fixed number of bytes.
    Bytes(u64),
}

impl Margin {
    pub fn apply(&self, allocated: u64) -> u64 {
        match *self {
            Margin::Ratio {
                numerator,
                denominator,
            } => allocated.saturating_mul(numerator).div_ceil(denominator.max(1)),
            Margin::Bytes(extra) => allocated.saturating_add(extra),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShrinkStrategy {
    pub kind: StrategyKind,
    pub margin: Margin,
    /// Bytes removed per loop step.
    pub quantum: u64,
    /// Run `btrfs filesystem sync` after each successful step.
    pub sync_each_step: bool,
}

impl ShrinkStrategy {
    pub fn new(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Proportional => Self {
                kind,
                margin: Margin::Ratio {
                    numerator: 3,
                    denominator: 2,
                },
                quantum: 32 * MIB,
                sync_each_step: true,
            },
            StrategyKind::FixedMargin => Self {
                kind,
                margin: Margin::Bytes(512 * MIB),
                quantum: 128 * KIB,
                sync_each_step: false,
            },
        }
    }

    pub fn with_quantum(mut self, quantum: u64) -> Self {
        self.quantum = quantum;
        self
    }

    /// First-pass target: the margin applied to `allocated`, never above
    /// what the mount currently has.
    pub fn ceiling(&self, allocated: u64, mount_size: u64) -> u64 {
        mount_size.min(self.margin.apply(allocated))
    }
}
