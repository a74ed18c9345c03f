//! Operator tools for the disk image pipeline of an immutable Linux OS.
//!
//! The image is a GPT disk with a btrfs root, updated A/B style through
//! `systemd-sysupdate`. Each binary does one narrow, sequential job:
//!
//! - **btrfs-shrink** - shrink the mounted root filesystem as far as it goes
//!   and record the final size ([`shrink`])
//! - **part-rebuild** - rebuild the partition table around the shrunk root
//!   ([`rebuild`])
//! - **smoke-test** - boot a copy of the image in QEMU and wait for the
//!   guest to report back over HTTP ([`smoke`], [`callback`], [`qemu`])
//! - **permission-fix** - reset file modes in `mkosi.*` trees ([`permissions`])
//! - **update-local** - update from a local image directory ([`sysupdate`])
//! - **command-not-found** - suggest alternatives for missing commands
//!   ([`advisory`])
//! - **btrfs-cleanup** - delete a leftover build subvolume recursively
//!   ([`cleanup`])
//!
//! # Pipeline
//!
//! ```text
//! btrfs-shrink ──► btrfs.json ──► part-rebuild ──► image.raw
//!                                                     │
//!                                        smoke-test ◄─┘ (separately)
//! ```
//!
//! All external tools run through [`process::Cmd`]; nothing changes the
//! working directory or the process environment.

pub mod advisory;
pub mod callback;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod logging;
pub mod permissions;
pub mod preflight;
pub mod process;
pub mod qemu;
pub mod rebuild;
pub mod shrink;
pub mod smoke;
pub mod state;
pub mod sysupdate;

pub use config::Config;
pub use process::Cmd;
