//! Image smoke test.
//!
//! Boots a copy of the image under QEMU with a hook injected that calls
//! back to [`CallbackServer`] with `/good` or `/bad`. The wait is a single
//! deadline measured from when the listener started.
//!
//! On success the VM is deliberately left running and the process simply
//! exits; whoever runs the test (usually a container) reaps it. On failure
//! or timeout the VM is killed.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Child;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::callback::{CallbackServer, Signal};
use crate::process::Cmd;
use crate::qemu::QemuBuilder;

/// Default wall-clock limit for the guest to report back.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Hook script injected into the test image.
pub const DEFAULT_HOOK_NAME: &str = "basic-test-efi-addon.sh";

/// How often the VM is checked for an early exit while waiting.
const VM_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Guest requested `/good`.
    Passed,
    /// Guest requested `/bad`.
    Failed,
    /// No verdict before the deadline.
    TimedOut,
    /// QEMU exited before the guest reported anything.
    VmExited,
}

impl Verdict {
    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Passed => 0,
            Verdict::Failed | Verdict::TimedOut | Verdict::VmExited => 1,
        }
    }
}

/// The booted VM, as far as the verdict handling needs it.
pub trait Vm {
    fn is_running(&mut self) -> bool;

    /// Kill the VM and reap it.
    fn terminate(&mut self);
}

impl Vm for Child {
    fn is_running(&mut self) -> bool {
        matches!(self.try_wait(), Ok(None))
    }

    fn terminate(&mut self) {
        if let Err(e) = self.kill() {
            tracing::warn!("killing VM: {}", e);
        }
        let _ = self.wait();
    }
}

#[derive(Debug, Clone)]
pub struct SmokeOptions {
    pub image: PathBuf,
    /// Boot image handed to the hook as `UKI`.
    pub efi_base: PathBuf,
    pub hook: PathBuf,
    pub firmware: PathBuf,
    pub memory: String,
    pub timeout: Duration,
}

/// Path of the throwaway copy: `foo.raw` becomes `foo.test.raw`.
///
/// Names without a `.raw` suffix get `.test` appended so the copy can never
/// land on the original.
pub fn test_image_path(image: &Path) -> PathBuf {
    let name = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let test_name = match name.strip_suffix(".raw") {
        Some(stem) => format!("{}.test.raw", stem),
        None => format!("{}.test", name),
    };
    image.with_file_name(test_name)
}

/// Wait for the guest's verdict until `deadline`.
///
/// `vm_running` is checked every second so a crashed VM doesn't hold the
/// test until the deadline.
pub async fn wait_for_verdict<F>(
    rx: &mut UnboundedReceiver<Signal>,
    deadline: Instant,
    mut vm_running: F,
) -> Result<Verdict>
where
    F: FnMut() -> bool,
{
    let expired = time::sleep_until(deadline);
    tokio::pin!(expired);

    let mut vm_check = time::interval_at(Instant::now() + VM_CHECK_INTERVAL, VM_CHECK_INTERVAL);
    vm_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            signal = rx.recv() => {
                return match signal {
                    Some(Signal::Good) => Ok(Verdict::Passed),
                    Some(Signal::Bad) => Ok(Verdict::Failed),
                    None => bail!("callback listener stopped unexpectedly"),
                };
            }
            _ = &mut expired => return Ok(Verdict::TimedOut),
            _ = vm_check.tick() => {
                if !vm_running() {
                    return Ok(Verdict::VmExited);
                }
            }
        }
    }
}

/// Apply the outcome of the wait to the VM.
///
/// Only a passed test leaves the VM running.
pub fn finish<V: Vm>(outcome: Result<Verdict>, vm: &mut V) -> Result<Verdict> {
    let verdict = match outcome {
        Ok(verdict) => verdict,
        Err(e) => {
            vm.terminate();
            return Err(e);
        }
    };

    match verdict {
        Verdict::Passed => println!("[smoke] guest reported good"),
        Verdict::Failed => {
            println!("[smoke] guest reported bad");
            vm.terminate();
        }
        Verdict::TimedOut => {
            println!("[smoke] timed out waiting for the guest");
            vm.terminate();
        }
        Verdict::VmExited => {
            println!("[smoke] VM exited without reporting");
            vm.terminate();
        }
    }

    Ok(verdict)
}

fn clone_image(image: &Path, test_image: &Path) -> Result<()> {
    Cmd::new("cp")
        .arg("--reflink=auto")
        .arg_path(image)
        .arg_path(test_image)
        .error_msg(format!("copying {} for testing", image.display()))
        .run()?;
    Ok(())
}

fn inject_hook(test_image: &Path, hook: &Path, port: u16, efi_base: &Path) -> Result<()> {
    Cmd::new("systemd-dissect")
        .arg_path(test_image)
        .arg("--with")
        .arg_path(hook)
        .env("PORT", port.to_string())
        .env("UKI", efi_base.to_string_lossy())
        .error_msg("injecting boot hook with systemd-dissect")
        .run()?;
    Ok(())
}

/// Run the whole smoke test and return the verdict.
pub fn run_smoke_test(options: &SmokeOptions) -> Result<Verdict> {
    if !options.image.is_file() {
        bail!("image '{}' does not exist", options.image.display());
    }
    if !options.hook.is_file() {
        bail!("boot hook '{}' does not exist", options.hook.display());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting callback runtime")?;

    // Requests arriving while the image is prepared wait in the listen
    // backlog until the runtime is driven again.
    let (port, mut rx, deadline) = runtime.block_on(async {
        let server = CallbackServer::bind().await?;
        let port = server.port();
        let deadline = Instant::now() + options.timeout;
        anyhow::Ok((port, server.spawn(), deadline))
    })?;
    println!("[smoke] serving at port {}", port);

    let test_image = test_image_path(&options.image);
    clone_image(&options.image, &test_image)?;
    inject_hook(&test_image, &options.hook, port, &options.efi_base)?;
    println!("[smoke] booting {}", test_image.display());

    let mut vm = QemuBuilder::new(&test_image)
        .firmware(&options.firmware)
        .memory(&options.memory)
        .build()
        .spawn()
        .context("starting VM")?;

    let outcome = runtime.block_on(wait_for_verdict(&mut rx, deadline, || vm.is_running()));
    finish(outcome, &mut vm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::process::Command;
    use tokio::sync::mpsc;

    fn sleeper() -> Child {
        Command::new("sleep").arg("600").spawn().unwrap()
    }

    #[test]
    fn test_image_names() {
        assert_eq!(
            test_image_path(Path::new("/out/kde-linux_202601.raw")),
            PathBuf::from("/out/kde-linux_202601.test.raw")
        );
        assert_eq!(
            test_image_path(Path::new("/srv/raw.d/image.img")),
            PathBuf::from("/srv/raw.d/image.img.test")
        );
        assert_ne!(test_image_path(Path::new("image")), PathBuf::from("image"));
    }

    #[test]
    fn exit_codes() {
        assert_eq!(Verdict::Passed.exit_code(), 0);
        assert_eq!(Verdict::Failed.exit_code(), 1);
        assert_eq!(Verdict::TimedOut.exit_code(), 1);
        assert_eq!(Verdict::VmExited.exit_code(), 1);
    }

    #[tokio::test]
    async fn good_signal_passes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(Signal::Good).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let verdict = wait_for_verdict(&mut rx, deadline, || true).await.unwrap();
        assert_eq!(verdict, Verdict::Passed);
    }

    #[tokio::test]
    async fn bad_signal_fails() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(Signal::Bad).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let verdict = wait_for_verdict(&mut rx, deadline, || true).await.unwrap();
        assert_eq!(verdict, Verdict::Failed);
    }

    #[tokio::test]
    async fn no_signal_times_out() {
        let (_tx, mut rx) = mpsc::unbounded_channel::<Signal>();
        let start = Instant::now();
        let deadline = start + Duration::from_millis(300);
        let verdict = wait_for_verdict(&mut rx, deadline, || true).await.unwrap();
        assert_eq!(verdict, Verdict::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn early_vm_exit_is_reported() {
        let (_tx, mut rx) = mpsc::unbounded_channel::<Signal>();
        let deadline = Instant::now() + Duration::from_secs(30);
        let verdict = wait_for_verdict(&mut rx, deadline, || false).await.unwrap();
        assert_eq!(verdict, Verdict::VmExited);
    }

    #[tokio::test]
    async fn closed_listener_is_error() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Signal>();
        drop(tx);
        let deadline = Instant::now() + Duration::from_secs(5);
        assert!(wait_for_verdict(&mut rx, deadline, || true).await.is_err());
    }

    #[test]
    fn passed_leaves_vm_running() {
        let mut vm = sleeper();
        assert_eq!(finish(Ok(Verdict::Passed), &mut vm).unwrap(), Verdict::Passed);
        assert!(vm.try_wait().unwrap().is_none());
        vm.terminate();
    }

    #[test]
    fn failure_and_timeout_kill_vm() {
        for verdict in [Verdict::Failed, Verdict::TimedOut, Verdict::VmExited] {
            let mut vm = sleeper();
            assert_eq!(finish(Ok(verdict), &mut vm).unwrap(), verdict);
            assert!(vm.try_wait().unwrap().is_some());
        }
    }

    #[test]
    fn wait_error_kills_vm() {
        let mut vm = sleeper();
        let outcome = finish(Err(anyhow!("callback listener stopped")), &mut vm);
        assert!(outcome.is_err());
        assert!(vm.try_wait().unwrap().is_some());
    }

    #[test]
    fn running_check_tracks_child() {
        let mut vm = sleeper();
        assert!(vm.is_running());
        vm.terminate();
        assert!(!vm.is_running());
    }

    #[test]
    fn missing_hook_fails_before_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("image.raw");
        std::fs::write(&image, b"disk").unwrap();
        let options = SmokeOptions {
            image: image.clone(),
            efi_base: dir.path().join("base.efi"),
            hook: dir.path().join("missing-hook.sh"),
            firmware: PathBuf::from(crate::qemu::DEFAULT_FIRMWARE),
            memory: "4G".into(),
            timeout: DEFAULT_TIMEOUT,
        };
        assert!(run_smoke_test(&options).is_err());
        assert!(!test_image_path(&image).exists());
    }
}
