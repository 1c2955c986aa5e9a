//! Write-stability detection.
//!
//! A candidate file is safe to transfer only when nobody is still writing it.
//! Two policies, injected at construction:
//!
//! - [`StabilityMethod::SizeSampling`] — poll the file size; the file is
//!   stable after `required_stable_samples` consecutive equal samples. A
//!   heuristic, not a lock: a writer that pauses between writes, or an
//!   in-place mutation that preserves size, is not detected.
//! - [`StabilityMethod::OpenHandle`] — a sample is quiet when no process
//!   holds the file open for writing (`/proc/<pid>/fdinfo` access-mode scan).
//!   Where `/proc` introspection is unavailable the detector falls back to
//!   size sampling and warns once per detector instance, not per file.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ferry_core::{StabilityMethod, StabilitySettings};

use crate::error::{io_err, SyncError};

// ---------------------------------------------------------------------------
// Probe outcome
// ---------------------------------------------------------------------------

/// Result of waiting for a file to stabilize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// The file held still for the required number of consecutive samples.
    Stable { samples: u32 },
    /// `max_wait` elapsed before the required streak was reached.
    TimedOut { waited: Duration },
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Blocking write-stability detector. The only suspension point in a run;
/// one file's instability costs at most `max_wait` and rejects only that file.
#[derive(Debug)]
pub struct StabilityDetector {
    method: StabilityMethod,
    poll_interval: Duration,
    max_wait: Duration,
    required_samples: u32,
    fallback_warned: AtomicBool,
}

impl StabilityDetector {
    pub fn new(
        method: StabilityMethod,
        poll_interval: Duration,
        max_wait: Duration,
        required_samples: u32,
    ) -> Self {
        Self {
            method,
            poll_interval,
            max_wait,
            required_samples,
            fallback_warned: AtomicBool::new(false),
        }
    }

    pub fn from_settings(settings: &StabilitySettings) -> Self {
        Self::new(
            settings.method,
            settings.poll_interval(),
            settings.max_wait(),
            settings.required_stable_samples,
        )
    }

    /// One-shot check: two size samples one poll interval apart (or a single
    /// open-handle probe). `false` means the file looks like it is being
    /// written right now.
    pub fn is_stable(&self, path: &Path) -> Result<bool, SyncError> {
        match self.effective_method() {
            StabilityMethod::SizeSampling => {
                let first = file_size(path)?;
                std::thread::sleep(self.poll_interval);
                let second = file_size(path)?;
                Ok(first == second)
            }
            StabilityMethod::OpenHandle => Ok(!has_write_handle(path)?),
        }
    }

    /// Block until `path` is stable or `max_wait` elapses.
    ///
    /// Each cycle sleeps one poll interval and takes a sample. An unchanged
    /// sample extends the stability streak; a changed one resets the streak
    /// to zero and becomes the new baseline. An immediately-stable file
    /// reports `Stable { samples: required_stable_samples }` exactly.
    pub fn await_stable(&self, path: &Path) -> Result<Probe, SyncError> {
        let started = Instant::now();
        match self.effective_method() {
            StabilityMethod::SizeSampling => {
                let mut baseline = file_size(path)?;
                let mut streak = 0u32;
                let mut samples = 0u32;
                loop {
                    if streak >= self.required_samples {
                        return Ok(Probe::Stable { samples });
                    }
                    if started.elapsed() >= self.max_wait {
                        return Ok(Probe::TimedOut {
                            waited: started.elapsed(),
                        });
                    }
                    std::thread::sleep(self.poll_interval);
                    let size = file_size(path)?;
                    samples += 1;
                    if size == baseline {
                        streak += 1;
                    } else {
                        streak = 0;
                        baseline = size;
                    }
                }
            }
            StabilityMethod::OpenHandle => {
                let mut streak = 0u32;
                let mut samples = 0u32;
                loop {
                    if streak >= self.required_samples {
                        return Ok(Probe::Stable { samples });
                    }
                    if started.elapsed() >= self.max_wait {
                        return Ok(Probe::TimedOut {
                            waited: started.elapsed(),
                        });
                    }
                    std::thread::sleep(self.poll_interval);
                    samples += 1;
                    if has_write_handle(path)? {
                        streak = 0;
                    } else {
                        streak += 1;
                    }
                }
            }
        }
    }

    /// Resolve the configured method against what the runtime supports,
    /// warning once on fallback.
    fn effective_method(&self) -> StabilityMethod {
        if self.method == StabilityMethod::OpenHandle && !open_handle_available() {
            if !self.fallback_warned.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    "open-handle stability check unavailable on this system; \
                     falling back to size sampling"
                );
            }
            return StabilityMethod::SizeSampling;
        }
        self.method
    }
}

fn file_size(path: &Path) -> Result<u64, SyncError> {
    Ok(std::fs::metadata(path).map_err(|e| io_err(path, e))?.len())
}

// ---------------------------------------------------------------------------
// Open-handle probing
// ---------------------------------------------------------------------------

/// Whether `/proc` fd introspection works here.
pub(crate) fn open_handle_available() -> bool {
    Path::new("/proc/self/fd").is_dir()
}

/// Scan `/proc` for any process holding `path` open with write access.
fn has_write_handle(path: &Path) -> Result<bool, SyncError> {
    let target = std::fs::canonicalize(path).map_err(|e| io_err(path, e))?;
    let proc_dir = Path::new("/proc");
    let entries = std::fs::read_dir(proc_dir).map_err(|e| io_err(proc_dir, e))?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let pid = match name.to_str() {
            Some(s) if s.bytes().all(|b| b.is_ascii_digit()) => s,
            _ => continue,
        };
        // Unreadable fd tables (other users' processes) are skipped, not errors.
        let fd_dir = proc_dir.join(pid).join("fd");
        let fds = match std::fs::read_dir(&fd_dir) {
            Ok(fds) => fds,
            Err(_) => continue,
        };
        for fd in fds.flatten() {
            match std::fs::read_link(fd.path()) {
                Ok(link) if link == target => {}
                _ => continue,
            }
            let fdinfo = proc_dir.join(pid).join("fdinfo").join(fd.file_name());
            let info = match std::fs::read_to_string(&fdinfo) {
                Ok(info) => info,
                Err(_) => continue,
            };
            if fdinfo_opens_for_write(&info) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Parse the octal `flags:` line of a `/proc/<pid>/fdinfo/<fd>` entry and
/// test the O_WRONLY / O_RDWR access-mode bits.
fn fdinfo_opens_for_write(info: &str) -> bool {
    for line in info.lines() {
        if let Some(raw) = line.strip_prefix("flags:") {
            let flags = u32::from_str_radix(raw.trim(), 8).unwrap_or(0);
            return flags & 0o3 != 0;
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn detector(poll_ms: u64, max_wait_ms: u64, required: u32) -> StabilityDetector {
        StabilityDetector::new(
            StabilityMethod::SizeSampling,
            Duration::from_millis(poll_ms),
            Duration::from_millis(max_wait_ms),
            required,
        )
    }

    #[test]
    fn static_file_is_stable() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("a.csv");
        std::fs::write(&path, b"done").expect("write");

        let det = detector(10, 1000, 3);
        assert!(det.is_stable(&path).expect("probe"));
    }

    #[test]
    fn await_stable_takes_exactly_the_required_samples() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("a.csv");
        std::fs::write(&path, b"done").expect("write");

        let det = detector(10, 2000, 3);
        match det.await_stable(&path).expect("probe") {
            Probe::Stable { samples } => assert_eq!(samples, 3),
            other => panic!("expected stable, got {other:?}"),
        }
    }

    #[test]
    fn mid_wait_growth_resets_the_streak() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("grow.csv");
        std::fs::write(&path, b"start").expect("write");

        // Append once, well inside the second poll window: the streak must
        // reset and stability needs at least one extra full cycle.
        let writer_path = path.clone();
        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(120));
            let mut f = std::fs::OpenOptions::new()
                .append(true)
                .open(&writer_path)
                .expect("open for append");
            f.write_all(b"more").expect("append");
        });

        let det = detector(100, 5000, 2);
        let probe = det.await_stable(&path).expect("probe");
        writer.join().expect("writer thread");

        match probe {
            Probe::Stable { samples } => {
                assert!(samples > 2, "reset must delay stability, got {samples} samples");
            }
            other => panic!("expected eventual stability, got {other:?}"),
        }
    }

    #[test]
    fn continuously_growing_file_times_out() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("hot.csv");
        std::fs::write(&path, b"x").expect("write");

        let writer_path = path.clone();
        let writer = std::thread::spawn(move || {
            for _ in 0..20 {
                let mut f = std::fs::OpenOptions::new()
                    .append(true)
                    .open(&writer_path)
                    .expect("open for append");
                f.write_all(b"xxxx").expect("append");
                std::thread::sleep(Duration::from_millis(20));
            }
        });

        let det = detector(25, 250, 4);
        let probe = det.await_stable(&path).expect("probe");
        writer.join().expect("writer thread");

        match probe {
            Probe::TimedOut { waited } => {
                assert!(waited >= Duration::from_millis(250));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = TempDir::new().expect("tempdir");
        let det = detector(10, 100, 2);
        let err = det.await_stable(&dir.path().join("gone")).expect_err("io");
        assert_eq!(err.io_kind(), Some(std::io::ErrorKind::NotFound));
    }

    #[test]
    fn fdinfo_write_mode_parsing() {
        assert!(fdinfo_opens_for_write("pos:\t0\nflags:\t0100002\nmnt_id:\t29\n"));
        assert!(fdinfo_opens_for_write("flags: 0100001\n"));
        assert!(!fdinfo_opens_for_write("flags:\t0100000\n"));
        assert!(!fdinfo_opens_for_write("no flags line\n"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn open_handle_sees_our_own_writer() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("held.csv");

        let held = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .expect("open for write");

        let det = StabilityDetector::new(
            StabilityMethod::OpenHandle,
            Duration::from_millis(10),
            Duration::from_millis(200),
            1,
        );
        assert!(!det.is_stable(&path).expect("probe"), "writer is live");

        drop(held);
        assert!(det.is_stable(&path).expect("probe"), "writer released");
    }
}
