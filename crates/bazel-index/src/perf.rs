// perf.rs - Timing instrumentation for dispatches and index refreshes
//
// Controlled via the BAZEL_INDEX_PERF environment variable.
//
// Usage:
//   BAZEL_INDEX_PERF=1 bazel-index --dump .        # Enable basic timing logs
//   BAZEL_INDEX_PERF=verbose bazel-index --dump .  # Also warn on slow operations

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

static PERF_ENABLED: OnceLock<bool> = OnceLock::new();

static PERF_VERBOSE: OnceLock<bool> = OnceLock::new();

/// Check if performance timing is enabled
pub fn is_enabled() -> bool {
    *PERF_ENABLED.get_or_init(|| {
        std::env::var("BAZEL_INDEX_PERF")
            .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
            .unwrap_or(false)
    })
}

/// Check if verbose mode is enabled
pub fn is_verbose() -> bool {
    *PERF_VERBOSE.get_or_init(|| {
        std::env::var("BAZEL_INDEX_PERF")
            .map(|v| v.to_lowercase() == "verbose")
            .unwrap_or(false)
    })
}

/// RAII timing guard that logs duration on drop
///
/// ```
/// use bazel_index::perf::TimingGuard;
///
/// let _guard = TimingGuard::new("refresh_index");
/// // ... do work ...
/// ```
pub struct TimingGuard {
    start: Instant,
    name: &'static str,
    threshold_warn_ms: Option<u64>,
    enabled: bool,
}

impl TimingGuard {
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
            threshold_warn_ms: None,
            enabled: is_enabled(),
        }
    }

    /// Like `new`, but in verbose mode also warns when `threshold_ms` is exceeded.
    pub fn with_threshold(name: &'static str, threshold_ms: u64) -> Self {
        Self {
            threshold_warn_ms: Some(threshold_ms),
            ..Self::new(name)
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop timing without logging and return the duration.
    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        std::mem::forget(self);
        elapsed
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }

        let elapsed = self.start.elapsed();
        log::info!("[PERF] {} completed in {:?}", self.name, elapsed);

        if let Some(threshold) = self.threshold_warn_ms {
            if elapsed.as_millis() > threshold as u128 && is_verbose() {
                log::warn!(
                    "[PERF] {} exceeded threshold ({}ms > {}ms)",
                    self.name,
                    elapsed.as_millis(),
                    threshold
                );
            }
        }
    }
}

static DISPATCH_CALLS: AtomicUsize = AtomicUsize::new(0);

static REFRESH_CALLS: AtomicUsize = AtomicUsize::new(0);

/// Count one spawned build-tool process.
pub fn increment_dispatch_calls() {
    DISPATCH_CALLS.fetch_add(1, Ordering::Relaxed);
}

pub fn get_dispatch_calls() -> usize {
    DISPATCH_CALLS.load(Ordering::Relaxed)
}

/// Count one completed index refresh, successful or not.
pub fn increment_refresh_calls() {
    REFRESH_CALLS.fetch_add(1, Ordering::Relaxed);
}

pub fn get_refresh_calls() -> usize {
    REFRESH_CALLS.load(Ordering::Relaxed)
}

/// Log the process-wide counters, if timing is enabled.
pub fn log_summary() {
    if !is_enabled() {
        return;
    }
    log::info!(
        "[PERF] {} dispatches, {} refreshes, peak RSS {}",
        get_dispatch_calls(),
        get_refresh_calls(),
        peak_rss_bytes()
            .map(|b| format!("{} KiB", b / 1024))
            .unwrap_or_else(|| "unknown".to_string())
    );
}

/// Peak resident set size of the current process in bytes.
///
/// Reads `VmHWM` from `/proc/self/status` on Linux; `None` elsewhere.
pub fn peak_rss_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        peak_rss_linux()
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(target_os = "linux")]
fn peak_rss_linux() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmHWM:") {
            // Format: "VmHWM:    12345 kB"
            let trimmed = rest.trim();
            let kb_str = trimmed.strip_suffix("kB").unwrap_or(trimmed).trim();
            let kb: u64 = kb_str.parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}
