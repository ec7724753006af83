/*!
    Demuxer interrupt deadline.

    FFmpeg invokes the interrupt callback repeatedly while blocked inside
    I/O; returning non-zero aborts the operation. The flag is re-armed at
    the start of each read iteration, so the deadline measures a single
    stalled operation rather than total runtime.
*/

use std::os::raw::{c_int, c_void};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::READ_TIMEOUT_SECS;

fn unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub(crate) struct InterruptFlag {
    armed_at: AtomicI64,
    triggered: AtomicBool,
}

impl InterruptFlag {
    pub(crate) fn new() -> Self {
        Self {
            armed_at: AtomicI64::new(unix_seconds()),
            triggered: AtomicBool::new(false),
        }
    }

    /// Restart the deadline for the next I/O operation.
    pub(crate) fn arm(&self) {
        self.armed_at.store(unix_seconds(), Ordering::Relaxed);
    }

    /// Whether the deadline ever fired. Sticky: a timed-out reader closes.
    pub(crate) fn triggered(&self) -> bool {
        self.triggered.load(Ordering::Relaxed)
    }

    fn check(&self) -> bool {
        let elapsed = unix_seconds() - self.armed_at.load(Ordering::Relaxed);
        if elapsed > READ_TIMEOUT_SECS {
            self.triggered.store(true, Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}

/// Callback installed on the format context. `opaque` points at the
/// reader-owned [`InterruptFlag`], which outlives the format context.
pub(crate) unsafe extern "C" fn interrupt_callback(opaque: *mut c_void) -> c_int {
    if opaque.is_null() {
        return 0;
    }
    let flag = &*(opaque as *const InterruptFlag);
    c_int::from(flag.check())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshly_armed_flag_does_not_trigger() {
        let flag = InterruptFlag::new();
        assert!(!flag.check());
        assert!(!flag.triggered());
    }

    #[test]
    fn stale_flag_triggers_and_sticks() {
        let flag = InterruptFlag::new();
        flag.armed_at
            .store(unix_seconds() - READ_TIMEOUT_SECS - 1, Ordering::Relaxed);
        assert!(flag.check());
        assert!(flag.triggered());

        // re-arming clears the deadline but not the sticky trigger
        flag.arm();
        assert!(!flag.check());
        assert!(flag.triggered());
    }

    #[test]
    fn callback_handles_null_opaque() {
        let result = unsafe { interrupt_callback(std::ptr::null_mut()) };
        assert_eq!(result, 0);
    }

    #[test]
    fn callback_reports_through_opaque() {
        let flag = InterruptFlag::new();
        let opaque = &flag as *const InterruptFlag as *mut c_void;
        assert_eq!(unsafe { interrupt_callback(opaque) }, 0);

        flag.armed_at
            .store(unix_seconds() - READ_TIMEOUT_SECS - 1, Ordering::Relaxed);
        assert_eq!(unsafe { interrupt_callback(opaque) }, 1);
    }
}
