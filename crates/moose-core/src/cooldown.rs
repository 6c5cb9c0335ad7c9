use std::{
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

/// Source of wall-clock time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Sentinel for "no call accepted yet". The first caller always wins, whatever
/// the window.
const NEVER: i64 = i64::MIN;

/// Single-flight cooldown guarding moose lookups.
///
/// At most one caller is accepted per window. Callers that lose are rejected
/// immediately, they are never queued.
pub struct CooldownGate {
    last_accepted: AtomicI64,
    window_ms: i64,
    clock: Arc<dyn Clock>,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, Arc::new(SystemClock))
    }

    pub fn with_clock(window: Duration, clock: Arc<dyn Clock>) -> Self {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        Self {
            last_accepted: AtomicI64::new(NEVER),
            window_ms,
            clock,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.window_ms == 0
    }

    /// Try to open the gate. Returns `true` for exactly one caller per window.
    pub fn try_acquire(&self) -> bool {
        if self.is_disabled() {
            return true;
        }

        let mut observed = self.last_accepted.load(Ordering::Acquire);
        loop {
            let now = self.clock.now_millis();
            if observed != NEVER && now.saturating_sub(observed) <= self.window_ms {
                return false;
            }
            match self.last_accepted.compare_exchange(
                observed,
                now,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                // Someone else moved the timestamp; the window must be re-checked.
                Err(current) => observed = current,
            }
        }
    }

    /// Time left until the gate can open again (zero when open).
    pub fn retry_after(&self) -> Duration {
        if self.is_disabled() {
            return Duration::ZERO;
        }
        let last = self.last_accepted.load(Ordering::Acquire);
        if last == NEVER {
            return Duration::ZERO;
        }
        let elapsed = self.clock.now_millis().saturating_sub(last);
        if elapsed > self.window_ms {
            return Duration::ZERO;
        }
        // The window is inclusive, so the gate opens one millisecond after it.
        let left = self.window_ms - elapsed.max(0) + 1;
        Duration::from_millis(left as u64)
    }
}
