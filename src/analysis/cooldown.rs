// src/analysis/cooldown.rs
//
// Per-identity alert rate limiting.
//
// A continuously violating face would otherwise raise an alert (and a
// persisted event) on every frame. The gate remembers when each identity
// last alerted and refuses a new alert until the cooldown has elapsed.
// Identities are stream-scoped; one gate belongs to one live session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// ============================================================================
// CLOCK
// ============================================================================

/// Monotonic time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.base + offset
    }
}

// ============================================================================
// GATE
// ============================================================================

pub struct CooldownGate {
    cooldown: Duration,
    last_alert: HashMap<String, Instant>,
    clock: Arc<dyn Clock>,
}

impl CooldownGate {
    pub fn new(cooldown_seconds: u64) -> Self {
        Self::with_clock(cooldown_seconds, Arc::new(SystemClock))
    }

    pub fn with_clock(cooldown_seconds: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            cooldown: Duration::from_secs(cooldown_seconds.max(1)),
            last_alert: HashMap::new(),
            clock,
        }
    }

    /// True when `identity` may alert now; records the alert time if so.
    /// Identities never seen before are always eligible.
    pub fn should_alert(&mut self, identity: &str) -> bool {
        let now = self.clock.now();
        let eligible = match self.last_alert.get(identity) {
            Some(last) => now.saturating_duration_since(*last) >= self.cooldown,
            None => true,
        };

        if eligible {
            self.last_alert.insert(identity.to_string(), now);
        } else {
            debug!("⏳ {} still in cooldown", identity);
        }
        eligible
    }

    /// Applies to every later check. Already recorded times are kept.
    pub fn set_cooldown(&mut self, seconds: u64) {
        if seconds == 0 {
            warn!("Cooldown of 0s requested, clamping to 1s");
        }
        self.cooldown = Duration::from_secs(seconds.max(1));
    }

    pub fn cooldown_seconds(&self) -> u64 {
        self.cooldown.as_secs()
    }

    /// Forget every identity, e.g. when the live session ends.
    pub fn reset_all(&mut self) {
        self.last_alert.clear();
    }

    pub fn tracked_identities(&self) -> usize {
        self.last_alert.len()
    }
}
