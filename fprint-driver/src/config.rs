//! Tunables for the transport tasks and operation orchestrator (spec
//! §4.3, §4.5).

use std::time::Duration;

use fprint_protocol::DEFAULT_ADDRESS;

/// Configuration for a [`crate::Driver`] (spec §4.3 queue sizes, §4.5 step
/// timeouts and retry counts).
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Device address stamped on every outbound command.
    pub address: u32,
    /// Capacity of the reader→dispatcher response queue (spec §4.3
    /// "bounded response queue (size ≥8)").
    pub response_queue_capacity: usize,
    /// Capacity of the in-flight command queue.
    pub command_queue_capacity: usize,
    /// How long `dispatch` waits for a free command-queue slot before
    /// failing with [`crate::DriverError::Busy`] (spec §4.3).
    pub enqueue_wait: Duration,
    /// Cooldown after a template-uploaded event during which the
    /// dispatcher ignores trailing bytes reinterpreted as replies (spec
    /// §4.3).
    pub post_upload_cooldown: Duration,
    /// How long the dispatcher keeps `match_cooldown_active` set after a
    /// positive search match, to flag stray duplicate echoes (spec §4.8).
    pub match_cooldown: Duration,
    /// Steps.
    pub steps: StepTimeouts,
    /// Finger-presence pipeline tunables (spec §4.6).
    pub finger: FingerConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            response_queue_capacity: 8,
            command_queue_capacity: 8,
            enqueue_wait: Duration::from_millis(100),
            post_upload_cooldown: Duration::from_secs(2),
            match_cooldown: Duration::from_secs(1),
            steps: StepTimeouts::default(),
            finger: FingerConfig::default(),
        }
    }
}

/// Per-step timeouts and retry counts from spec §4.5.
#[derive(Debug, Clone, Copy)]
pub struct StepTimeouts {
    pub index_table_read: Duration,
    pub gen_char: Duration,
    pub reg_model: Duration,
    pub store_char: Duration,
    pub search: Duration,
    pub verify_search: Duration,
    pub delete: Duration,
    pub clear: Duration,
    pub count: Duration,
    pub no_finger_confirm_window: Duration,
    pub finger_wait: Duration,
    pub enroll_attempts: u32,
    pub verify_attempts: u32,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            index_table_read: Duration::from_secs(2),
            gen_char: Duration::from_secs(2),
            reg_model: Duration::from_secs(2),
            store_char: Duration::from_secs(2),
            search: Duration::from_secs(2),
            verify_search: Duration::from_secs(3),
            delete: Duration::from_secs(2),
            clear: Duration::from_secs(5),
            count: Duration::from_secs(2),
            no_finger_confirm_window: Duration::from_secs(10),
            finger_wait: Duration::from_secs(30),
            enroll_attempts: 3,
            verify_attempts: 3,
        }
    }
}

/// Finger-presence pipeline tunables (spec §4.6).
#[derive(Debug, Clone, Copy)]
pub struct FingerConfig {
    /// ISR debounce window: edges within this long of the previous one
    /// are dropped.
    pub debounce: Duration,
    /// How long the detection task waits to acquire the finger-detect
    /// mutex before giving up.
    pub detect_lock_wait: Duration,
    /// Number of confirmation captures attempted.
    pub confirm_attempts: u32,
    /// Spacing between confirmation captures.
    pub confirm_spacing: Duration,
    /// Wait per confirmation capture.
    pub confirm_wait: Duration,
    /// Wait for the buffer-selected gen-char issued right after presence
    /// is confirmed (spec §4.6).
    pub capture_wait: Duration,
    /// `wait_for_finger`'s independent polling fallback period.
    pub poll_fallback: Duration,
    /// Watchdog ceiling on how long `is_validating` may stay set.
    pub validating_watchdog: Duration,
}

impl Default for FingerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            detect_lock_wait: Duration::from_millis(100),
            confirm_attempts: 3,
            confirm_spacing: Duration::from_millis(50),
            confirm_wait: Duration::from_millis(800),
            capture_wait: Duration::from_secs(2),
            poll_fallback: Duration::from_secs(1),
            validating_watchdog: Duration::from_secs(5),
        }
    }
}
