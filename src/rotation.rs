//! # Rotation selection
//! Pure clock-to-index functions. Two processes observing the same pool at
//! the same second must pick the same item, so everything here is a function
//! of the epoch second passed in; no state, no I/O.

/// Default rotation period for the news pool, seconds per item.
pub const DEFAULT_ROTATION_SECS: u64 = 5;

/// Length of the display duty cycle in seconds.
pub const DISPLAY_CYCLE_SECS: u64 = 10;

/// Seconds of the duty cycle spent in the bulletin phase; the remainder
/// shows the market snapshot.
pub const BULLETIN_PHASE_SECS: u64 = 5;

/// Index into a sequence of `len` entries for the given epoch second,
/// advancing once per `period_secs`. `None` for an empty sequence.
pub fn rotation_index(epoch_secs: u64, period_secs: u64, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let period = period_secs.max(1);
    Some(((epoch_secs / period) % len as u64) as usize)
}

/// Position within the repeating display duty cycle, `0..DISPLAY_CYCLE_SECS`.
pub fn cycle_second(epoch_secs: u64) -> u64 {
    epoch_secs % DISPLAY_CYCLE_SECS
}

/// True while the duty cycle is in its bulletin phase.
pub fn in_bulletin_phase(cycle_second: u64) -> bool {
    cycle_second < BULLETIN_PHASE_SECS
}

/// Which of `shown` bulletin entries to display at `cycle_second` within the
/// bulletin phase: `floor(cycle_second * shown / phase_len)`. Caller must
/// ensure `shown > 0` and `cycle_second < BULLETIN_PHASE_SECS`.
pub fn bulletin_slot(cycle_second: u64, shown: usize) -> usize {
    ((cycle_second * shown as u64) / BULLETIN_PHASE_SECS) as usize
}
