//! Debug assertion macros for queue cursor invariants.
//!
//! Active only in debug builds (`#[cfg(debug_assertions)]` via `debug_assert!`),
//! so release builds pay nothing. A violation means the CAS protocol is broken
//! and is not recoverable.

// =============================================================================
// Cursor ordering
// =============================================================================

/// Assert that a committed cursor never passes its reservation cursor, and
/// that pops never pass committed pushes.
///
/// **Invariant**: `pop_committed ≤ pop_reserved ≤ push_committed ≤ push_reserved`
///
/// Cursors are sampled one at a time, so each argument must be loaded no
/// earlier than the one before it for the check to be meaningful.
macro_rules! debug_assert_cursor_order {
    ($pop_committed:expr, $pop_reserved:expr, $push_committed:expr, $push_reserved:expr) => {
        debug_assert!(
            $pop_committed <= $pop_reserved
                && $pop_reserved <= $push_committed
                && $push_committed <= $push_reserved,
            "cursor order violated: pop {}/{} push {}/{}",
            $pop_committed,
            $pop_reserved,
            $push_committed,
            $push_reserved
        )
    };
}

// =============================================================================
// Reservation bound
// =============================================================================

/// Assert that a producer never reserves past one full ring ahead of the
/// oldest unreleased slot.
///
/// **Invariant**: `push_reserved − pop_committed ≤ ring_capacity`
macro_rules! debug_assert_reservation_bound {
    ($next_reserved:expr, $pop_committed:expr, $ring_capacity:expr) => {
        debug_assert!(
            $next_reserved - $pop_committed <= $ring_capacity,
            "reservation bound violated: reserving up to {} with pop committed at {} (ring {})",
            $next_reserved,
            $pop_committed,
            $ring_capacity
        )
    };
}

// =============================================================================
// Monotonic progress
// =============================================================================

/// Assert that a cursor only increases.
///
/// **Invariant**: `new_value > old_value`
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new > $old,
            "{} did not advance: {} -> {}",
            $name,
            $old,
            $new
        )
    };
}

// =============================================================================
// Slot bounds
// =============================================================================

/// Assert that a masked cursor lands inside the real storage, never in the
/// padding between `requested_capacity` and `ring_capacity`.
macro_rules! debug_assert_slot_in_storage {
    ($index:expr, $capacity:expr) => {
        debug_assert!(
            $index < $capacity,
            "slot index {} outside storage of {} slots",
            $index,
            $capacity
        )
    };
}

pub(crate) use debug_assert_cursor_order;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_reservation_bound;
pub(crate) use debug_assert_slot_in_storage;
