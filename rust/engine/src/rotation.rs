use crate::errors::GameError;
use crate::player::{PlayerId, Seat};

/// Advances the rotation pointer by one seat, wrapping at the end of the
/// order. Rotation never skips or reorders seats.
///
/// # Examples
///
/// ```
/// use cadavre_engine::rotation::next_seat_index;
///
/// assert_eq!(next_seat_index(3, 0), 1);
/// assert_eq!(next_seat_index(3, 2), 0);
/// ```
pub fn next_seat_index(order_len: usize, current: usize) -> usize {
    if order_len == 0 {
        return 0;
    }
    (current + 1) % order_len
}

/// Recomputes the rotation pointer after the seat at `removed` has been
/// deleted from an order that previously had `current` as its pointer.
///
/// The pointer keeps referring to the same logical seat when another seat is
/// removed. When the removed seat *was* current, the turn passes to the next
/// remaining seat in original relative order.
///
/// # Examples
///
/// ```
/// use cadavre_engine::rotation::seat_index_after_removal;
///
/// // Removing a seat before the pointer shifts it left.
/// assert_eq!(seat_index_after_removal(4, 0, 2), 1);
/// // Removing the current seat passes the turn to its successor.
/// assert_eq!(seat_index_after_removal(4, 2, 2), 2);
/// // ...wrapping when the current seat was last.
/// assert_eq!(seat_index_after_removal(4, 3, 3), 0);
/// ```
pub fn seat_index_after_removal(order_len: usize, removed: usize, current: usize) -> usize {
    let new_len = order_len.saturating_sub(1);
    if new_len == 0 {
        return 0;
    }
    if removed < current {
        current - 1
    } else {
        current % new_len
    }
}

/// Whether the seat at `current` belongs to `player_id`.
pub fn is_players_turn(order: &[Seat], current: usize, player_id: &PlayerId) -> bool {
    order
        .get(current)
        .and_then(Seat::player_id)
        .map(|id| id == player_id)
        .unwrap_or(false)
}

/// Optimistic ordering check: a submission must name the turn number it
/// expects to occupy, which is always the current length of the turn log.
/// Guards against duplicate and out-of-order submission under retries.
pub fn validate_turn_number(committed: usize, expected: usize) -> Result<(), GameError> {
    if expected != committed {
        return Err(GameError::InvalidTurnNumber {
            expected: committed,
            got: expected,
        });
    }
    Ok(())
}
