//! Star adjustments applied after a successful return.

use crate::services::types::BookCondition;

pub const ON_TIME_BONUS: i32 = 1;
pub const LATE_PENALTY: i32 = -10;
pub const DAMAGE_PENALTY: i32 = -10;

/// Rating change for a return.
///
/// An on-time return in unchanged or better condition earns a star. Otherwise
/// lateness and a worsened condition are each penalised.
pub fn rating_delta(at_checkout: BookCondition, returned: BookCondition, late: bool) -> i32 {
    let damaged = returned.is_worse_than(at_checkout);
    if !late && !damaged {
        return ON_TIME_BONUS;
    }

    let mut delta = 0;
    if late {
        delta += LATE_PENALTY;
    }
    if damaged {
        delta += DAMAGE_PENALTY;
    }
    delta
}
