use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use shared_models::availability::Availability;
use shared_models::lookup::TimeGroupWindow;
use shared_utils::time::{
    calendar_day_distance, group_midpoint_seconds, in_time_group, seconds_since_midnight,
};

use crate::models::MAX_SUGGESTIONS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct RankKey {
    outside_group: bool,
    day_distance: i64,
    midpoint_distance: i64,
}

fn rank_key(slot: &Availability, reference: DateTime<Utc>, window: Option<&TimeGroupWindow>) -> RankKey {
    let (outside_group, midpoint_distance) = match window {
        Some(window) => (
            !in_time_group(slot.start_date, window),
            (seconds_since_midnight(slot.start_date) - group_midpoint_seconds(window)).abs(),
        ),
        None => (true, 0),
    };

    RankKey {
        outside_group,
        day_distance: calendar_day_distance(slot.start_date, reference),
        midpoint_distance,
    }
}

/// Orders candidate slots best-first and keeps at most `MAX_SUGGESTIONS`.
/// Slots inside the requested time group come first, then the ones closest
/// to the reference day, then the ones closest to the middle of the group.
pub fn rank_suggestions(
    mut candidates: Vec<Availability>,
    reference: DateTime<Utc>,
    window: Option<&TimeGroupWindow>,
) -> Vec<Availability> {
    candidates.sort_by(|a, b| compare_suggestions(a, b, reference, window));
    candidates.truncate(MAX_SUGGESTIONS);
    candidates
}

/// Comparison used by `rank_suggestions`, exposed for callers merging
/// ranked lists.
pub fn compare_suggestions(
    a: &Availability,
    b: &Availability,
    reference: DateTime<Utc>,
    window: Option<&TimeGroupWindow>,
) -> Ordering {
    rank_key(a, reference, window)
        .cmp(&rank_key(b, reference, window))
        .then_with(|| a.start_date.cmp(&b.start_date))
        .then_with(|| a.id.cmp(&b.id))
}
