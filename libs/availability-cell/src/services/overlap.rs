use shared_models::availability::{Period, PeriodOverlap};

/// Every overlapping pair among `periods`, reported as indices into the
/// input slice. Pairs are ordered by start date; two periods overlap when
/// they start together or the earlier one ends after the later one starts.
pub fn find_overlapped_periods(periods: &[Period]) -> Vec<PeriodOverlap> {
    let mut order: Vec<usize> = (0..periods.len()).collect();
    order.sort_by_key(|&index| periods[index].start);

    let mut overlaps = Vec::new();
    for (position, &i) in order.iter().enumerate() {
        for &j in &order[position + 1..] {
            let earlier = &periods[i];
            let later = &periods[j];
            if earlier.start == later.start || earlier.end > later.start {
                overlaps.push(PeriodOverlap { first: i, second: j });
            }
        }
    }

    overlaps
}
