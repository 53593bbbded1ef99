//! Limits for "load more" and the filter backfill.

/// Whether the already fetched result holds rows beyond the visible slice.
pub fn has_more_local(available: usize, displayed: usize) -> bool { available > displayed }

/// A backend that filled the whole request probably has more, unless the
/// request already hit the ceiling.
pub fn has_more_remote(fetched: usize, requested: usize, ceiling: usize) -> bool {
    requested > 0 && fetched == requested && requested < ceiling
}

pub fn next_limit(previous: usize, page: usize, ceiling: usize) -> usize { previous.saturating_add(page).min(ceiling) }

/// Next `k` for the filter backfill, or `None` when growing is pointless:
/// the previous fetch came back short, or `k` cannot grow any further.
pub fn next_backfill_k(last: usize, desired: usize, ceiling: usize, fetched: usize) -> Option<usize> {
    if fetched < last || last >= ceiling { return None; }
    let next = last.max(desired).saturating_mul(2).min(ceiling);
    (next > last).then_some(next)
}
