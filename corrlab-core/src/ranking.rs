//! Top-K reduction of a window's correlation map.

use crate::domain::{CorrelatedEntity, CorrelationMap, MainSecurity, Window};

pub const DEFAULT_TOP_K: usize = 100;

/// `(positive, negative)`: the first `k` by correlation descending, and the
/// first `k` ascending. Both sorts are stable over the map's symbol order, so
/// equal correlations keep symbol order.
pub fn top_k(map: &CorrelationMap, k: usize) -> (Vec<CorrelatedEntity>, Vec<CorrelatedEntity>) {
    let mut entries: Vec<(&String, f64)> = map.iter().map(|(s, c)| (s, *c)).collect();

    entries.sort_by(|a, b| b.1.total_cmp(&a.1));
    let positive = entries
        .iter()
        .take(k)
        .map(|(s, c)| CorrelatedEntity::new(s.as_str(), *c))
        .collect();

    entries.sort_by(|a, b| a.1.total_cmp(&b.1));
    let negative = entries
        .iter()
        .take(k)
        .map(|(s, c)| CorrelatedEntity::new(s.as_str(), *c))
        .collect();

    (positive, negative)
}

/// Rank `main`'s map for `window` into its ranked lists, then clear the map.
///
/// A window with no map (or an empty one) leaves the ranked lists untouched.
pub fn rank(main: &mut MainSecurity, window: Window, k: usize) {
    let Some(map) = main.all_correlations.get_mut(&window) else {
        return;
    };
    if map.is_empty() {
        return;
    }
    let (positive, negative) = top_k(map, k);
    map.clear();
    main.positive_correlations.insert(window, positive);
    main.negative_correlations.insert(window, negative);
}

/// Rank every main for `window`.
pub fn rank_all(mains: &mut [MainSecurity], window: Window, k: usize) {
    for main in mains {
        rank(main, window, k);
    }
}
