//! Inner-join alignment of two series on shared timestamps.
//!
//! Unlike a union timeline there is no filling: a timestamp present in only
//! one series is dropped from both.

use chrono::NaiveDateTime;

use crate::domain::TimeSeries;

/// Two value vectors aligned on `timestamps`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedPair {
    pub timestamps: Vec<NaiveDateTime>,
    pub left: Vec<f64>,
    pub right: Vec<f64>,
}

impl AlignedPair {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Merge-join two strictly increasing series. O(n + m).
pub fn align_inner(left: &TimeSeries, right: &TimeSeries) -> AlignedPair {
    let (lt, lv) = (left.timestamps(), left.values());
    let (rt, rv) = (right.timestamps(), right.values());
    let mut out = AlignedPair::default();
    let (mut i, mut j) = (0, 0);
    while i < lt.len() && j < rt.len() {
        match lt[i].cmp(&rt[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.timestamps.push(lt[i]);
                out.left.push(lv[i]);
                out.right.push(rv[j]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn daily(points: &[(u32, f64)]) -> TimeSeries {
        TimeSeries::from_daily(
            points
                .iter()
                .map(|(d, v)| (NaiveDate::from_ymd_opt(2023, 3, *d).unwrap(), *v)),
        )
        .unwrap()
    }

    #[test]
    fn keeps_only_shared_timestamps() {
        let a = daily(&[(1, 1.0), (2, 2.0), (4, 4.0), (5, 5.0)]);
        let b = daily(&[(2, 20.0), (3, 30.0), (5, 50.0), (6, 60.0)]);
        let pair = align_inner(&a, &b);
        assert_eq!(pair.len(), 2);
        assert_eq!(pair.left, vec![2.0, 5.0]);
        assert_eq!(pair.right, vec![20.0, 50.0]);
    }

    #[test]
    fn disjoint_series_align_to_nothing() {
        let a = daily(&[(1, 1.0), (2, 2.0)]);
        let b = daily(&[(3, 1.0), (4, 2.0)]);
        assert!(align_inner(&a, &b).is_empty());
    }
}
