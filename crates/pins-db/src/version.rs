//! Ordering of segmented version strings such as `1-1`, `2.0.3` or `1.2-alpha`.
//!
//! Each segment resolves to a key: its integer value when it parses as one,
//! `i128::MAX` when it does not (so `alpha` sorts after every numeric
//! sibling), and `-1` when the version has no segment at that position (so
//! `1` sorts before `1.0`).

use std::cmp::Ordering;

const ABSENT: i128 = -1;
const NON_NUMERIC: i128 = i128::MAX;

fn segments<'a>(version: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return vec![version];
    }
    version.split(separator).collect()
}

fn segment_key(segment: Option<&&str>) -> i128 {
    match segment {
        None => ABSENT,
        Some(s) => s.parse::<i64>().map(i128::from).unwrap_or(NON_NUMERIC),
    }
}

/// Total order over version strings, segment by segment.
pub fn ordering(a: &str, b: &str, separator: &str) -> Ordering {
    let a = segments(a, separator);
    let b = segments(b, separator);
    for i in 0..a.len().max(b.len()) {
        let (ka, kb) = (segment_key(a.get(i)), segment_key(b.get(i)));
        if ka != kb {
            return ka.cmp(&kb);
        }
    }
    Ordering::Equal
}

/// Returns true when `a` is ordered at or before `b`. Equal versions compare
/// true; callers needing strict inequality check `!compare(b, a, ..)`.
pub fn compare(a: &str, b: &str, separator: &str) -> bool {
    ordering(a, b, separator) != Ordering::Greater
}

/// Stable ascending sort of `items` by the version each one carries.
pub fn sort_by_version<T>(items: &mut [T], separator: &str, version: impl Fn(&T) -> &str) {
    items.sort_by(|x, y| ordering(version(x), version(y), separator));
}

/// Stable descending sort, newest version first.
pub fn sort_by_version_desc<T>(items: &mut [T], separator: &str, version: impl Fn(&T) -> &str) {
    items.sort_by(|x, y| ordering(version(y), version(x), separator));
}
