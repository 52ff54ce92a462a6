//! Natural ordering of transit lines.
//!
//! Line names mix letters and digits ("58", "58B", "506", "M1", "Bordeaux 12").
//! Sorting them as plain strings gives "506" < "58", so every view in the
//! engine sorts through [`line_sort_key`] instead.

use std::collections::{HashMap, HashSet};

use crate::domain::{Departure, Line, LineMatcher};

/// Width to which numeric runs are zero-padded.
const PAD_WIDTH: usize = 100;

/// Error for a line name that has neither a letter nor a digit head.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("bad line name: {0:?}")]
pub struct BadLineName(pub String);

/// Sort key for a line name. Compare keys, not names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LineSortKey(String, String);

/// Compute the natural sort key for a line name.
///
/// The name is uppercased and stripped of everything that is not a word
/// character. A leading letter run sorts by letters, then by the zero-padded
/// remainder; a leading digit run sorts by the zero-padded digits, then by the
/// remainder. An empty name sorts as `"0"`.
///
/// # Examples
///
/// ```
/// use pan_transit::order::line_sort_key;
///
/// let mut lines = vec!["506", "58B", "58"];
/// lines.sort_by_key(|name| line_sort_key(name).unwrap());
/// assert_eq!(lines, ["58", "58B", "506"]);
/// ```
pub fn line_sort_key(name: &str) -> Result<LineSortKey, BadLineName> {
    let stripped: String = name
        .to_uppercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if stripped.is_empty() {
        return line_sort_key("0");
    }

    let alpha = leading_run(&stripped, |c| c.is_ascii_uppercase());
    if alpha > 0 {
        let (head, tail) = stripped.split_at(alpha);
        return Ok(LineSortKey(head.to_string(), zero_pad(tail)));
    }

    let digits = leading_run(&stripped, |c| c.is_ascii_digit());
    if digits > 0 {
        let (head, tail) = stripped.split_at(digits);
        return Ok(LineSortKey(zero_pad(head), tail.to_string()));
    }

    Err(BadLineName(stripped))
}

/// Length of the leading run of characters matching `pred`.
fn leading_run(s: &str, pred: impl Fn(char) -> bool) -> usize {
    s.chars().take_while(|c| pred(*c)).count()
}

fn zero_pad(s: &str) -> String {
    format!("{:0>width$}", s, width = PAD_WIDTH)
}

/// Stable sort of `items` by a fallible key.
fn sort_by_fallible_key<T, K: Ord>(
    items: Vec<T>,
    key: impl Fn(&T) -> Result<K, BadLineName>,
) -> Result<Vec<T>, BadLineName> {
    let mut keyed = items
        .into_iter()
        .map(|item| key(&item).map(|k| (k, item)))
        .collect::<Result<Vec<_>, _>>()?;
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

/// Keep the first line of each name, then sort in natural line order.
pub fn sorted_unique_lines(lines: Vec<Line>) -> Result<Vec<Line>, BadLineName> {
    let mut seen = HashSet::new();
    let unique: Vec<Line> = lines
        .into_iter()
        .filter(|line| seen.insert(line.name.clone()))
        .collect();
    sort_by_fallible_key(unique, |line| line_sort_key(&line.name))
}

/// Sort departures by time, ties broken by natural line order.
pub fn sorted_departures(departures: Vec<Departure>) -> Result<Vec<Departure>, BadLineName> {
    sort_by_fallible_key(departures, |dep| {
        line_sort_key(&dep.line).map(|key| (dep.time, key))
    })
}

/// Drop lines matching any of `ignore`.
pub fn filter_lines(lines: Vec<Line>, ignore: &[LineMatcher]) -> Vec<Line> {
    lines
        .into_iter()
        .filter(|line| !ignore.iter().any(|m| m.matches(&line.name, &line.destination)))
        .collect()
}

/// Drop departures whose line and destination match any of `ignore`.
pub fn filter_departures(departures: Vec<Departure>, ignore: &[LineMatcher]) -> Vec<Departure> {
    departures
        .into_iter()
        .filter(|dep| !ignore.iter().any(|m| m.matches(&dep.line, &dep.destination)))
        .collect()
}

/// Most frequent value; ties go to the smallest value so the result is
/// reproducible.
pub fn most_common<T: Ord + Clone + std::hash::Hash>(values: &[T]) -> Option<T> {
    let mut counts: HashMap<&T, usize> = HashMap::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }
    let best = counts.values().copied().max()?;
    counts
        .into_iter()
        .filter(|(_, count)| *count == best)
        .map(|(value, _)| value)
        .min()
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sort_names(names: &[&str]) -> Vec<String> {
        let mut names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        names.sort_by_key(|name| line_sort_key(name).unwrap());
        names
    }

    #[test]
    fn digits_then_suffix() {
        assert_eq!(sort_names(&["506", "58B", "58"]), ["58", "58B", "506"]);
    }

    #[test]
    fn letters_then_digits() {
        assert_eq!(
            sort_names(&["B", "AAA", "AA", "A1", "A"]),
            ["A", "A1", "AA", "AAA", "B"]
        );
    }

    #[test]
    fn words_with_numbers() {
        assert_eq!(
            sort_names(&["Cannes", "Bordeaux 12", "Bordeaux 11", "Arles"]),
            ["Arles", "Bordeaux 11", "Bordeaux 12", "Cannes"]
        );
    }

    #[test]
    fn empty_name_sorts_as_zero() {
        assert_eq!(line_sort_key("").unwrap(), line_sort_key("0").unwrap());
        assert_eq!(line_sort_key("--").unwrap(), line_sort_key("0").unwrap());
    }

    #[test]
    fn punctuation_and_case_are_ignored() {
        assert_eq!(line_sort_key("m-1").unwrap(), line_sort_key("M1").unwrap());
    }

    #[test]
    fn name_without_letter_or_digit_head_is_an_error() {
        assert_eq!(line_sort_key("_1"), Err(BadLineName("_1".to_string())));
        assert!(line_sort_key("Ä1").is_err());
    }

    #[test]
    fn unique_lines_keep_first_and_sort() {
        let lines = ["10", "103", "103", "102", "102T", "102T"]
            .iter()
            .map(|name| Line::new(*name, ""))
            .collect();
        let names: Vec<String> = sorted_unique_lines(lines)
            .unwrap()
            .into_iter()
            .map(|line| line.name)
            .collect();
        assert_eq!(names, ["10", "102", "102T", "103"]);
    }

    #[test]
    fn unique_lines_first_occurrence_wins() {
        let lines = vec![Line::new("7", "Kamppi"), Line::new("7", "Pasila")];
        let unique = sorted_unique_lines(lines).unwrap();
        assert_eq!(unique, [Line::new("7", "Kamppi")]);
    }

    #[test]
    fn departures_by_time_then_line() {
        let deps = vec![
            Departure::scheduled("1", "B", "x", 200),
            Departure::scheduled("2", "A", "x", 100),
            Departure::scheduled("2", "58", "x", 200),
        ];
        let sorted = sorted_departures(deps).unwrap();
        let order: Vec<(i64, &str)> = sorted.iter().map(|d| (d.time, d.line.as_str())).collect();
        assert_eq!(order, [(100, "A"), (200, "58"), (200, "B")]);
    }

    #[test]
    fn filters_match_case_insensitively() {
        let ignore = [LineMatcher::new("B", "BBB")];
        let lines = vec![Line::new("a", "aaa"), Line::new("b", "bbb")];
        assert_eq!(filter_lines(lines, &ignore), [Line::new("a", "aaa")]);

        let deps = vec![
            Departure::scheduled("1", "a", "aaa", 0),
            Departure::scheduled("1", "b", "bbb", 0),
        ];
        let kept = filter_departures(deps, &ignore);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].line, "a");
    }

    #[test]
    fn most_common_breaks_ties_by_smallest() {
        assert_eq!(most_common(&[1, 1, 1, 2, 2, 3]), Some(1));
        assert_eq!(most_common(&[2, 2, 1, 1]), Some(1));
        assert_eq!(most_common::<i32>(&[]), None);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Every permutation of the reference lists sorts back to the same order.
        #[test]
        fn reference_orders_are_permutation_invariant(
            a in Just(vec!["58", "58B", "506"]).prop_shuffle(),
            b in Just(vec!["A", "A1", "AA", "AAA", "B"]).prop_shuffle(),
        ) {
            let mut a = a;
            a.sort_by_key(|name| line_sort_key(name).unwrap());
            prop_assert_eq!(a, vec!["58", "58B", "506"]);

            let mut b = b;
            b.sort_by_key(|name| line_sort_key(name).unwrap());
            prop_assert_eq!(b, vec!["A", "A1", "AA", "AAA", "B"]);
        }

        /// Plain numbers sort numerically.
        #[test]
        fn numbers_sort_numerically(x in 0u32..100_000, y in 0u32..100_000) {
            let kx = line_sort_key(&x.to_string()).unwrap();
            let ky = line_sort_key(&y.to_string()).unwrap();
            prop_assert_eq!(kx.cmp(&ky), x.cmp(&y));
        }

        /// Names built from ASCII letters and digits always have a key.
        #[test]
        fn alphanumeric_names_have_keys(name in "[A-Za-z0-9 -]{0,12}") {
            prop_assert!(line_sort_key(&name).is_ok());
        }

        /// Deduplicated lines contain each input name exactly once.
        #[test]
        fn unique_lines_are_unique(names in proptest::collection::vec("[0-9]{1,3}[A-Z]?", 0..20)) {
            let lines = names.iter().map(|n| Line::new(n.as_str(), "")).collect();
            let unique = sorted_unique_lines(lines).unwrap();
            let distinct: HashSet<&String> = names.iter().collect();
            prop_assert_eq!(unique.len(), distinct.len());
        }
    }
}
