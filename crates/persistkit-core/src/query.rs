//! Caller-side filtering and sorting
//!
//! Stores reject predicates and sort descriptors; callers fetch unfiltered
//! and evaluate them here.

use std::cmp::Ordering;

use serde_json::Value;

use crate::model::{Predicate, Snapshot, SortDescriptor, SortOrder};

/// Filter then sort `snapshots`
///
/// Sorting is stable. Values of different JSON types order by type: missing
/// and null, then bools, numbers, strings, arrays, objects. Arrays and
/// objects compare equal among themselves.
pub fn apply_in_memory(
    snapshots: Vec<Snapshot>,
    predicate: Option<&Predicate>,
    sort_descriptors: &[SortDescriptor],
) -> Vec<Snapshot> {
    let mut out: Vec<Snapshot> = match predicate {
        Some(p) => snapshots.into_iter().filter(|s| p.matches(s)).collect(),
        None => snapshots,
    };
    if !sort_descriptors.is_empty() {
        out.sort_by(|a, b| compare_by(a, b, sort_descriptors));
    }
    out
}

fn compare_by(a: &Snapshot, b: &Snapshot, descriptors: &[SortDescriptor]) -> Ordering {
    for descriptor in descriptors {
        let ord = compare_values(
            a.attribute(&descriptor.attribute),
            b.attribute(&descriptor.attribute),
        );
        let ord = match descriptor.order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

// Total order: rank by type first, then by value within a type
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    type_rank(a).cmp(&type_rank(b)).then_with(|| match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            // serde_json numbers are finite
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => Ordering::Equal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PersistentIdentifier;
    use serde_json::json;

    fn item(key: &str, title: Value, reserved: bool) -> Snapshot {
        Snapshot::new(
            PersistentIdentifier::permanent("s", "BucketListItem", key),
            "bucketList",
        )
        .with_attribute("title", title)
        .with_attribute("hasReservation", json!(reserved))
    }

    fn keys(snapshots: &[Snapshot]) -> Vec<&str> {
        snapshots
            .iter()
            .map(|s| s.persistent_identifier().primary_key())
            .collect()
    }

    #[test]
    fn test_filter_then_sort() {
        let items = vec![
            item("a", json!("Hike"), true),
            item("b", json!("Camp"), false),
            item("c", json!("Boat"), true),
        ];
        let reserved = Predicate::attribute_equals("hasReservation", json!(true));
        let out = apply_in_memory(items, Some(&reserved), &[SortDescriptor::ascending("title")]);
        assert_eq!(keys(&out), vec!["c", "a"]);
    }

    #[test]
    fn test_nulls_sort_first_and_descending_reverses() {
        let items = vec![
            item("a", json!("B"), false),
            item("b", Value::Null, false),
            item("c", json!("A"), false),
        ];
        let asc = apply_in_memory(items.clone(), None, &[SortDescriptor::ascending("title")]);
        assert_eq!(keys(&asc), vec!["b", "c", "a"]);

        let desc = apply_in_memory(items, None, &[SortDescriptor::descending("title")]);
        assert_eq!(keys(&desc), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_secondary_key_and_stability() {
        let items = vec![
            item("a", json!("Same"), true),
            item("b", json!("Same"), false),
            item("c", json!("Same"), true),
        ];
        let out = apply_in_memory(
            items,
            None,
            &[
                SortDescriptor::ascending("title"),
                SortDescriptor::ascending("hasReservation"),
            ],
        );
        assert_eq!(keys(&out), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_mixed_types_sort_by_type_then_value() {
        let values = [json!(7), json!("b"), json!(false), json!(3.5), json!("a"), json!(true)];
        let items: Vec<Snapshot> = (0..210)
            .map(|i| {
                Snapshot::new(
                    PersistentIdentifier::permanent("s", "Trip", format!("k{}", i)),
                    "trips",
                )
                .with_attribute("a", values[i % values.len()].clone())
            })
            .collect();

        let out = apply_in_memory(items, None, &[SortDescriptor::ascending("a")]);

        let sorted: Vec<&Value> = out.iter().filter_map(|s| s.attribute("a")).collect();
        assert_eq!(sorted.len(), 210);
        assert!(sorted[..35].iter().all(|v| **v == json!(false)));
        assert!(sorted[35..70].iter().all(|v| **v == json!(true)));
        assert!(sorted[70..105].iter().all(|v| **v == json!(3.5)));
        assert!(sorted[105..140].iter().all(|v| **v == json!(7)));
        assert!(sorted[140..175].iter().all(|v| **v == json!("a")));
        assert!(sorted[175..].iter().all(|v| **v == json!("b")));
    }

    #[test]
    fn test_missing_and_null_sort_together_first() {
        let items = vec![
            item("a", json!(1), false),
            item("b", Value::Null, false),
            Snapshot::new(PersistentIdentifier::permanent("s", "Trip", "c"), "trips"),
        ];
        let out = apply_in_memory(items, None, &[SortDescriptor::ascending("title")]);
        assert_eq!(keys(&out), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_numbers_compare_numerically() {
        let snapshot = |key: &str, n: Value| {
            Snapshot::new(PersistentIdentifier::permanent("s", "Trip", key), "trips")
                .with_attribute("nights", n)
        };
        let out = apply_in_memory(
            vec![snapshot("a", json!(10)), snapshot("b", json!(2.5))],
            None,
            &[SortDescriptor::ascending("nights")],
        );
        assert_eq!(keys(&out), vec!["b", "a"]);
    }
}
