//! Predicate evaluation and ordering over in-memory records.

use std::cmp::Ordering;

use clinbridge_storage::{Criterion, NativePredicate, NativeRecord, Operator, SortKey};
use serde_json::Value;

/// Relative tolerance used by [`Operator::Approx`] on numbers.
const APPROX_TOLERANCE: f64 = 0.1;

/// Check if a record matches a predicate.
pub fn matches(predicate: &NativePredicate, record: &NativeRecord) -> bool {
    match predicate {
        NativePredicate::True => true,
        NativePredicate::False => false,
        NativePredicate::NotDeleted => !record.is_deleted(),
        NativePredicate::And(terms) => terms.iter().all(|t| matches(t, record)),
        NativePredicate::Or(terms) => terms.iter().any(|t| matches(t, record)),
        NativePredicate::Compare(criterion) => match_criterion(criterion, record),
        NativePredicate::Missing { field, missing } => record.values(field).is_empty() == *missing,
    }
}

fn match_criterion(criterion: &Criterion, record: &NativeRecord) -> bool {
    record
        .values(&criterion.field)
        .iter()
        .filter_map(scalar_text)
        .any(|text| compare(&text, criterion.op, &criterion.value))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn compare(actual: &str, op: Operator, expected: &str) -> bool {
    let numbers = actual.parse::<f64>().ok().zip(expected.parse::<f64>().ok());
    match op {
        Operator::Like => wildcard_match(&expected.to_lowercase(), &actual.to_lowercase()),
        Operator::Approx => match numbers {
            Some((a, e)) => (a - e).abs() <= e.abs() * APPROX_TOLERANCE,
            None => actual.eq_ignore_ascii_case(expected),
        },
        _ => {
            // Dates are ISO-8601 strings, so lexical order is chronological.
            let ordering = match numbers {
                Some((a, e)) => a.partial_cmp(&e),
                None => Some(actual.cmp(expected)),
            };
            let Some(ordering) = ordering else {
                return false;
            };
            match op {
                Operator::Eq => ordering == Ordering::Equal,
                Operator::Ne => ordering != Ordering::Equal,
                Operator::Gt => ordering == Ordering::Greater,
                Operator::Ge => ordering != Ordering::Less,
                Operator::Lt => ordering == Ordering::Less,
                Operator::Le => ordering != Ordering::Greater,
                Operator::Approx | Operator::Like => false,
            }
        }
    }
}

/// `*` matches any run of characters, including none.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let [first, middle @ .., last] = parts.as_slice() else {
        return pattern == text;
    };
    let Some(mut remaining) = text.strip_prefix(first) else {
        return false;
    };
    for part in middle {
        match remaining.find(part) {
            Some(idx) => remaining = &remaining[idx + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last)
}

/// Order records by the sort keys, falling back to the native key.
pub fn sort_records(records: &mut [NativeRecord], sort: &[SortKey]) {
    records.sort_by(|a, b| {
        for key in sort {
            let ordering = compare_field(a, b, &key.field, key.descending);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.key.cmp(&b.key)
    });
}

fn compare_field(a: &NativeRecord, b: &NativeRecord, field: &str, descending: bool) -> Ordering {
    let first = |r: &NativeRecord| r.values(field).iter().find_map(scalar_text);
    match (first(a), first(b)) {
        (Some(x), Some(y)) => {
            let ordering = match (x.parse::<f64>(), y.parse::<f64>()) {
                (Ok(nx), Ok(ny)) => nx.partial_cmp(&ny).unwrap_or(Ordering::Equal),
                _ => x.cmp(&y),
            };
            if descending { ordering.reverse() } else { ordering }
        }
        // Records without a value sort last in either direction.
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(key: &str, fields: Value) -> NativeRecord {
        let Value::Object(map) = fields else {
            unreachable!()
        };
        NativeRecord::new(map).with_key(key)
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("*smith*", "goldsmith jr"));
        assert!(wildcard_match("sm*", "smith"));
        assert!(wildcard_match("*th", "smith"));
        assert!(!wildcard_match("*smyth*", "smith"));
        assert!(wildcard_match("a*b*c", "axxbyyc"));
        assert!(!wildcard_match("a*a", "a"));
    }

    #[test]
    fn test_like_is_case_insensitive() {
        let r = record("1", json!({"name": [{"family": "Smith"}]}));
        let p = NativePredicate::compare("name.family", Operator::Like, "*SMI*");
        assert!(matches(&p, &r));
    }

    #[test]
    fn test_numeric_and_date_comparison() {
        let r = record("1", json!({"value": 10, "birthDate": "2020-01-01"}));
        assert!(matches(&NativePredicate::compare("value", Operator::Gt, "9.5"), &r));
        assert!(matches(&NativePredicate::compare("value", Operator::Approx, "10.5"), &r));
        assert!(!matches(&NativePredicate::compare("value", Operator::Approx, "20"), &r));
        assert!(matches(&NativePredicate::compare("birthDate", Operator::Ge, "2019-12-31"), &r));
        assert!(!matches(&NativePredicate::compare("birthDate", Operator::Lt, "2020-01-01"), &r));
    }

    #[test]
    fn test_missing_and_not_deleted() {
        let mut r = record("1", json!({"deceased": null}));
        assert!(matches(&NativePredicate::missing("deceased", true), &r));
        assert!(!matches(&NativePredicate::missing("deceased", false), &r));
        assert!(matches(&NativePredicate::NotDeleted, &r));
        r.deleted_at = Some(clinbridge_core::now_utc());
        assert!(!matches(&NativePredicate::NotDeleted, &r));
    }

    #[test]
    fn test_key_pseudo_field() {
        let r = record("abc", json!({}));
        assert!(matches(&NativePredicate::eq(clinbridge_storage::KEY_FIELD, "abc"), &r));
    }

    #[test]
    fn test_sort_records() {
        let mut records = vec![
            record("a", json!({"n": 2})),
            record("b", json!({"n": 10})),
            record("c", json!({})),
        ];
        sort_records(&mut records, &[SortKey::descending("n")]);
        let keys: Vec<_> = records.iter().map(|r| r.key.clone().unwrap()).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }
}
