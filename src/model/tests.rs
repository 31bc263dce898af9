//! Tests for the data model

use super::*;
use crate::types::ChangeAction;
use serde_json::json;

// ============================================================================
// Cursor Tests
// ============================================================================

#[test]
fn test_cursor_ordering_within_variant() {
    assert!(Cursor::from(1) < Cursor::from(2));
    assert!(Cursor::from("2024-01-01T00:00:00Z") < Cursor::from("2024-01-02T00:00:00Z"));
}

#[test]
fn test_cursor_integers_before_text() {
    assert!(Cursor::from(i64::MAX) < Cursor::from(""));
    let mut cursors = vec![Cursor::from("b"), Cursor::from(7), Cursor::from("a")];
    cursors.sort();
    assert_eq!(
        cursors,
        vec![Cursor::from(7), Cursor::from("a"), Cursor::from("b")]
    );
}

#[test]
fn test_cursor_from_json() {
    assert_eq!(Cursor::from_json(&json!(42)), Some(Cursor::Integer(42)));
    assert_eq!(Cursor::from_json(&json!("abc")), Some(Cursor::from("abc")));
    assert_eq!(Cursor::from_json(&json!(1.5)), Cursor::from_decimal_str("1.5"));
    assert_eq!(
        Cursor::from_json(&json!(u64::MAX)),
        Cursor::from_decimal_str("18446744073709551615")
    );
    assert_eq!(Cursor::from_json(&json!(null)), None);
    assert_eq!(Cursor::from_json(&json!({"a": 1})), None);
}

#[test]
fn test_cursor_serializes_untagged() {
    assert_eq!(serde_json::to_value(Cursor::from(5)).unwrap(), json!(5));
    assert_eq!(serde_json::to_value(Cursor::from("x")).unwrap(), json!("x"));

    let back: Cursor = serde_json::from_value(json!(5)).unwrap();
    assert_eq!(back, Cursor::Integer(5));
    let back: Cursor = serde_json::from_value(json!("2024-01-01")).unwrap();
    assert_eq!(back, Cursor::from("2024-01-01"));
}

#[test]
fn test_decimal_cursors_order_numerically() {
    let d = |s: &str| Cursor::from_decimal_str(s).unwrap();

    assert!(d("9.5") < d("10.5"));
    assert!(d("10.5") < d("11.25"));
    assert!(d("-1.5") < d("-1.25"));
    assert!(d("-0.5") < d("0.001"));
    assert!(d("0.5") < d("0.51"));
    assert!(d("0.6") > d("0.51"));

    // Integers and decimals share one numeric order
    assert!(Cursor::from(10) < d("10.5"));
    assert!(d("10.5") < Cursor::from(11));
    assert!(Cursor::from(i64::MAX) < d("9223372036854775808"));
    assert!(Cursor::from(i64::MIN) > d("-9223372036854775809"));
    assert!(d("10.5") < Cursor::from("1"));

    let mut cursors = vec![d("10.5"), Cursor::from(10), d("9.75"), Cursor::from(-3)];
    cursors.sort();
    assert_eq!(cursors, vec![Cursor::from(-3), d("9.75"), Cursor::from(10), d("10.5")]);
}

#[test]
fn test_decimal_cursor_canonical_form() {
    assert_eq!(Cursor::from_decimal_str("010.50"), Cursor::from_decimal_str("10.5"));
    assert_eq!(Cursor::from_decimal_str("10.00"), Some(Cursor::Integer(10)));
    assert_eq!(Cursor::from_decimal_str("-0.0"), Some(Cursor::Integer(0)));
    assert_eq!(Cursor::from_decimal_str(".5").unwrap().to_string(), "0.5");
    assert_eq!(Cursor::from_decimal_str("1e5"), None);
    assert_eq!(Cursor::from_decimal_str("abc"), None);
    assert_eq!(Cursor::from_decimal_str("-"), None);

    assert_eq!(Cursor::from_f64(9.5), Cursor::from_decimal_str("9.5"));
    assert_eq!(Cursor::from_f64(1e21).unwrap().to_string(), "1000000000000000000000");
    assert_eq!(Cursor::from_f64(f64::INFINITY), None);
}

#[test]
fn test_decimal_cursor_serialization() {
    let cursor = Cursor::from_decimal_str("10.5").unwrap();
    let value = serde_json::to_value(&cursor).unwrap();
    assert_eq!(value, json!({ "decimal": "10.5" }));
    assert_eq!(cursor.to_json(), value);

    let back: Cursor = serde_json::from_value(value).unwrap();
    assert_eq!(back, cursor);

    // Integral values are stored as integers, never as decimals
    assert!(serde_json::from_value::<Cursor>(json!({ "decimal": "10" })).is_err());
    assert!(serde_json::from_value::<Cursor>(json!({ "decimal": "x" })).is_err());
}

#[test]
fn test_cursor_display() {
    assert_eq!(Cursor::from(12).to_string(), "12");
    assert_eq!(Cursor::from("tok").to_string(), "tok");
}

// ============================================================================
// Batch Tests
// ============================================================================

#[test]
fn test_empty_batch_keeps_cursor() {
    let batch = Batch::empty(Some(Cursor::from(10)));
    assert!(batch.is_empty());
    assert_eq!(batch.next_cursor, Some(Cursor::from(10)));
}

#[test]
fn test_batch_next_cursor_is_last_position() {
    let records = vec![
        Record::new("a", 11, serde_json::Map::new()),
        Record::new("b", 12, serde_json::Map::new()),
    ];
    let batch = Batch::from_records(records, Some(Cursor::from(10)));
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.next_cursor, Some(Cursor::from(12)));

    let batch = Batch::from_records(Vec::new(), None);
    assert_eq!(batch.next_cursor, None);
}

#[test]
fn test_record_with_action() {
    let record = Record::new("a", 1, serde_json::Map::new()).with_action(ChangeAction::Delete);
    assert_eq!(record.action, ChangeAction::Delete);
}

// ============================================================================
// WriteResult Tests
// ============================================================================

#[test]
fn test_write_result_all_written() {
    let records = vec![
        TransformedRecord {
            id: "u1".into(),
            attributes: serde_json::Map::new(),
        },
        TransformedRecord {
            id: "u2".into(),
            attributes: serde_json::Map::new(),
        },
    ];
    let result = WriteResult::all_written(&records);
    assert!(result.is_complete());
    assert!(result.is_written("u1"));
    assert!(result.is_written("u2"));
    assert!(!result.is_written("u3"));
}

#[test]
fn test_write_result_rejection_wins() {
    let mut result = WriteResult {
        written: vec!["u1".into(), "u2".into()],
        rejected: Vec::new(),
    };
    result.reject("u2", "invalid attribute");
    assert!(!result.is_complete());
    assert!(result.is_written("u1"));
    assert!(!result.is_written("u2"));
}
