//! Property tests for the kit's determinism guarantees.

use proptest::prelude::*;
use rust_decimal::Decimal;

use cmspipe_kit::frame::Frame;
use cmspipe_kit::hash::row_content_hash;
use cmspipe_kit::normalize::normalize_string_value;
use cmspipe_schema::{ColumnSpec, SchemaContract};
use cmspipe_types::{RoundingMode, Value};

fn contract() -> SchemaContract {
    SchemaContract {
        dataset: "prop".into(),
        major: 1,
        minor: 0,
        description: String::new(),
        source: String::new(),
        classification: "public".into(),
        license: "public-domain".into(),
        attribution_required: false,
        columns: vec![
            ColumnSpec::string("name", ""),
            ColumnSpec::decimal("amount", "", 4),
        ],
        natural_keys: vec!["name".into()],
        column_order: vec!["name".into(), "amount".into()],
    }
}

proptest! {
    #[test]
    fn hash_is_always_64_lowercase_hex(name in "[ -~]{0,40}", cents in -1_000_000i64..1_000_000) {
        let contract = contract();
        let mut frame = Frame::new(contract.column_order.clone());
        let amount = Decimal::new(cents, 4);
        frame
            .push_row(vec![
                Value::Str(normalize_string_value(&name)),
                Value::Dec(amount),
            ])
            .unwrap();
        let hash = row_content_hash(&frame.rows()[0], &frame, &contract);
        prop_assert_eq!(hash.len(), 64);
        prop_assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn hashing_twice_is_identical(name in "[a-z]{1,20}", cents in 0i64..10_000_000) {
        let contract = contract();
        let build = || {
            let mut frame = Frame::new(contract.column_order.clone());
            frame
                .push_row(vec![
                    Value::Str(name.clone()),
                    Value::Dec(Decimal::new(cents, 4)),
                ])
                .unwrap();
            frame
        };
        let a = build();
        let b = build();
        prop_assert_eq!(
            row_content_hash(&a.rows()[0], &a, &contract),
            row_content_hash(&b.rows()[0], &b, &contract)
        );
    }

    #[test]
    fn rendering_at_precision_is_idempotent(cents in -10_000_000i64..10_000_000) {
        // Canonicalize once, re-parse, canonicalize again: the
        // rendered form must be a fixed point.
        let value = Value::Dec(Decimal::new(cents, 4));
        let first = value.canonical_render(Some(4), RoundingMode::HalfUp);
        let reparsed: Decimal = first.parse().unwrap();
        let second = Value::Dec(reparsed).canonical_render(Some(4), RoundingMode::HalfUp);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn normalized_values_never_contain_the_separator(raw in "\\PC{0,60}") {
        let normalized = normalize_string_value(&raw);
        let separator = '\u{1f}';
        prop_assert!(!normalized.contains(separator));
        prop_assert!(!normalized.starts_with(' '));
        prop_assert!(!normalized.ends_with(' '));
    }
}
