//! Property-based tests for form validation and dashboard sorting
//!
//! Validation must agree with the km ordering rule for every pair of
//! readings, and sorting must be stable so that rows with equal keys never
//! jump around when a dashboard header is clicked.

use std::borrow::Cow;

use chrono::NaiveDate;
use proptest::prelude::*;
use tire_approval::{
    request::RequestDraft,
    sort::{self, SortDirection, SortKey, SortSpec, Sortable},
    validation::{
        DIGITS_ONLY, DatePolicy, Field, FormValidator, KM_ORDER, MAX_COMMENT_LEN, MAX_KM_READING,
        is_valid_email,
    },
};

fn valid_draft() -> RequestDraft {
    RequestDraft::new()
        .set(Field::VehicleNo, "ABC-1234")
        .set(Field::VehicleType, "Truck")
        .set(Field::VehicleBrand, "Isuzu")
        .set(Field::VehicleModel, "NPR")
        .set(Field::UserSection, "Logistics")
        .set(Field::ReplacementDate, "2024-01-15")
        .set(Field::ExistingMake, "Bridgestone")
        .set(Field::TireSize, "195/65R15")
        .set(Field::NoOfTires, "4")
        .set(Field::NoOfTubes, "0")
        .set(Field::CostCenter, "1001")
        .set(Field::PresentKm, "45000")
        .set(Field::PreviousKm, "40000")
        .set(Field::OfficerServiceNo, "SVC-77")
        .set(Field::Comments, "Front tires worn")
        .set(Field::Email, "transport@company.com")
}

fn validator() -> FormValidator {
    FormValidator::new(
        DatePolicy::Unconstrained,
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
    )
}

/// Dashboard row with a single sortable id and its original position.
#[derive(Debug, Clone, PartialEq)]
struct Row {
    id: String,
    position: usize,
}

impl Sortable for Row {
    fn sort_field(&self, key: SortKey) -> Option<Cow<'_, str>> {
        match key {
            SortKey::Id => Some(Cow::Borrowed(self.id.as_str())),
            _ => None,
        }
    }
}

// PROPERTY TEST STRATEGIES

fn reading_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![0u64..=100, 0u64..=MAX_KM_READING]
}

/// Digit strings with at least one non-digit mixed in
fn non_digit_strategy() -> impl Strategy<Value = String> {
    "[0-9]{0,4}[a-zA-Z.,+-][0-9a-z]{0,4}"
}

fn email_strategy() -> impl Strategy<Value = String> {
    (
        "[a-z0-9._%+-]{1,12}",
        "[a-z0-9-]{1,12}",
        "[a-z]{2,6}",
    )
        .prop_map(|(local, domain, tld)| format!("{local}@{domain}.{tld}"))
}

fn rows_strategy() -> impl Strategy<Value = Vec<Row>> {
    prop::collection::vec(
        prop_oneof!["[0-9]{1,2}", Just("mock-1".to_string()), Just(String::new())],
        0..30,
    )
    .prop_map(|ids| {
        ids.into_iter()
            .enumerate()
            .map(|(position, id)| Row { id, position })
            .collect()
    })
}

fn id_value(row: &Row) -> f64 {
    row.id.parse::<f64>().unwrap_or(0.0)
}

// PROPERTY TESTS
proptest! {
    /// Property: the km fields are error free iff previous < present
    #[test]
    fn prop_km_order_matches_validation(
        previous in reading_strategy(),
        present in reading_strategy(),
    ) {
        let form = valid_draft()
            .set(Field::PreviousKm, previous.to_string())
            .set(Field::PresentKm, present.to_string());
        let errors = validator().validate(&form);

        if previous < present {
            prop_assert!(!errors.contains(Field::PreviousKm));
            prop_assert!(!errors.contains(Field::PresentKm));
            prop_assert!(errors.is_empty());
        } else {
            prop_assert_eq!(errors.get(Field::PreviousKm), Some(KM_ORDER));
            prop_assert_eq!(errors.get(Field::PresentKm), Some(KM_ORDER));
        }
    }

    /// Property: revalidating after either reading changes gives the same
    /// answer as a full pass
    #[test]
    fn prop_revalidate_matches_full_pass(
        previous in reading_strategy(),
        present in reading_strategy(),
        touch_present in any::<bool>(),
    ) {
        let validator = validator();
        let form = valid_draft();
        let mut errors = validator.validate(&form);

        let (field, value) = if touch_present {
            (Field::PresentKm, present)
        } else {
            (Field::PreviousKm, previous)
        };
        let form = form.set(field, value.to_string());
        validator.revalidate(&mut errors, field, &form);

        prop_assert_eq!(errors, validator.validate(&form));
    }

    /// Property: numeric fields refuse anything that is not all digits
    #[test]
    fn prop_numeric_fields_reject_non_digits(
        value in non_digit_strategy(),
        field in prop::sample::select(vec![
            Field::NoOfTires,
            Field::NoOfTubes,
            Field::CostCenter,
            Field::PresentKm,
            Field::PreviousKm,
        ]),
    ) {
        let form = valid_draft().set(field, value.clone());
        let errors = validator().validate(&form);

        prop_assert_eq!(errors.get(field), Some(DIGITS_ONLY));
    }

    /// Property: comments up to the limit pass, anything longer is refused
    #[test]
    fn prop_comment_length_bound(
        len in (MAX_COMMENT_LEN - 5)..=(MAX_COMMENT_LEN + 5),
        fill in prop::sample::select(vec!['a', 'Z', '7', '.', 'é']),
    ) {
        let comments: String = std::iter::repeat_n(fill, len).collect();
        let form = valid_draft().set(Field::Comments, comments);
        let errors = validator().validate(&form);

        if len <= MAX_COMMENT_LEN {
            prop_assert!(!errors.contains(Field::Comments));
        } else {
            prop_assert_eq!(
                errors.get(Field::Comments),
                Some("Must be 500 characters or fewer")
            );
        }
    }

    /// Property: well-formed addresses pass, and lose validity without the dot
    #[test]
    fn prop_email_shape(
        email in email_strategy(),
    ) {
        prop_assert!(is_valid_email(&email));

        let (without_tld, _) = email.rsplit_once('.').unwrap();
        prop_assert!(!is_valid_email(without_tld));
    }

    /// Property: sorting keeps rows with equal keys in their original order
    #[test]
    fn prop_sort_is_stable(
        rows in rows_strategy(),
        descending in any::<bool>(),
    ) {
        let spec = SortSpec {
            key: SortKey::Id,
            direction: if descending { SortDirection::Descending } else { SortDirection::Ascending },
        };
        let sorted = sort::sort(&rows, &spec);

        prop_assert_eq!(sorted.len(), rows.len());
        for pair in sorted.windows(2) {
            let (a, b) = (id_value(&pair[0]), id_value(&pair[1]));
            if descending {
                prop_assert!(a >= b);
            } else {
                prop_assert!(a <= b);
            }
            if a == b {
                prop_assert!(pair[0].position < pair[1].position);
            }
        }
    }

    /// Property: clicking the same header twice restores the first order
    #[test]
    fn prop_double_click_restores_order(
        rows in rows_strategy(),
    ) {
        let first = SortSpec::click(None, SortKey::Id);
        let second = SortSpec::click(Some(first), SortKey::Id);
        let third = SortSpec::click(Some(second), SortKey::Id);

        prop_assert_eq!(second.direction, SortDirection::Descending);
        prop_assert_eq!(first.sort(&rows), third.sort(&rows));
    }
}

#[test]
fn equal_ids_keep_their_order_then_flip() {
    let rows = vec![
        Row { id: "2".into(), position: 0 },
        Row { id: "1".into(), position: 1 },
        Row { id: "2".into(), position: 2 },
    ];

    let ascending = SortSpec::click(None, SortKey::Id);
    let positions: Vec<usize> = ascending.sort(&rows).iter().map(|r| r.position).collect();
    assert_eq!(positions, vec![1, 0, 2]);

    let descending = SortSpec::click(Some(ascending), SortKey::Id);
    let positions: Vec<usize> = descending.sort(&rows).iter().map(|r| r.position).collect();
    assert_eq!(positions, vec![0, 2, 1]);
}

#[test]
fn comment_length_boundary() {
    let at_limit = valid_draft().set(Field::Comments, "x".repeat(500));
    assert!(validator().validate(&at_limit).is_empty());

    let comments = "x".repeat(501);
    let over = valid_draft().set(Field::Comments, comments.as_str());
    assert_eq!(
        validator().validate_field(Field::Comments, &comments, &over),
        Some("Must be 500 characters or fewer".to_string())
    );
}

#[test]
fn km_example_readings() {
    let ok = valid_draft()
        .set(Field::PreviousKm, "75000")
        .set(Field::PresentKm, "85000");
    assert!(validator().validate(&ok).is_empty());

    let swapped = valid_draft()
        .set(Field::PreviousKm, "85000")
        .set(Field::PresentKm, "75000");
    let errors = validator().validate(&swapped);
    assert!(errors.contains(Field::PreviousKm));
    assert!(errors.contains(Field::PresentKm));
}
