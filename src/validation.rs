//! Field and form validation for tire replacement drafts
//!
//! Each form field maps to a closed [`FieldKind`] that carries its own rule.
//! Validation never fails by panicking: every problem ends up as a message in
//! a [`ValidationErrors`] map keyed by [`Field`], and a draft is acceptable
//! only when that map is empty.
use super::request::{
    ReplacementDate, RequestDetails, RequestDraft, UserSection, WearIndicator, WearPattern,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

pub const MAX_PHOTOS: usize = 5;
pub const MAX_COMMENT_LEN: usize = 500;
pub const MAX_VEHICLE_NO_LEN: usize = 8;
pub const MAX_KM_READING: u64 = 9_999_999;

pub const REQUIRED: &str = "This field is required";
pub const EMAIL_REQUIRED: &str = "Email is required";
pub const INVALID_EMAIL: &str = "Invalid email address";
pub const DIGITS_ONLY: &str = "Only numbers are allowed";
pub const INVALID_DATE: &str = "Invalid date";
pub const FUTURE_DATE: &str = "Date cannot be in the future";
pub const PAST_DATE: &str = "Date cannot be in the past";
pub const KM_ORDER: &str = "Previous Km must be less than Present Km";
pub const TOO_MANY_PHOTOS: &str = "Only up to 5 photos allowed";
pub const UNKNOWN_SECTION: &str = "Unknown user section";
pub const VEHICLE_NO_TOO_LONG: &str = "Vehicle number must be 8 characters or fewer";
pub const VEHICLE_NO_CHARSET: &str = "Only letters, numbers and hyphens are allowed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    VehicleNo,
    VehicleType,
    VehicleBrand,
    VehicleModel,
    UserSection,
    ReplacementDate,
    ExistingMake,
    TireSize,
    NoOfTires,
    NoOfTubes,
    CostCenter,
    PresentKm,
    PreviousKm,
    WearIndicator,
    WearPattern,
    OfficerServiceNo,
    Comments,
    Email,
    TirePhotos,
}

/// The rule a field is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    VehicleNo,
    Section,
    Date,
    Email,
    /// Digit-only integer within an inclusive range
    Count { min: u64, max: u64 },
    /// Digit-only code with a bounded number of digits
    Digits { min_len: usize, max_len: usize },
    Choice(&'static [&'static str]),
    FreeText { max_len: usize },
    Photos,
}

/// Temporal rule applied to the replacement date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePolicy {
    #[default]
    Unconstrained,
    NoFuture,
    NoPast,
}

impl Field {
    /// Every text field of the form, in display order.
    pub const FORM: [Field; 18] = [
        Field::VehicleNo,
        Field::VehicleType,
        Field::VehicleBrand,
        Field::VehicleModel,
        Field::UserSection,
        Field::ReplacementDate,
        Field::ExistingMake,
        Field::TireSize,
        Field::NoOfTires,
        Field::NoOfTubes,
        Field::CostCenter,
        Field::PresentKm,
        Field::PreviousKm,
        Field::WearIndicator,
        Field::WearPattern,
        Field::OfficerServiceNo,
        Field::Comments,
        Field::Email,
    ];

    /// Wire name of the field, as used by the stored documents and the UI.
    pub fn name(&self) -> &'static str {
        match self {
            Field::VehicleNo => "vehicleNo",
            Field::VehicleType => "vehicleType",
            Field::VehicleBrand => "vehicleBrand",
            Field::VehicleModel => "vehicleModel",
            Field::UserSection => "userSection",
            Field::ReplacementDate => "replacementDate",
            Field::ExistingMake => "existingMake",
            Field::TireSize => "tireSize",
            Field::NoOfTires => "noOfTires",
            Field::NoOfTubes => "noOfTubes",
            Field::CostCenter => "costCenter",
            Field::PresentKm => "presentKm",
            Field::PreviousKm => "previousKm",
            Field::WearIndicator => "wearIndicator",
            Field::WearPattern => "wearPattern",
            Field::OfficerServiceNo => "officerServiceNo",
            Field::Comments => "comments",
            Field::Email => "email",
            Field::TirePhotos => "tirePhotos",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Field::FORM
            .into_iter()
            .chain(std::iter::once(Field::TirePhotos))
            .find(|field| field.name() == name)
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::VehicleNo => FieldKind::VehicleNo,
            Field::VehicleType
            | Field::VehicleBrand
            | Field::VehicleModel
            | Field::ExistingMake
            | Field::TireSize
            | Field::OfficerServiceNo => FieldKind::Text,
            Field::UserSection => FieldKind::Section,
            Field::ReplacementDate => FieldKind::Date,
            Field::Email => FieldKind::Email,
            Field::NoOfTires => FieldKind::Count { min: 1, max: 50 },
            Field::NoOfTubes => FieldKind::Count { min: 0, max: 50 },
            Field::CostCenter => FieldKind::Digits {
                min_len: 4,
                max_len: 10,
            },
            Field::PresentKm | Field::PreviousKm => FieldKind::Count {
                min: 0,
                max: MAX_KM_READING,
            },
            Field::WearIndicator => FieldKind::Choice(WearIndicator::LABELS),
            Field::WearPattern => FieldKind::Choice(WearPattern::LABELS),
            Field::Comments => FieldKind::FreeText {
                max_len: MAX_COMMENT_LEN,
            },
            Field::TirePhotos => FieldKind::Photos,
        }
    }

    fn is_km(&self) -> bool {
        matches!(self, Field::PresentKm | Field::PreviousKm)
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-field error messages. Empty means the draft passed.
#[derive(thiserror::Error, Debug, Clone, Default, PartialEq, Eq)]
#[error("{} field(s) failed validation", .0.len())]
pub struct ValidationErrors(BTreeMap<Field, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn single(field: Field, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.insert(field, message);
        errors
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }
    pub fn contains(&self, field: Field) -> bool {
        self.0.contains_key(&field)
    }
    pub fn insert(&mut self, field: Field, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }
    pub fn remove(&mut self, field: Field) {
        self.0.remove(&field);
    }
    pub fn merge(&mut self, other: ValidationErrors) {
        self.0.extend(other.0);
    }
    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.0.iter().map(|(field, message)| (*field, message.as_str()))
    }
}

impl FieldKind {
    /// Checks a single value in isolation.
    pub fn check(&self, value: &str, policy: DatePolicy, today: NaiveDate) -> Option<String> {
        let value = value.trim();

        match *self {
            FieldKind::Photos => None,
            FieldKind::Email if value.is_empty() => Some(EMAIL_REQUIRED.into()),
            _ if value.is_empty() => Some(REQUIRED.into()),
            FieldKind::Text => None,
            FieldKind::VehicleNo => check_vehicle_no(value),
            FieldKind::Section => UserSection::parse(value)
                .is_none()
                .then(|| UNKNOWN_SECTION.into()),
            FieldKind::Email => (!is_valid_email(value)).then(|| INVALID_EMAIL.into()),
            FieldKind::Date => check_date(value, policy, today),
            FieldKind::Count { min, max } => {
                if !is_digits(value) {
                    return Some(DIGITS_ONLY.into());
                }
                match value.parse::<u64>() {
                    Ok(n) if (min..=max).contains(&n) => None,
                    _ => Some(format!("Must be between {min} and {max}")),
                }
            }
            FieldKind::Digits { min_len, max_len } => {
                if !is_digits(value) {
                    return Some(DIGITS_ONLY.into());
                }
                (!(min_len..=max_len).contains(&value.len()))
                    .then(|| format!("Must be {min_len} to {max_len} digits"))
            }
            FieldKind::Choice(options) => (!options.contains(&value))
                .then(|| format!("Must be one of: {}", options.join(", "))),
            FieldKind::FreeText { max_len } => (value.chars().count() > max_len)
                .then(|| format!("Must be {max_len} characters or fewer")),
        }
    }
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

fn check_vehicle_no(value: &str) -> Option<String> {
    if value.chars().count() > MAX_VEHICLE_NO_LEN {
        return Some(VEHICLE_NO_TOO_LONG.into());
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Some(VEHICLE_NO_CHARSET.into());
    }
    None
}

/// `local@domain.tld`: one `@`, no whitespace, and a dot inside the domain
/// with at least one character on each side.
pub fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let len = domain.len();
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < len)
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok().or_else(|| {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|date| date.with_timezone(&Utc).date_naive())
    })
}

fn check_date(value: &str, policy: DatePolicy, today: NaiveDate) -> Option<String> {
    let Some(date) = parse_date(value) else {
        return Some(INVALID_DATE.into());
    };
    match policy {
        DatePolicy::Unconstrained => None,
        DatePolicy::NoFuture => (date > today).then(|| FUTURE_DATE.into()),
        DatePolicy::NoPast => (date < today).then(|| PAST_DATE.into()),
    }
}

fn reading(value: &str) -> Option<u64> {
    let value = value.trim();
    is_digits(value).then(|| value.parse().ok()).flatten()
}

/// True when both readings parse and previous is not strictly below present.
pub fn km_conflict(form: &RequestDraft) -> bool {
    match (
        reading(form.value(Field::PreviousKm)),
        reading(form.value(Field::PresentKm)),
    ) {
        (Some(previous), Some(present)) => previous >= present,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FormValidator {
    date_policy: DatePolicy,
    today: NaiveDate,
}

impl Default for FormValidator {
    fn default() -> Self {
        Self::new(DatePolicy::Unconstrained, Utc::now().date_naive())
    }
}

impl FormValidator {
    /// `today` anchors the date policy so a validation pass is repeatable.
    pub fn new(date_policy: DatePolicy, today: NaiveDate) -> Self {
        Self { date_policy, today }
    }

    pub fn date_policy(&self) -> DatePolicy {
        self.date_policy
    }

    /// Checks one field against its own rule, then the km ordering rule for
    /// the two readings.
    pub fn validate_field(&self, field: Field, value: &str, form: &RequestDraft) -> Option<String> {
        if let Some(message) = field.kind().check(value, self.date_policy, self.today) {
            return Some(message);
        }
        if field.is_km() && km_conflict(form) {
            return Some(KM_ORDER.into());
        }
        None
    }

    pub fn validate(&self, form: &RequestDraft) -> ValidationErrors {
        let mut errors = ValidationErrors::new();

        for field in Field::FORM {
            if let Some(message) = self.validate_field(field, form.value(field), form) {
                errors.insert(field, message);
            }
        }
        self.apply_km_rule(&mut errors, form);

        errors
    }

    /// Same as [`FormValidator::validate`], plus the photo count limit.
    pub fn validate_with_photos(&self, form: &RequestDraft, photo_count: usize) -> ValidationErrors {
        let mut errors = self.validate(form);
        if photo_count > MAX_PHOTOS {
            errors.insert(Field::TirePhotos, TOO_MANY_PHOTOS);
        }
        errors
    }

    /// Incremental re-check after a single field changed. Touching either km
    /// reading refreshes both slots.
    pub fn revalidate(&self, errors: &mut ValidationErrors, field: Field, form: &RequestDraft) {
        let touched: &[Field] = if field.is_km() {
            &[Field::PresentKm, Field::PreviousKm]
        } else {
            std::slice::from_ref(&field)
        };

        for &field in touched {
            match self.validate_field(field, form.value(field), form) {
                Some(message) => errors.insert(field, message),
                None => errors.remove(field),
            }
        }
        if field.is_km() {
            self.apply_km_rule(errors, form);
        }
    }

    fn apply_km_rule(&self, errors: &mut ValidationErrors, form: &RequestDraft) {
        if !km_conflict(form) {
            return;
        }
        for field in [Field::PresentKm, Field::PreviousKm] {
            if !errors.contains(field) {
                errors.insert(field, KM_ORDER);
            }
        }
    }

    /// Validates and converts the draft into typed details.
    pub fn finalise(&self, form: &RequestDraft) -> Result<RequestDetails, ValidationErrors> {
        let errors = self.validate(form);
        if !errors.is_empty() {
            return Err(errors);
        }

        let text = |field: Field| form.value(field).trim().to_string();
        let number = |field: Field| {
            form.value(field)
                .trim()
                .parse::<u64>()
                .map_err(|_| ValidationErrors::single(field, DIGITS_ONLY))
        };
        let count = |field: Field| {
            number(field).and_then(|n| {
                u32::try_from(n).map_err(|_| ValidationErrors::single(field, DIGITS_ONLY))
            })
        };

        let user_section = UserSection::parse(form.value(Field::UserSection))
            .ok_or_else(|| ValidationErrors::single(Field::UserSection, UNKNOWN_SECTION))?;
        let replacement_date = parse_date(form.value(Field::ReplacementDate))
            .map(ReplacementDate)
            .ok_or_else(|| ValidationErrors::single(Field::ReplacementDate, INVALID_DATE))?;
        let wear_indicator = WearIndicator::parse(form.value(Field::WearIndicator))
            .ok_or_else(|| ValidationErrors::single(Field::WearIndicator, REQUIRED))?;
        let wear_pattern = WearPattern::parse(form.value(Field::WearPattern))
            .ok_or_else(|| ValidationErrors::single(Field::WearPattern, REQUIRED))?;

        Ok(RequestDetails {
            vehicle_no: text(Field::VehicleNo),
            vehicle_type: text(Field::VehicleType),
            vehicle_brand: text(Field::VehicleBrand),
            vehicle_model: text(Field::VehicleModel),
            user_section,
            replacement_date,
            existing_make: text(Field::ExistingMake),
            tire_size: text(Field::TireSize),
            no_of_tires: count(Field::NoOfTires)?,
            no_of_tubes: count(Field::NoOfTubes)?,
            cost_center: number(Field::CostCenter)?,
            present_km: number(Field::PresentKm)?,
            previous_km: number(Field::PreviousKm)?,
            wear_indicator,
            wear_pattern,
            officer_service_no: text(Field::OfficerServiceNo),
            comments: text(Field::Comments),
            email: text(Field::Email),
        })
    }
}

/// Checks one field with the default rules (no date policy).
pub fn validate_field(field: Field, value: &str, form: &RequestDraft) -> Option<String> {
    FormValidator::default().validate_field(field, value, form)
}

/// Validates a whole draft with the default rules (no date policy).
pub fn validate(form: &RequestDraft) -> ValidationErrors {
    FormValidator::default().validate(form)
}
