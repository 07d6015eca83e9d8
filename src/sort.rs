//! Dashboard table sorting
use super::request::TireReplacementRequest;
use chrono::{DateTime, NaiveDate};
use std::borrow::Cow;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    /// Compared as a number. Stored `treq1…` ids do not parse, so they all
    /// compare equal and sorting by this key keeps the current order.
    Id,
    VehicleNo,
    VehicleType,
    VehicleBrand,
    VehicleModel,
    UserSection,
    ReplacementDate,
    CreatedAt,
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
    Email,
    Status,
}

/// How a column's raw value is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKind {
    Identifier,
    Date,
    Number,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: SortDirection,
}

/// Anything a dashboard can show in a sortable table.
pub trait Sortable {
    /// Raw display value for `key`, or `None` when the row has none.
    fn sort_field(&self, key: SortKey) -> Option<Cow<'_, str>>;
}

impl SortKey {
    pub const ALL: [SortKey; 20] = [
        SortKey::Id,
        SortKey::VehicleNo,
        SortKey::VehicleType,
        SortKey::VehicleBrand,
        SortKey::VehicleModel,
        SortKey::UserSection,
        SortKey::ReplacementDate,
        SortKey::CreatedAt,
        SortKey::ExistingMake,
        SortKey::TireSize,
        SortKey::NoOfTires,
        SortKey::NoOfTubes,
        SortKey::CostCenter,
        SortKey::PresentKm,
        SortKey::PreviousKm,
        SortKey::WearIndicator,
        SortKey::WearPattern,
        SortKey::OfficerServiceNo,
        SortKey::Email,
        SortKey::Status,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SortKey::Id => "id",
            SortKey::VehicleNo => "vehicleNo",
            SortKey::VehicleType => "vehicleType",
            SortKey::VehicleBrand => "vehicleBrand",
            SortKey::VehicleModel => "vehicleModel",
            SortKey::UserSection => "userSection",
            SortKey::ReplacementDate => "replacementDate",
            SortKey::CreatedAt => "createdAt",
            SortKey::ExistingMake => "existingMake",
            SortKey::TireSize => "tireSize",
            SortKey::NoOfTires => "noOfTires",
            SortKey::NoOfTubes => "noOfTubes",
            SortKey::CostCenter => "costCenter",
            SortKey::PresentKm => "presentKm",
            SortKey::PreviousKm => "previousKm",
            SortKey::WearIndicator => "wearIndicator",
            SortKey::WearPattern => "wearPattern",
            SortKey::OfficerServiceNo => "officerServiceNo",
            SortKey::Email => "email",
            SortKey::Status => "status",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.name() == name)
    }

    pub fn kind(&self) -> SortKind {
        match self {
            SortKey::Id => SortKind::Identifier,
            SortKey::ReplacementDate | SortKey::CreatedAt => SortKind::Date,
            SortKey::NoOfTires
            | SortKey::NoOfTubes
            | SortKey::CostCenter
            | SortKey::PresentKm
            | SortKey::PreviousKm => SortKind::Number,
            _ => SortKind::Text,
        }
    }
}

impl SortDirection {
    pub fn toggled(&self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

impl SortSpec {
    pub fn ascending(key: SortKey) -> Self {
        Self {
            key,
            direction: SortDirection::Ascending,
        }
    }

    /// Header click: the same key flips direction, a new key starts ascending.
    pub fn click(current: Option<SortSpec>, key: SortKey) -> SortSpec {
        match current {
            Some(spec) if spec.key == key => SortSpec {
                key,
                direction: spec.direction.toggled(),
            },
            _ => SortSpec::ascending(key),
        }
    }

    pub fn sort<T: Sortable + Clone>(&self, list: &[T]) -> Vec<T> {
        sort(list, self)
    }
}

fn identifier(value: Option<&str>) -> f64 {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

fn number(value: Option<&str>) -> f64 {
    identifier(value)
}

/// Milliseconds since the epoch; missing or unparsable values sort as the epoch.
fn timestamp(value: Option<&str>) -> i64 {
    let Some(value) = value.map(str::trim) else {
        return 0;
    };
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return date.timestamp_millis();
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|date| date.and_utc().timestamp_millis())
        .unwrap_or(0)
}

fn folded(value: Option<&str>) -> String {
    value.unwrap_or_default().to_lowercase()
}

fn compare_values(kind: SortKind, a: Option<&str>, b: Option<&str>) -> Ordering {
    match kind {
        SortKind::Identifier => identifier(a).total_cmp(&identifier(b)),
        SortKind::Number => number(a).total_cmp(&number(b)),
        SortKind::Date => timestamp(a).cmp(&timestamp(b)),
        SortKind::Text => folded(a).cmp(&folded(b)),
    }
}

/// Comparator for one column.
pub fn comparator<T: Sortable>(
    key: SortKey,
    direction: SortDirection,
) -> impl Fn(&T, &T) -> Ordering {
    let kind = key.kind();
    move |a: &T, b: &T| {
        let a = a.sort_field(key);
        let b = b.sort_field(key);
        let ordering = compare_values(kind, a.as_deref(), b.as_deref());
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// Sorted copy of `list`. Rows with equal keys keep their relative order.
pub fn sort<T: Sortable + Clone>(list: &[T], spec: &SortSpec) -> Vec<T> {
    let mut sorted = list.to_vec();
    sorted.sort_by(comparator(spec.key, spec.direction));
    sorted
}

impl Sortable for TireReplacementRequest {
    fn sort_field(&self, key: SortKey) -> Option<Cow<'_, str>> {
        let details = &self.details;
        let value = match key {
            SortKey::Id => Cow::Borrowed(self.id.as_str()),
            SortKey::VehicleNo => Cow::Borrowed(details.vehicle_no.as_str()),
            SortKey::VehicleType => Cow::Borrowed(details.vehicle_type.as_str()),
            SortKey::VehicleBrand => Cow::Borrowed(details.vehicle_brand.as_str()),
            SortKey::VehicleModel => Cow::Borrowed(details.vehicle_model.as_str()),
            SortKey::UserSection => Cow::Borrowed(details.user_section.label()),
            SortKey::ReplacementDate => {
                Cow::Owned(details.replacement_date.0.format("%Y-%m-%d").to_string())
            }
            SortKey::CreatedAt => Cow::Owned(self.created_at.to_datetime_utc().to_rfc3339()),
            SortKey::ExistingMake => Cow::Borrowed(details.existing_make.as_str()),
            SortKey::TireSize => Cow::Borrowed(details.tire_size.as_str()),
            SortKey::NoOfTires => Cow::Owned(details.no_of_tires.to_string()),
            SortKey::NoOfTubes => Cow::Owned(details.no_of_tubes.to_string()),
            SortKey::CostCenter => Cow::Owned(details.cost_center.to_string()),
            SortKey::PresentKm => Cow::Owned(details.present_km.to_string()),
            SortKey::PreviousKm => Cow::Owned(details.previous_km.to_string()),
            SortKey::WearIndicator => Cow::Borrowed(details.wear_indicator.label()),
            SortKey::WearPattern => Cow::Borrowed(details.wear_pattern.label()),
            SortKey::OfficerServiceNo => Cow::Borrowed(details.officer_service_no.as_str()),
            SortKey::Email => Cow::Borrowed(details.email.as_str()),
            SortKey::Status => Cow::Borrowed(self.status.as_str()),
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_collapse_non_numeric_to_zero() {
        assert_eq!(identifier(Some("12")), 12.0);
        assert_eq!(identifier(Some("mock-1")), 0.0);
        assert_eq!(identifier(Some("NaN")), 0.0);
        assert_eq!(identifier(None), 0.0);
    }

    #[test]
    fn dates_fall_back_to_epoch() {
        assert_eq!(timestamp(Some("1970-01-01")), 0);
        assert_eq!(timestamp(Some("not a date")), 0);
        assert_eq!(timestamp(None), 0);
        assert!(timestamp(Some("2024-01-15")) < timestamp(Some("2024-02-20")));
        assert!(timestamp(Some("2024-01-15T10:00:00Z")) > timestamp(Some("2024-01-15")));
    }

    #[test]
    fn text_is_case_folded() {
        assert_eq!(
            compare_values(SortKind::Text, Some("nissan"), Some("Nissan")),
            Ordering::Equal
        );
        assert_eq!(
            compare_values(SortKind::Text, Some("Isuzu"), Some("nissan")),
            Ordering::Less
        );
        assert_eq!(compare_values(SortKind::Text, None, Some("a")), Ordering::Less);
    }

    #[test]
    fn click_toggles_then_resets() {
        let first = SortSpec::click(None, SortKey::PresentKm);
        assert_eq!(first, SortSpec::ascending(SortKey::PresentKm));

        let second = SortSpec::click(Some(first), SortKey::PresentKm);
        assert_eq!(second.direction, SortDirection::Descending);

        let third = SortSpec::click(Some(second), SortKey::VehicleNo);
        assert_eq!(third, SortSpec::ascending(SortKey::VehicleNo));
    }

    #[test]
    fn key_names_round_trip() {
        for key in SortKey::ALL {
            assert_eq!(SortKey::from_name(key.name()), Some(key));
        }
    }
}
