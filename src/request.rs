//! Tire replacement request: raw form draft, validated details and the stored aggregate
use super::approval::{ApprovalStatus, StatusChange};
use super::photo::PhotoReference;
use super::validation::Field;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UserSection {
    #[n(0)]
    Transport,
    #[n(1)]
    Logistics,
    #[n(2)]
    Delivery,
    #[n(3)]
    Admin,
    #[n(4)]
    Engineering,
    #[n(5)]
    Maintenance,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WearIndicator {
    #[n(0)]
    Yes,
    #[n(1)]
    No,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WearPattern {
    #[n(0)]
    OneEdge,
    #[n(1)]
    Center,
    #[n(2)]
    BothEdges,
}

impl UserSection {
    pub const ALL: [UserSection; 6] = [
        UserSection::Transport,
        UserSection::Logistics,
        UserSection::Delivery,
        UserSection::Admin,
        UserSection::Engineering,
        UserSection::Maintenance,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            UserSection::Transport => "Transport",
            UserSection::Logistics => "Logistics",
            UserSection::Delivery => "Delivery",
            UserSection::Admin => "Admin",
            UserSection::Engineering => "Engineering",
            UserSection::Maintenance => "Maintenance",
        }
    }

    /// Accepts the bare label or the "<label> Department" form, ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let lowered = value.to_ascii_lowercase();
        let name = lowered
            .strip_suffix(" department")
            .unwrap_or(&lowered)
            .trim_end();

        Self::ALL
            .into_iter()
            .find(|section| section.label().eq_ignore_ascii_case(name))
    }
}

impl WearIndicator {
    pub const LABELS: &'static [&'static str] = &["Yes", "No"];

    pub fn label(&self) -> &'static str {
        match self {
            WearIndicator::Yes => "Yes",
            WearIndicator::No => "No",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Yes" => Some(WearIndicator::Yes),
            "No" => Some(WearIndicator::No),
            _ => None,
        }
    }
}

impl WearPattern {
    pub const LABELS: &'static [&'static str] = &["One Edge", "Center", "Both Edges"];

    pub fn label(&self) -> &'static str {
        match self {
            WearPattern::OneEdge => "One Edge",
            WearPattern::Center => "Center",
            WearPattern::BothEdges => "Both Edges",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "One Edge" => Some(WearPattern::OneEdge),
            "Center" => Some(WearPattern::Center),
            "Both Edges" => Some(WearPattern::BothEdges),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Calendar date of the last tire replacement. Stored as days from the common era.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplacementDate(pub NaiveDate);

impl<C> minicbor::Encode<C> for ReplacementDate {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        use chrono::Datelike;

        e.i32(self.0.num_days_from_ce())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for ReplacementDate {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let days = d.i32()?;

        NaiveDate::from_num_days_from_ce_opt(days)
            .map(ReplacementDate)
            .ok_or(minicbor::decode::Error::message(
                "failed to convert day count to a calendar date",
            ))
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(#[n(0)] String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw form input, one string per field, exactly as typed by the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDraft {
    pub vehicle_no: String,
    pub vehicle_type: String,
    pub vehicle_brand: String,
    pub vehicle_model: String,
    pub user_section: String,
    pub replacement_date: String,
    pub existing_make: String,
    pub tire_size: String,
    pub no_of_tires: String,
    pub no_of_tubes: String,
    pub cost_center: String,
    pub present_km: String,
    pub previous_km: String,
    pub wear_indicator: String,
    pub wear_pattern: String,
    pub officer_service_no: String,
    pub comments: String,
    pub email: String,
}

impl Default for RequestDraft {
    fn default() -> Self {
        Self {
            vehicle_no: String::new(),
            vehicle_type: String::new(),
            vehicle_brand: String::new(),
            vehicle_model: String::new(),
            user_section: String::new(),
            replacement_date: String::new(),
            existing_make: String::new(),
            tire_size: String::new(),
            no_of_tires: String::new(),
            no_of_tubes: String::new(),
            cost_center: String::new(),
            present_km: String::new(),
            previous_km: String::new(),
            wear_indicator: WearIndicator::No.label().to_string(),
            wear_pattern: WearPattern::OneEdge.label().to_string(),
            officer_service_no: String::new(),
            comments: String::new(),
            email: String::new(),
        }
    }
}

impl RequestDraft {
    /// Empty form with the select boxes at their defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, field: Field) -> &str {
        match field {
            Field::VehicleNo => &self.vehicle_no,
            Field::VehicleType => &self.vehicle_type,
            Field::VehicleBrand => &self.vehicle_brand,
            Field::VehicleModel => &self.vehicle_model,
            Field::UserSection => &self.user_section,
            Field::ReplacementDate => &self.replacement_date,
            Field::ExistingMake => &self.existing_make,
            Field::TireSize => &self.tire_size,
            Field::NoOfTires => &self.no_of_tires,
            Field::NoOfTubes => &self.no_of_tubes,
            Field::CostCenter => &self.cost_center,
            Field::PresentKm => &self.present_km,
            Field::PreviousKm => &self.previous_km,
            Field::WearIndicator => &self.wear_indicator,
            Field::WearPattern => &self.wear_pattern,
            Field::OfficerServiceNo => &self.officer_service_no,
            Field::Comments => &self.comments,
            Field::Email => &self.email,
            Field::TirePhotos => "",
        }
    }

    fn slot(&mut self, field: Field) -> Option<&mut String> {
        let slot = match field {
            Field::VehicleNo => &mut self.vehicle_no,
            Field::VehicleType => &mut self.vehicle_type,
            Field::VehicleBrand => &mut self.vehicle_brand,
            Field::VehicleModel => &mut self.vehicle_model,
            Field::UserSection => &mut self.user_section,
            Field::ReplacementDate => &mut self.replacement_date,
            Field::ExistingMake => &mut self.existing_make,
            Field::TireSize => &mut self.tire_size,
            Field::NoOfTires => &mut self.no_of_tires,
            Field::NoOfTubes => &mut self.no_of_tubes,
            Field::CostCenter => &mut self.cost_center,
            Field::PresentKm => &mut self.present_km,
            Field::PreviousKm => &mut self.previous_km,
            Field::WearIndicator => &mut self.wear_indicator,
            Field::WearPattern => &mut self.wear_pattern,
            Field::OfficerServiceNo => &mut self.officer_service_no,
            Field::Comments => &mut self.comments,
            Field::Email => &mut self.email,
            Field::TirePhotos => return None,
        };
        Some(slot)
    }

    /// Builder-style setter. Photos are not a text field and are ignored here.
    pub fn set(mut self, field: Field, value: impl Into<String>) -> Self {
        self.set_value(field, value);
        self
    }

    pub fn set_value(&mut self, field: Field, value: impl Into<String>) {
        if let Some(slot) = self.slot(field) {
            *slot = value.into();
        }
    }

    /// Pre-fills the form from a stored request for editing.
    pub fn from_details(details: &RequestDetails) -> Self {
        Self {
            vehicle_no: details.vehicle_no.clone(),
            vehicle_type: details.vehicle_type.clone(),
            vehicle_brand: details.vehicle_brand.clone(),
            vehicle_model: details.vehicle_model.clone(),
            user_section: details.user_section.label().to_string(),
            replacement_date: details.replacement_date.0.format("%Y-%m-%d").to_string(),
            existing_make: details.existing_make.clone(),
            tire_size: details.tire_size.clone(),
            no_of_tires: details.no_of_tires.to_string(),
            no_of_tubes: details.no_of_tubes.to_string(),
            cost_center: details.cost_center.to_string(),
            present_km: details.present_km.to_string(),
            previous_km: details.previous_km.to_string(),
            wear_indicator: details.wear_indicator.label().to_string(),
            wear_pattern: details.wear_pattern.label().to_string(),
            officer_service_no: details.officer_service_no.clone(),
            comments: details.comments.clone(),
            email: details.email.clone(),
        }
    }
}

/// Typed request fields, only obtainable through a successful validation pass.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct RequestDetails {
    #[n(0)]
    pub vehicle_no: String,
    #[n(1)]
    pub vehicle_type: String,
    #[n(2)]
    pub vehicle_brand: String,
    #[n(3)]
    pub vehicle_model: String,
    #[n(4)]
    pub user_section: UserSection,
    #[n(5)]
    pub replacement_date: ReplacementDate,
    #[n(6)]
    pub existing_make: String,
    #[n(7)]
    pub tire_size: String,
    #[n(8)]
    pub no_of_tires: u32,
    #[n(9)]
    pub no_of_tubes: u32,
    #[n(10)]
    pub cost_center: u64,
    #[n(11)]
    pub present_km: u64,
    #[n(12)]
    pub previous_km: u64,
    #[n(13)]
    pub wear_indicator: WearIndicator,
    #[n(14)]
    pub wear_pattern: WearPattern,
    #[n(15)]
    pub officer_service_no: String,
    #[n(16)]
    pub comments: String,
    #[n(17)]
    pub email: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct TireReplacementRequest {
    #[n(0)]
    pub id: RequestId,
    #[n(1)]
    pub details: RequestDetails,
    #[n(2)]
    pub photos: Vec<PhotoReference>,
    #[n(3)]
    pub status: ApprovalStatus,
    #[n(4)]
    pub reject_reason: Option<String>,
    #[n(5)]
    pub history: Vec<StatusChange>,
    #[n(6)]
    pub created_at: TimeStamp<Utc>,
}

impl TireReplacementRequest {
    /// A freshly stored request always starts out pending with no history.
    pub fn new(id: RequestId, details: RequestDetails, photos: Vec<PhotoReference>) -> Self {
        Self {
            id,
            details,
            photos,
            status: ApprovalStatus::Pending,
            reject_reason: None,
            history: vec![],
            created_at: TimeStamp::new(),
        }
    }

    /// Records a change produced by the state machine. The reject reason is
    /// written once, when the request enters a rejected state.
    pub fn record(&mut self, change: StatusChange) {
        self.status = change.to;
        if change.to.is_rejected() && self.reject_reason.is_none() {
            self.reject_reason = change.reason.clone();
        }
        self.history.push(change);
    }
}
