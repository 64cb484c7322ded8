//! Feature-like records that tracks are built from
//!
//! Anything that exposes a geometry, a stable id and named fields can become part of
//! a track by implementing [`TrackRecord`]. [`Feature`] is a plain implementation
//! for callers that don't have their own record type.

use geo::Geometry;
use std::collections::BTreeMap;
use std::fmt;

/// Value of a named record field
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(untagged)
)]
pub enum FieldValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl FieldValue {
    /// Numeric value, parsing text when it holds a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n).filter(|n| n.is_finite()),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            FieldValue::Bool(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// Attribute bag of a record
pub type Attributes = BTreeMap<String, FieldValue>;

/// The field used to order the points of a track
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SortField {
    /// Record time in seconds since the epoch; makes the track animatable
    Time,
    /// Any numeric (or numeric text) attribute
    Attribute(String),
}

impl SortField {
    #[inline]
    pub fn is_temporal(&self) -> bool {
        matches!(self, SortField::Time)
    }

    pub fn name(&self) -> &str {
        match self {
            SortField::Time => "time",
            SortField::Attribute(name) => name,
        }
    }

    /// Sort value of `record`, if it has a usable one
    pub fn value_of<R: TrackRecord + ?Sized>(&self, record: &R) -> Option<f64> {
        match self {
            SortField::Time => record.time().filter(|t| t.is_finite()),
            SortField::Attribute(name) => record.get(name).and_then(FieldValue::as_number),
        }
    }
}

impl From<&str> for SortField {
    /// `"time"` (any case) selects the temporal field, anything else an attribute
    fn from(name: &str) -> Self {
        if name.eq_ignore_ascii_case("time") {
            SortField::Time
        } else {
            SortField::Attribute(name.to_string())
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Capability of a record to contribute a point to a track
pub trait TrackRecord {
    /// Stable identity of the record
    fn id(&self) -> &str;

    /// Geometry in lon/lat degrees
    fn geometry(&self) -> Option<&Geometry<f64>>;

    /// Altitude in meters, kept apart from the 2D geometry
    fn altitude(&self) -> Option<f64> {
        None
    }

    /// Time in seconds since the epoch
    fn time(&self) -> Option<f64>;

    fn get(&self, field: &str) -> Option<&FieldValue>;

    fn set(&mut self, field: &str, value: FieldValue);

    /// Snapshot of all named fields, stored as track metadata
    fn attributes(&self) -> Attributes;
}

/// A simple owned record
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Feature {
    pub id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub geometry: Option<Geometry<f64>>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub altitude: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub time: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub properties: Attributes,
}

impl Feature {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            geometry: None,
            altitude: None,
            time: None,
            properties: Attributes::new(),
        }
    }

    pub fn with_point(mut self, lon: f64, lat: f64) -> Self {
        self.geometry = Some(Geometry::Point(geo::Point::new(lon, lat)));
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry<f64>) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

impl TrackRecord for Feature {
    fn id(&self) -> &str {
        &self.id
    }

    fn geometry(&self) -> Option<&Geometry<f64>> {
        self.geometry.as_ref()
    }

    fn altitude(&self) -> Option<f64> {
        self.altitude
    }

    fn time(&self) -> Option<f64> {
        self.time
    }

    fn get(&self, field: &str) -> Option<&FieldValue> {
        self.properties.get(field)
    }

    fn set(&mut self, field: &str, value: FieldValue) {
        self.properties.insert(field.to_string(), value);
    }

    fn attributes(&self) -> Attributes {
        self.properties.clone()
    }
}
