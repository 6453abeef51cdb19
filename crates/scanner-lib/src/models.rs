//! Core data models for the waste scanner

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

/// Kind of cloud resource a pipeline scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Volume,
    Instance,
    NatGateway,
    ElasticIp,
    Snapshot,
    Stream,
    Table,
    LogGroup,
    Function,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Volume => "volume",
            ResourceKind::Instance => "instance",
            ResourceKind::NatGateway => "nat-gateway",
            ResourceKind::ElasticIp => "elastic-ip",
            ResourceKind::Snapshot => "snapshot",
            ResourceKind::Stream => "stream",
            ResourceKind::Table => "table",
            ResourceKind::LogGroup => "log-group",
            ResourceKind::Function => "function",
        }
    }

    /// Attribute holding the resource identifier
    pub fn id_attribute(&self) -> &'static str {
        match self {
            ResourceKind::Volume => "VolumeId",
            ResourceKind::Instance => "InstanceId",
            ResourceKind::NatGateway => "NatGatewayId",
            ResourceKind::ElasticIp => "AllocationId",
            ResourceKind::Snapshot => "SnapshotId",
            ResourceKind::Stream => "StreamName",
            ResourceKind::Table => "TableName",
            ResourceKind::LogGroup => "logGroupName",
            ResourceKind::Function => "FunctionName",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key/value tag attached to a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value", default)]
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Opaque, kind-tagged attribute map describing one resource
///
/// Attributes are kept verbatim as returned by the resource source and are
/// never mutated after the fetch step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    kind: ResourceKind,
    attributes: Map<String, Value>,
}

impl ResourceDescriptor {
    pub fn new(kind: ResourceKind, attributes: Map<String, Value>) -> Self {
        Self { kind, attributes }
    }

    /// Build a descriptor from a JSON value; returns `None` unless it is an object
    pub fn from_value(kind: ResourceKind, value: Value) -> Option<Self> {
        match value {
            Value::Object(attributes) => Some(Self::new(kind, attributes)),
            _ => None,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Resource identifier, `<unknown>` when the id attribute is missing
    pub fn id(&self) -> String {
        let attr = self.kind.id_attribute();
        match self.attributes.get(attr) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ if self.kind == ResourceKind::ElasticIp => {
                self.str_attr("PublicIp").unwrap_or("<unknown>").to_string()
            }
            _ => "<unknown>".to_string(),
        }
    }

    /// Look up an attribute by dotted path (`Placement.AvailabilityZone`,
    /// `Attachments.0.InstanceId`)
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.attributes.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn str_attr(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn f64_attr(&self, path: &str) -> Option<f64> {
        match self.get(path)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn u64_attr(&self, path: &str) -> Option<u64> {
        match self.get(path)? {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Timestamp attribute, either an RFC 3339 string or epoch seconds
    pub fn time_attr(&self, path: &str) -> Option<DateTime<Utc>> {
        match self.get(path)? {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Value::Number(n) => {
                let secs = n.as_f64()?;
                Utc.timestamp_opt(secs.trunc() as i64, 0).single()
            }
            _ => None,
        }
    }

    /// True when the attribute exists and is a non-empty array
    pub fn has_items(&self, path: &str) -> bool {
        self.get(path)
            .and_then(Value::as_array)
            .map(|items| !items.is_empty())
            .unwrap_or(false)
    }

    /// Tags in the `[{Key, Value}]` layout
    pub fn tags(&self) -> Vec<Tag> {
        self.get("Tags")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn tag_value(&self, key: &str) -> Option<String> {
        self.tags().into_iter().find(|t| t.key == key).map(|t| t.value)
    }

    /// Value of the `Name` tag, empty when absent
    pub fn name_tag(&self) -> String {
        self.tag_value("Name").unwrap_or_default()
    }
}

/// Aggregation statistic requested from the metric source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Statistic {
    Sum,
    Average,
    Maximum,
}

/// Metric dimension (name/value pair)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One metric query over a time range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricWindow {
    pub namespace: String,
    pub metric_name: String,
    /// Dimension identifying the resource
    pub dimension: Dimension,
    pub sub_dimension: Option<Dimension>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period_secs: u32,
    pub statistic: Statistic,
}

impl MetricWindow {
    pub fn new(
        namespace: impl Into<String>,
        metric_name: impl Into<String>,
        dimension: Dimension,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            metric_name: metric_name.into(),
            dimension,
            sub_dimension: None,
            start,
            end,
            period_secs: 86_400,
            statistic: Statistic::Sum,
        }
    }

    pub fn with_sub_dimension(mut self, sub_dimension: Option<Dimension>) -> Self {
        self.sub_dimension = sub_dimension;
        self
    }

    pub fn with_period(mut self, period_secs: u32) -> Self {
        self.period_secs = period_secs;
        self
    }

    pub fn with_statistic(mut self, statistic: Statistic) -> Self {
        self.statistic = statistic;
        self
    }
}

/// A single metric datapoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Ordered samples returned for one metric window
///
/// An empty series is valid and means no recorded activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub samples: Vec<Sample>,
}

impl MetricSeries {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.value)
    }

    /// Largest sample, 0.0 for an empty series
    pub fn max(&self) -> f64 {
        self.values().reduce(f64::max).unwrap_or(0.0)
    }

    pub fn sum(&self) -> f64 {
        self.values().sum()
    }

    /// Arithmetic mean, 0.0 for an empty series
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.sum() / self.samples.len() as f64
    }
}

/// A typed report cell
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Text(String),
    Integer(i64),
    /// Already rounded to its report precision
    Decimal(f64),
    Timestamp(DateTime<Utc>),
    /// USD amount; `None` renders as `unresolved`
    Usd(Option<f64>),
}

/// Label used for costs that could not be resolved
pub const UNRESOLVED: &str = "unresolved";

impl Field {
    pub fn text(value: impl Into<String>) -> Self {
        Field::Text(value.into())
    }

    /// Decimal rounded to `places` fractional digits
    pub fn decimal(value: f64, places: u32) -> Self {
        Field::Decimal(round_to(value, places))
    }

    pub fn usd(value: Option<f64>, places: u32) -> Self {
        Field::Usd(value.map(|v| round_to(v, places)))
    }

    /// Timestamp, or an empty text cell when unknown
    pub fn timestamp(value: Option<DateTime<Utc>>) -> Self {
        value.map(Field::Timestamp).unwrap_or_else(|| Field::text(""))
    }

    /// Display form used by table and text sinks
    pub fn render(&self) -> String {
        match self {
            Field::Text(s) => s.clone(),
            Field::Integer(i) => i.to_string(),
            Field::Decimal(d) => d.to_string(),
            Field::Timestamp(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
            Field::Usd(Some(v)) => v.to_string(),
            Field::Usd(None) => UNRESOLVED.to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Field::Text(s) => Value::String(s.clone()),
            Field::Integer(i) => Value::from(*i),
            Field::Decimal(d) | Field::Usd(Some(d)) => {
                serde_json::Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null)
            }
            Field::Timestamp(_) | Field::Usd(None) => Value::String(self.render()),
        }
    }

    fn numeric(&self) -> Option<f64> {
        match self {
            Field::Integer(i) => Some(*i as f64),
            Field::Decimal(d) | Field::Usd(Some(d)) => Some(*d),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Field::Usd(None) => 0,
            Field::Integer(_) | Field::Decimal(_) | Field::Usd(Some(_)) => 1,
            Field::Timestamp(_) => 2,
            Field::Text(_) => 3,
        }
    }

    /// Total ordering used when sorting report rows
    ///
    /// Unresolved costs order below every resolved amount.
    pub fn sort_cmp(&self, other: &Field) -> Ordering {
        match (self, other) {
            (Field::Text(a), Field::Text(b)) => a.cmp(b),
            (Field::Timestamp(a), Field::Timestamp(b)) => a.cmp(b),
            _ => match (self.numeric(), other.numeric()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.rank().cmp(&other.rank()),
            },
        }
    }
}

/// Round half away from zero to a fixed number of decimal places
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

/// One report row; arity and order are fixed per pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Row(pub Vec<Field>);

impl Row {
    pub fn new(fields: Vec<Field>) -> Self {
        Self(fields)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Field> {
        self.0.get(index)
    }

    pub fn fields(&self) -> &[Field] {
        &self.0
    }
}

/// Outcome of evaluating a single resource
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Resource qualifies and contributes a complete row
    Included(Row),
    /// Resource does not qualify
    Excluded { reason: String },
}

impl Evaluation {
    pub fn include(fields: Vec<Field>) -> Self {
        Evaluation::Included(Row::new(fields))
    }

    pub fn exclude(reason: impl Into<String>) -> Self {
        Evaluation::Excluded {
            reason: reason.into(),
        }
    }

    pub fn is_included(&self) -> bool {
        matches!(self, Evaluation::Included(_))
    }
}

/// Sort direction for report rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Report column and direction rows are ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub column: &'static str,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn ascending(column: &'static str) -> Self {
        Self {
            column,
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(column: &'static str) -> Self {
        Self {
            column,
            direction: SortDirection::Descending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn volume() -> ResourceDescriptor {
        ResourceDescriptor::from_value(
            ResourceKind::Volume,
            json!({
                "VolumeId": "vol-1",
                "Size": 100,
                "CreateTime": "2024-01-01T00:00:00Z",
                "Attachments": [{"InstanceId": "i-1"}],
                "Placement": {"AvailabilityZone": "us-east-1a"},
                "Tags": [{"Key": "Name", "Value": "data"}, {"Key": "team", "Value": "ops"}]
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_descriptor_paths() {
        let v = volume();
        assert_eq!(v.id(), "vol-1");
        assert_eq!(v.u64_attr("Size"), Some(100));
        assert_eq!(v.str_attr("Attachments.0.InstanceId"), Some("i-1"));
        assert_eq!(v.str_attr("Placement.AvailabilityZone"), Some("us-east-1a"));
        assert!(v.get("Placement.Missing").is_none());
        assert!(v.has_items("Attachments"));
        assert!(v.time_attr("CreateTime").is_some());
    }

    #[test]
    fn test_descriptor_tags() {
        let v = volume();
        assert_eq!(v.tags().len(), 2);
        assert_eq!(v.name_tag(), "data");
        assert_eq!(v.tag_value("team").as_deref(), Some("ops"));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(ResourceDescriptor::from_value(ResourceKind::Volume, json!([1, 2])).is_none());
    }

    #[test]
    fn test_series_empty_is_zero() {
        let series = MetricSeries::empty();
        assert_eq!(series.max(), 0.0);
        assert_eq!(series.mean(), 0.0);
        assert_eq!(series.sum(), 0.0);
    }

    #[test]
    fn test_decimal_rounding() {
        assert_eq!(Field::decimal(1.23456, 2), Field::Decimal(1.23));
        assert_eq!(Field::decimal(1.23456, 4), Field::Decimal(1.2346));
        assert_eq!(Field::usd(None, 4).render(), UNRESOLVED);
    }

    #[test]
    fn test_sort_cmp_unresolved_lowest() {
        let unresolved = Field::Usd(None);
        let free = Field::Usd(Some(0.0));
        assert_eq!(unresolved.sort_cmp(&free), Ordering::Less);
        assert_eq!(Field::Integer(3).sort_cmp(&Field::Decimal(2.5)), Ordering::Greater);
        assert_eq!(Field::text("a").sort_cmp(&Field::text("b")), Ordering::Less);
    }
}
