//! Core data model for the coaster stats cache.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

pub const CRATE_NAME: &str = "coaster-core";

/// Upstream numeric coaster identifier.
pub type CoasterId = u32;

/// The closed set of statistics this system extracts and serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatName {
    Height,
    Length,
    Speed,
    Inversions,
    Drop,
    Duration,
    VerticalAngle,
    Capacity,
    Cost,
    Year,
    Closed,
    Country,
    Name,
    Park,
}

impl StatName {
    pub const ALL: [StatName; 14] = [
        StatName::Height,
        StatName::Length,
        StatName::Speed,
        StatName::Inversions,
        StatName::Drop,
        StatName::Duration,
        StatName::VerticalAngle,
        StatName::Capacity,
        StatName::Cost,
        StatName::Year,
        StatName::Closed,
        StatName::Country,
        StatName::Name,
        StatName::Park,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StatName::Height => "height",
            StatName::Length => "length",
            StatName::Speed => "speed",
            StatName::Inversions => "inversions",
            StatName::Drop => "drop",
            StatName::Duration => "duration",
            StatName::VerticalAngle => "verticalAngle",
            StatName::Capacity => "capacity",
            StatName::Cost => "cost",
            StatName::Year => "year",
            StatName::Closed => "closed",
            StatName::Country => "country",
            StatName::Name => "name",
            StatName::Park => "park",
        }
    }

    /// Statistics read from the upstream `stats` object and parsed as numbers.
    pub fn is_numeric(self) -> bool {
        !matches!(
            self,
            StatName::Duration | StatName::Country | StatName::Name | StatName::Park
        )
    }

    /// Persisted table file name, e.g. `coaster-height.json`.
    pub fn file_name(self) -> String {
        format!("coaster-{}.json", self.as_str())
    }
}

impl fmt::Display for StatName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatName(pub String);

impl fmt::Display for UnknownStatName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown statistic `{}`", self.0)
    }
}

impl std::error::Error for UnknownStatName {}

impl FromStr for StatName {
    type Err = UnknownStatName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatName::ALL
            .into_iter()
            .find(|stat| stat.as_str() == s)
            .ok_or_else(|| UnknownStatName(s.to_string()))
    }
}

/// A cached statistic value.
///
/// Whole numbers serialize as JSON integers so persisted tables read the way upstream wrote them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StatValue {
    Number(f64),
    Text(String),
    Raw(JsonValue),
}

impl StatValue {
    /// Keeps an upstream value as given, only lifting scalars into typed variants.
    pub fn passthrough(value: JsonValue) -> Self {
        match value {
            JsonValue::String(s) => StatValue::Text(s),
            JsonValue::Number(n) => match n.as_f64() {
                Some(f) => StatValue::Number(f),
                None => StatValue::Raw(JsonValue::Number(n)),
            },
            other => StatValue::Raw(other),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StatValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            StatValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for StatValue {
    fn from(value: f64) -> Self {
        StatValue::Number(value)
    }
}

impl From<i64> for StatValue {
    fn from(value: i64) -> Self {
        StatValue::Number(value as f64)
    }
}

impl From<&str> for StatValue {
    fn from(value: &str) -> Self {
        StatValue::Text(value.to_string())
    }
}

impl fmt::Display for StatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatValue::Number(n) => write!(f, "{n}"),
            StatValue::Text(s) => write!(f, "{s:?}"),
            StatValue::Raw(v) => write!(f, "{v}"),
        }
    }
}

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

impl Serialize for StatValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StatValue::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER => {
                serializer.serialize_i64(*n as i64)
            }
            StatValue::Number(n) => serializer.serialize_f64(*n),
            StatValue::Text(s) => serializer.serialize_str(s),
            StatValue::Raw(v) => v.serialize(serializer),
        }
    }
}

/// One statistic's values, keyed by coaster ID.
pub type StatTable = BTreeMap<CoasterId, StatValue>;

/// Coaster ID to locally stored image file name.
pub type ImageManifest = BTreeMap<CoasterId, String>;

/// Coaster ID to photographer credit, only where upstream supplied one.
pub type PhotographerCredits = BTreeMap<CoasterId, String>;

/// All per-statistic tables of one scrape run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatTables {
    tables: BTreeMap<StatName, StatTable>,
}

impl StatTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stat: StatName, id: CoasterId, value: StatValue) -> Option<StatValue> {
        self.tables.entry(stat).or_default().insert(id, value)
    }

    pub fn replace_table(&mut self, stat: StatName, table: StatTable) {
        if table.is_empty() {
            self.tables.remove(&stat);
        } else {
            self.tables.insert(stat, table);
        }
    }

    /// The table for `stat`, or `None` when nothing was recorded for it.
    pub fn table(&self, stat: StatName) -> Option<&StatTable> {
        self.tables.get(&stat).filter(|t| !t.is_empty())
    }

    pub fn value(&self, stat: StatName, id: CoasterId) -> Option<&StatValue> {
        self.tables.get(&stat)?.get(&id)
    }

    /// Every statistic recorded for one coaster.
    pub fn stats_for(&self, id: CoasterId) -> BTreeMap<StatName, StatValue> {
        self.tables
            .iter()
            .filter_map(|(stat, table)| table.get(&id).map(|v| (*stat, v.clone())))
            .collect()
    }

    /// Union of keys across all tables.
    pub fn known_ids(&self) -> BTreeSet<CoasterId> {
        self.tables
            .values()
            .flat_map(|table| table.keys().copied())
            .collect()
    }

    pub fn non_empty(&self) -> impl Iterator<Item = (StatName, &StatTable)> {
        self.tables
            .iter()
            .filter(|(_, t)| !t.is_empty())
            .map(|(stat, table)| (*stat, table))
    }

    pub fn is_empty(&self) -> bool {
        self.tables.values().all(BTreeMap::is_empty)
    }

    pub fn value_count(&self) -> usize {
        self.tables.values().map(BTreeMap::len).sum()
    }
}

/// Transient coaster record as returned by the upstream API.
///
/// The upstream JSON object is kept as-is, nulls and all, so it can be handed back to callers
/// unchanged. Accessors read the few fields this system cares about and treat any unexpected
/// shape as absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoasterRecord {
    fields: Map<String, JsonValue>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn json_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl CoasterRecord {
    /// The upstream object, for handing back to callers.
    pub fn into_fields(self) -> Map<String, JsonValue> {
        self.fields
    }

    /// Value at a nested key path; `None` as soon as a step is missing or not an object.
    fn lookup(&self, path: &[&str]) -> Option<&JsonValue> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.fields.get(*first)?, |value, key| value.get(*key))
    }

    fn text_at(&self, path: &[&str]) -> Option<&str> {
        self.lookup(path).and_then(JsonValue::as_str)
    }

    /// `name` exactly as upstream sent it.
    pub fn raw_name(&self) -> Option<&str> {
        self.text_at(&["name"])
    }

    /// Park name from `park.name`, or `park` itself when upstream sends a bare string.
    pub fn raw_park_name(&self) -> Option<&str> {
        match self.fields.get("park")? {
            JsonValue::String(name) => Some(name),
            JsonValue::Object(park) => park.get("name").and_then(JsonValue::as_str),
            _ => None,
        }
    }

    pub fn raw_country(&self) -> Option<&str> {
        self.text_at(&["country"])
    }

    pub fn name(&self) -> Option<&str> {
        non_empty(self.raw_name())
    }

    pub fn park_name(&self) -> Option<&str> {
        non_empty(self.raw_park_name())
    }

    pub fn country(&self) -> Option<&str> {
        non_empty(self.raw_country())
    }

    /// The nested stats object, if upstream sent one.
    pub fn stats(&self) -> Option<&Map<String, JsonValue>> {
        self.fields.get("stats").and_then(JsonValue::as_object)
    }

    pub fn picture_url(&self) -> Option<&str> {
        non_empty(self.text_at(&["mainPicture", "url"]))
    }

    pub fn photo_credit(&self) -> Option<&str> {
        non_empty(self.text_at(&["mainPicture", "copyName"]))
            .or_else(|| non_empty(self.text_at(&["mainPicture", "credit"])))
    }

    pub fn opened_date(&self) -> Option<String> {
        self.lookup(&["status", "date", "opened"]).and_then(json_text)
    }

    pub fn closed_date(&self) -> Option<String> {
        self.lookup(&["status", "date", "closed"]).and_then(json_text)
    }
}
