//! Upstream coaster API adapters + stat extraction.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use coaster_core::{CoasterId, CoasterRecord, StatName, StatValue};
use coaster_storage::{FetchError, HttpClientConfig, HttpFetcher};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "coaster-adapters";

pub const DEFAULT_API_BASE: &str = "https://rcdb-api.vercel.app/api/coasters";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("coaster {id} not found upstream")]
    NotFound { id: CoasterId },
    #[error("upstream returned http status {status} for coaster {id}")]
    Status { id: CoasterId, status: u16 },
    #[error("transport error fetching coaster {id}: {message}")]
    Transport { id: CoasterId, message: String },
    #[error("malformed record for coaster {id}: {message}")]
    Decode { id: CoasterId, message: String },
}

impl UpstreamError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, UpstreamError::NotFound { .. })
    }

    /// Status a caller-facing service should answer with when this fetch fails.
    pub fn http_status(&self) -> u16 {
        match self {
            UpstreamError::NotFound { .. } => 404,
            UpstreamError::Status { status, .. } => *status,
            UpstreamError::Transport { .. } | UpstreamError::Decode { .. } => 502,
        }
    }
}

/// Classify a failed coaster GET: 404 is "no such coaster", any other status is a warning.
pub fn upstream_error(id: CoasterId, err: FetchError) -> UpstreamError {
    match err {
        FetchError::HttpStatus { status: 404, .. } => UpstreamError::NotFound { id },
        FetchError::HttpStatus { status, .. } => UpstreamError::Status { id, status },
        other => UpstreamError::Transport {
            id,
            message: other.to_string(),
        },
    }
}

pub fn decode_record(id: CoasterId, body: &[u8]) -> Result<CoasterRecord, UpstreamError> {
    serde_json::from_slice(body).map_err(|err| UpstreamError::Decode {
        id,
        message: err.to_string(),
    })
}

/// The upstream roller-coaster source of record.
#[async_trait]
pub trait CoasterApi: Send + Sync {
    /// One GET for one coaster.
    async fn fetch_coaster(&self, id: CoasterId) -> Result<CoasterRecord, UpstreamError>;

    /// Raw bytes behind an image URL.
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug)]
pub struct HttpCoasterApi {
    base_url: String,
    http: HttpFetcher,
}

impl HttpCoasterApi {
    pub fn new(base_url: impl Into<String>, config: HttpClientConfig) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: HttpFetcher::new(config)?,
        })
    }

    pub fn coaster_url(&self, id: CoasterId) -> String {
        format!("{}/{id}", self.base_url)
    }
}

#[async_trait]
impl CoasterApi for HttpCoasterApi {
    async fn fetch_coaster(&self, id: CoasterId) -> Result<CoasterRecord, UpstreamError> {
        let url = self.coaster_url(id);
        let resp = self
            .http
            .fetch_bytes(&url)
            .await
            .map_err(|err| upstream_error(id, err))?;
        decode_record(id, &resp.body)
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        Ok(self.http.fetch_bytes(url).await?.body)
    }
}

#[derive(Debug, Clone)]
enum FixtureResponse {
    Record(JsonValue),
    Status(u16),
}

/// Start or end of one `fetch_coaster` call, as seen by the fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureEvent {
    Started(CoasterId),
    Finished(CoasterId),
}

/// In-memory upstream used for offline runs and tests. Unknown IDs answer 404.
///
/// Each coaster fetch yields once to the scheduler while "in flight", so callers that overlap
/// requests show up in `peak_in_flight` and the event log.
#[derive(Debug, Default)]
pub struct FixtureCoasterApi {
    coasters: HashMap<CoasterId, FixtureResponse>,
    images: HashMap<String, Vec<u8>>,
    coaster_calls: AtomicUsize,
    image_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    events: Mutex<Vec<FixtureEvent>>,
}

impl FixtureCoasterApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, id: CoasterId, record: JsonValue) -> Self {
        self.coasters.insert(id, FixtureResponse::Record(record));
        self
    }

    pub fn with_status(mut self, id: CoasterId, status: u16) -> Self {
        self.coasters.insert(id, FixtureResponse::Status(status));
        self
    }

    pub fn with_image(mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.images.insert(url.into(), bytes.into());
        self
    }

    pub fn coaster_calls(&self) -> usize {
        self.coaster_calls.load(Ordering::SeqCst)
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    /// Most coaster fetches ever pending at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<FixtureEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    fn record_event(&self, event: FixtureEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    fn respond(&self, id: CoasterId) -> Result<CoasterRecord, UpstreamError> {
        match self.coasters.get(&id) {
            None => Err(UpstreamError::NotFound { id }),
            Some(FixtureResponse::Status(status)) => Err(upstream_error(
                id,
                FetchError::HttpStatus {
                    status: *status,
                    url: format!("fixture://coasters/{id}"),
                },
            )),
            Some(FixtureResponse::Record(raw)) => {
                serde_json::from_value(raw.clone()).map_err(|err| UpstreamError::Decode {
                    id,
                    message: err.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl CoasterApi for FixtureCoasterApi {
    async fn fetch_coaster(&self, id: CoasterId) -> Result<CoasterRecord, UpstreamError> {
        self.coaster_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        self.record_event(FixtureEvent::Started(id));

        tokio::task::yield_now().await;

        let result = self.respond(id);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.record_event(FixtureEvent::Finished(id));
        result
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.images
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::HttpStatus {
                status: 404,
                url: url.to_string(),
            })
    }
}

/// One value the extractor wants recorded for a coaster.
#[derive(Debug, Clone, PartialEq)]
pub struct StatInsertion {
    pub stat: StatName,
    pub value: StatValue,
}

/// Pull the allow-listed statistics out of a record.
///
/// Array-valued stats (dueling coasters) keep their first element. `year` and `closed` derived
/// from the status dates replace same-named entries from the stats object.
pub fn extract_stats(record: &CoasterRecord) -> Vec<StatInsertion> {
    let mut out = BTreeMap::new();

    if let Some(name) = record.raw_name() {
        out.insert(StatName::Name, StatValue::from(name));
    }
    if let Some(park) = record.raw_park_name() {
        out.insert(StatName::Park, StatValue::from(park));
    }

    for (key, raw) in record.stats().into_iter().flatten() {
        let Ok(stat) = key.parse::<StatName>() else {
            continue;
        };
        if !stat.is_numeric() && stat != StatName::Duration {
            continue;
        }
        let Some(value) = first_value(raw) else {
            continue;
        };
        if stat == StatName::Duration {
            out.insert(stat, StatValue::passthrough(value.clone()));
        } else if let Some(number) = parse_stat_number(value) {
            out.insert(stat, StatValue::Number(number));
        } else {
            debug!(stat = %stat, value = %value, "discarding non-numeric stat");
        }
    }

    if let Some(year) = record.opened_date().as_deref().and_then(parse_year) {
        out.insert(StatName::Year, StatValue::from(year));
    }
    if let Some(closed) = record.closed_date().as_deref().and_then(parse_year) {
        out.insert(StatName::Closed, StatValue::from(closed));
    }

    if let Some(country) = record.raw_country() {
        out.insert(StatName::Country, StatValue::from(country));
    }

    out.into_iter()
        .map(|(stat, value)| StatInsertion { stat, value })
        .collect()
}

/// First element of a sequence, the value itself otherwise; `None` for null or empty.
fn first_value(raw: &JsonValue) -> Option<&JsonValue> {
    let value = match raw {
        JsonValue::Array(items) => items.first()?,
        other => other,
    };
    (!value.is_null()).then_some(value)
}

fn parse_stat_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        JsonValue::String(s) => parse_float_prefix(s),
        _ => None,
    }
}

/// Longest leading decimal literal of `text`, e.g. `"62.5 m"` is `62.5`.
pub fn parse_float_prefix(text: &str) -> Option<f64> {
    let s = text.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }

    let mut digits = 0usize;
    let mut seen_dot = false;
    while let Some(&b) = bytes.get(end) {
        match b {
            b'0'..=b'9' => digits += 1,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while matches!(bytes.get(exp_end), Some(b'0'..=b'9')) {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integer read from the first four characters of a date string.
pub fn parse_year(date: &str) -> Option<i64> {
    let head = date.chars().take(4).collect::<String>();
    let head = head.trim_start();
    let (sign, digits) = match head.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, head.strip_prefix('+').unwrap_or(head)),
    };
    let digits = digits
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>();
    digits.parse::<i64>().ok().map(|v| sign * v)
}
