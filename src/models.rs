use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

pub const SMOKE_LOG_KEY: &str = "smoke_break_tracker_logs";
pub const BOX_LOG_KEY: &str = "smoke_break_tracker_box_opens";

/// Why a stored record was dropped while loading a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotARecord,
    MissingTimestamp,
    NonPositiveTimestamp,
    FutureTimestamp,
    EmptyBrand,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Rejection::NotARecord => "not a record",
            Rejection::MissingTimestamp => "missing or non-numeric timestamp",
            Rejection::NonPositiveTimestamp => "timestamp is not positive",
            Rejection::FutureTimestamp => "timestamp is in the future",
            Rejection::EmptyBrand => "brand is empty",
        };
        f.write_str(reason)
    }
}

pub trait Timestamped {
    fn timestamp(&self) -> i64;
}

/// A record kind that can live in an [`crate::event_log::EventLog`].
pub trait Record: Timestamped + Serialize + Clone + Send + Sync + 'static {
    type Draft;

    fn id(&self) -> &str;

    /// Validates and coerces one stored JSON element.
    fn normalize(raw: &Value, now_ms: i64) -> Result<Self, Rejection>;

    /// Builds a fresh record, or `None` when the draft is unusable.
    fn from_draft(draft: Self::Draft, id: String, timestamp: i64) -> Option<Self>;
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn normalize_brand(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Missing, non-finite or non-positive quantities count as one box.
pub fn coerce_boxes(value: Option<f64>) -> u32 {
    match value {
        Some(boxes) if boxes.is_finite() && boxes > 0.0 => {
            let floored = boxes.floor();
            if floored < 1.0 {
                // quantities below one box still count as one
                1
            } else if floored >= f64::from(u32::MAX) {
                u32::MAX
            } else {
                floored as u32
            }
        }
        _ => 1,
    }
}

fn checked_timestamp(value: Option<&Value>, now_ms: i64) -> Result<i64, Rejection> {
    let floored = value
        .and_then(Value::as_f64)
        .filter(|ts| ts.is_finite())
        .ok_or(Rejection::MissingTimestamp)?
        .floor();
    if floored < 1.0 {
        return Err(Rejection::NonPositiveTimestamp);
    }
    if floored > now_ms as f64 {
        return Err(Rejection::FutureTimestamp);
    }
    Ok(floored as i64)
}

/// Reads a quantity leniently: numbers as-is, numeric strings parsed,
/// anything else treated as absent.
pub fn quantity(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_quantity<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(quantity))
}

fn id_or_fresh(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(new_id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmokeEvent {
    pub id: String,
    pub timestamp: i64,
}

/// Logging a cigarette carries no input beyond "now".
#[derive(Debug, Clone, Copy, Default)]
pub struct SmokeDraft;

impl Timestamped for SmokeEvent {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

impl Record for SmokeEvent {
    type Draft = SmokeDraft;

    fn id(&self) -> &str {
        &self.id
    }

    fn normalize(raw: &Value, now_ms: i64) -> Result<Self, Rejection> {
        match raw {
            // older logs stored bare timestamps
            Value::Number(_) => Ok(Self {
                id: new_id(),
                timestamp: checked_timestamp(Some(raw), now_ms)?,
            }),
            Value::Object(fields) => Ok(Self {
                timestamp: checked_timestamp(fields.get("timestamp"), now_ms)?,
                id: id_or_fresh(fields.get("id")),
            }),
            _ => Err(Rejection::NotARecord),
        }
    }

    fn from_draft(_draft: SmokeDraft, id: String, timestamp: i64) -> Option<Self> {
        Some(Self { id, timestamp })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxOpen {
    pub id: String,
    pub timestamp: i64,
    pub brand: String,
    pub boxes: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoxDraft {
    #[serde(default)]
    pub brand: String,
    #[serde(default, deserialize_with = "lenient_quantity")]
    pub boxes: Option<f64>,
}

impl Timestamped for BoxOpen {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

impl Record for BoxOpen {
    type Draft = BoxDraft;

    fn id(&self) -> &str {
        &self.id
    }

    fn normalize(raw: &Value, now_ms: i64) -> Result<Self, Rejection> {
        let fields = raw.as_object().ok_or(Rejection::NotARecord)?;
        let timestamp = checked_timestamp(fields.get("timestamp"), now_ms)?;
        let brand = normalize_brand(fields.get("brand").and_then(Value::as_str).unwrap_or(""));
        if brand.is_empty() {
            return Err(Rejection::EmptyBrand);
        }

        Ok(Self {
            id: id_or_fresh(fields.get("id")),
            timestamp,
            brand,
            boxes: coerce_boxes(fields.get("boxes").and_then(quantity)),
        })
    }

    fn from_draft(draft: BoxDraft, id: String, timestamp: i64) -> Option<Self> {
        let brand = normalize_brand(&draft.brand);
        if brand.is_empty() {
            return None;
        }
        Some(Self {
            id,
            timestamp,
            brand,
            boxes: coerce_boxes(draft.boxes),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SmokeView {
    pub events: Vec<SmokeEvent>,
    pub today_count: usize,
    pub last_timestamp: Option<i64>,
    /// Time since the assumed end of the last smoke, `HH:MM:SS`.
    pub since_last_finished: String,
    pub assumed_smoking: bool,
    pub persistence_degraded: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BoxEntryView {
    #[serde(flatten)]
    pub entry: BoxOpen,
    pub logged_at: String,
    pub previous_lasted: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BoxView {
    pub selected_brand: Option<String>,
    pub brands: Vec<String>,
    pub recent_brands: Vec<String>,
    pub entries: Vec<BoxEntryView>,
    pub boxes_last_30_days: u64,
    pub since_last_open: Option<String>,
    pub avg_days_per_box: Option<f64>,
    pub total_entries: usize,
    pub persistence_degraded: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct BrandFilter {
    #[serde(default)]
    pub brand: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DailyPoint {
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct WeeklyPoint {
    pub week: String,
    pub start_date: String,
    pub end_date: String,
    pub count: u64,
    pub days_counted: u8,
    pub avg_per_day: f64,
}

#[derive(Debug, Serialize)]
pub struct SmokeStatsResponse {
    pub last_7_days: Vec<DailyPoint>,
    pub weekly: Vec<WeeklyPoint>,
    pub average_interval_ms: Option<f64>,
}
