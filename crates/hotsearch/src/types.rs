use std::collections::HashMap;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Status code carried by a successful fetch or response body
pub const CODE_OK: u16 = 200;
/// Status code carried by a soft failure or an error response body
pub const CODE_FAILED: u16 = 500;

/// Items per source id
pub type SourceItems = HashMap<String, Vec<NormalizedRecord>>;

/// One ranked entry from a source, in the shape every fetcher produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// 1-based rank in source order
    #[serde(rename = "index")]
    pub position: u32,
    pub title: String,
    pub url: String,
    #[serde(rename = "hotValue", default, skip_serializing_if = "Option::is_none")]
    pub hot_value: Option<String>,
    #[serde(rename = "desc", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NormalizedRecord {
    pub fn new(position: u32, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            position,
            title: title.into(),
            url: url.into(),
            hot_value: None,
            description: None,
        }
    }

    /// Attach a hot value. Blank values are dropped.
    pub fn with_hot_value(mut self, hot_value: impl Into<String>) -> Self {
        let hot_value = hot_value.into();
        if !hot_value.trim().is_empty() {
            self.hot_value = Some(hot_value);
        }
        self
    }

    /// Attach a description. Blank values are dropped.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        if !description.trim().is_empty() {
            self.description = Some(description);
        }
        self
    }
}

/// Result of one fetcher call that reached the upstream.
///
/// `code` is 200 when the upstream yielded rows and 500 for a soft failure
/// (reachable, but the page or schema produced nothing usable).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub code: u16,
    pub message: String,
    pub icon: String,
    pub items: Vec<NormalizedRecord>,
}

impl FetchResult {
    pub fn success(
        message: impl Into<String>,
        icon: impl Into<String>,
        items: Vec<NormalizedRecord>,
    ) -> Self {
        Self {
            code: CODE_OK,
            message: message.into(),
            icon: icon.into(),
            items,
        }
    }

    /// Soft failure: the upstream answered but nothing could be extracted.
    pub fn empty_upstream(reason: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            code: CODE_FAILED,
            message: reason.into(),
            icon: icon.into(),
            items: Vec::new(),
        }
    }

    /// Permissive answer for an id nobody registered.
    pub fn unknown_source(id: &str) -> Self {
        Self {
            code: CODE_OK,
            message: id.to_string(),
            icon: String::new(),
            items: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == CODE_OK
    }
}

/// Classified outcome of a fetcher call.
///
/// Keeps "reachable but empty" apart from "unreachable" for logging and
/// metrics, while both remain no-data outcomes for the aggregator.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success(FetchResult),
    EmptyUpstream { reason: String },
    TransportError(FetchError),
}

impl FetchOutcome {
    pub fn classify(result: Result<FetchResult, FetchError>) -> Self {
        match result {
            Ok(r) if r.is_success() && !r.items.is_empty() => FetchOutcome::Success(r),
            Ok(r) if r.is_success() => FetchOutcome::EmptyUpstream {
                reason: "no items".to_string(),
            },
            Ok(r) => FetchOutcome::EmptyUpstream { reason: r.message },
            Err(e) => FetchOutcome::TransportError(e),
        }
    }

    /// Metric label for this outcome
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Success(_) => "success",
            FetchOutcome::EmptyUpstream { .. } => "empty_upstream",
            FetchOutcome::TransportError(_) => "transport_error",
        }
    }

    /// Same label as `classify(result).label()`, without taking ownership.
    pub fn label_of(result: &Result<FetchResult, FetchError>) -> &'static str {
        match result {
            Ok(r) if r.is_success() && !r.items.is_empty() => "success",
            Ok(_) => "empty_upstream",
            Err(_) => "transport_error",
        }
    }
}

/// Historical partition key: calendar date plus hour of day (0-23).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Partition {
    pub date: NaiveDate,
    pub hour: u8,
}

impl Partition {
    /// Returns `None` when `hour` is outside 0-23.
    pub fn new(date: NaiveDate, hour: u8) -> Option<Self> {
        (hour < 24).then_some(Self { date, hour })
    }

    pub fn at<Tz: TimeZone>(ts: &DateTime<Tz>) -> Self {
        Self {
            date: ts.date_naive(),
            hour: ts.hour() as u8,
        }
    }

    /// Partition for the local wall clock
    pub fn current() -> Self {
        Self::at(&Local::now())
    }

    /// `HH:00` label used by the by-date history views
    pub fn hour_label(hour: u8) -> String {
        format!("{:02}:00", hour)
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:02}:00", self.date.format("%Y-%m-%d"), self.hour)
    }
}

/// One refresh worth of data across all sources that succeeded.
#[derive(Debug, Clone)]
pub struct AggregateSnapshot {
    pub items: SourceItems,
    pub created_at: DateTime<Utc>,
    pub partition: Partition,
}

/// Display metadata for UI enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    #[serde(rename = "routeName")]
    pub route_name: String,
    pub name: String,
    pub icon: String,
}

/// Client-facing body: `{code, message?, icon?, obj}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub obj: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(obj: T) -> Self {
        Self {
            code: CODE_OK,
            message: None,
            icon: None,
            obj,
        }
    }

    pub fn failed(message: impl Into<String>, obj: T) -> Self {
        Self {
            code: CODE_FAILED,
            message: Some(message.into()),
            icon: None,
            obj,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl From<FetchResult> for ApiResponse<Vec<NormalizedRecord>> {
    fn from(result: FetchResult) -> Self {
        Self {
            code: result.code,
            message: Some(result.message),
            icon: (!result.icon.is_empty()).then_some(result.icon),
            obj: result.items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_wire_names() {
        let record = NormalizedRecord::new(1, "title", "https://example.com/1")
            .with_hot_value("12.3万")
            .with_description("a repo");

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "index": 1,
                "title": "title",
                "url": "https://example.com/1",
                "hotValue": "12.3万",
                "desc": "a repo"
            })
        );
    }

    #[test]
    fn test_record_omits_absent_optionals() {
        let record = NormalizedRecord::new(2, "t", "u").with_hot_value("  ");
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("hotValue").is_none());
        assert!(value.get("desc").is_none());

        let back: NormalizedRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_classify_outcomes() {
        let ok = FetchResult::success("a", "", vec![NormalizedRecord::new(1, "x", "u")]);
        assert_eq!(FetchOutcome::classify(Ok(ok)).label(), "success");

        let soft = FetchResult::empty_upstream("layout changed", "");
        match FetchOutcome::classify(Ok(soft)) {
            FetchOutcome::EmptyUpstream { reason } => assert_eq!(reason, "layout changed"),
            other => panic!("expected EmptyUpstream, got {:?}", other),
        }

        let empty = FetchResult::success("a", "", Vec::new());
        assert_eq!(FetchOutcome::classify(Ok(empty)).label(), "empty_upstream");

        let hard = FetchOutcome::classify(Err(FetchError::Parse("eof".into())));
        assert_eq!(hard.label(), "transport_error");
    }

    #[test]
    fn test_unknown_source_is_permissive() {
        let result = FetchResult::unknown_source("zzz");
        assert!(result.is_success());
        assert!(result.items.is_empty());

        let body = serde_json::to_value(ApiResponse::from(result)).unwrap();
        assert_eq!(body, json!({"code": 200, "message": "zzz", "obj": []}));
    }

    #[test]
    fn test_partition_from_timestamp() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 9, 17, 45, 0).unwrap();
        let partition = Partition::at(&ts);
        assert_eq!(partition.date, NaiveDate::from_ymd_opt(2025, 3, 9).unwrap());
        assert_eq!(partition.hour, 17);
        assert_eq!(partition.to_string(), "2025-03-09 17:00");
        assert_eq!(Partition::hour_label(7), "07:00");
    }

    #[test]
    fn test_partition_rejects_bad_hour() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(Partition::new(date, 23).is_some());
        assert!(Partition::new(date, 24).is_none());
    }

    #[test]
    fn test_source_info_route_name() {
        let info = SourceInfo {
            route_name: "zhihu".into(),
            name: "Zhihu".into(),
            icon: "https://static.zhihu.com/static/favicon.ico".into(),
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["routeName"], "zhihu");
    }
}
