//! Response bodies shared by the REST routes and WebSocket replies.
//!
//! Every builder yields a `Reply`: an HTTP status plus a body in the
//! client-facing `{code, message?, icon?, obj}` shape. REST handlers send it
//! as-is; the WebSocket layer puts the body in `data` and the message of a
//! non-2xx reply in `error`.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use hotsearch::types::CODE_FAILED;
use hotsearch::{ApiResponse, NormalizedRecord, Partition};
use hotsearch_engine::CacheService;

pub struct Reply {
    pub status: StatusCode,
    pub body: ApiResponse<Value>,
}

impl Reply {
    fn ok<T: Serialize>(body: ApiResponse<T>) -> Self {
        Self {
            status: StatusCode::OK,
            body: ApiResponse {
                code: body.code,
                message: body.message,
                icon: body.icon,
                obj: to_value(body.obj),
            },
        }
    }

    /// Failure body: code 500, the message, and an empty list.
    pub fn failed(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiResponse::failed(message, Value::Array(Vec::new())),
        }
    }

    /// The message of a non-2xx reply.
    pub fn error(&self) -> Option<String> {
        if self.status.is_success() {
            None
        } else {
            Some(self.body.message.clone().unwrap_or_default())
        }
    }

    pub fn into_data(self) -> Value {
        to_value(self.body)
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn to_value<T: Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        error!(error = %e, "failed to encode response body");
        Value::Null
    })
}

/// Source metadata for UI enumeration.
pub fn source_list(service: &CacheService) -> Reply {
    let sources = service.list_sources();
    let message = format!("{} sources available", sources.len());
    Reply::ok(ApiResponse::ok(sources).with_message(message))
}

/// Bare list of source ids.
pub fn source_ids(service: &CacheService) -> Reply {
    Reply::ok(ApiResponse::ok(service.list_ids()).with_message("sources"))
}

pub async fn all_sources(service: &CacheService) -> Reply {
    // Sorted keys keep the body stable between calls
    let items: BTreeMap<String, Vec<NormalizedRecord>> =
        service.get_all().await.into_iter().collect();
    Reply::ok(ApiResponse::ok(items))
}

/// Current list for one source. A hard fetch failure is a 502.
pub async fn source(service: &CacheService, id: &str) -> Reply {
    match service.get_source(id).await {
        Ok(result) => Reply::ok(ApiResponse::from(result)),
        Err(e) => Reply::failed(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, Reply> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        Reply::failed(
            StatusCode::BAD_REQUEST,
            format!("invalid date {:?}, expected YYYY-MM-DD", raw),
        )
    })
}

fn parse_partition(date: &str, hour: &str) -> Result<Partition, Reply> {
    let date = parse_date(date)?;
    hour.parse::<u8>()
        .ok()
        .and_then(|h| Partition::new(date, h))
        .ok_or_else(|| {
            Reply::failed(
                StatusCode::BAD_REQUEST,
                format!("invalid hour {:?}, expected 0-23", hour),
            )
        })
}

pub async fn history_at(service: &CacheService, id: &str, date: &str, hour: &str) -> Reply {
    let partition = match parse_partition(date, hour) {
        Ok(p) => p,
        Err(reply) => return reply,
    };
    match service.history_by_partition(id, partition).await {
        Ok(items) if items.is_empty() => Reply::failed(
            StatusCode::NOT_FOUND,
            format!("no history for {} at {}", id, partition),
        ),
        Ok(items) => Reply::ok(ApiResponse::ok(items).with_message(format!("{} history", id))),
        Err(e) => store_failure(id, e),
    }
}

pub async fn history_on(service: &CacheService, id: &str, date: &str) -> Reply {
    let date = match parse_date(date) {
        Ok(d) => d,
        Err(reply) => return reply,
    };
    match service.history_by_date(id, date).await {
        Ok(hours) => {
            let obj: BTreeMap<String, Vec<NormalizedRecord>> = hours
                .into_iter()
                .map(|(hour, items)| (Partition::hour_label(hour), items))
                .collect();
            Reply::ok(ApiResponse::ok(obj).with_message(format!("{} history", id)))
        }
        Err(e) => store_failure(id, e),
    }
}

pub async fn history_all(service: &CacheService, id: &str) -> Reply {
    match service.history_by_source(id).await {
        Ok(days) => {
            let obj: BTreeMap<String, BTreeMap<String, Vec<NormalizedRecord>>> = days
                .into_iter()
                .map(|(date, hours)| {
                    let hours = hours
                        .into_iter()
                        .map(|(hour, items)| (Partition::hour_label(hour), items))
                        .collect();
                    (date.format("%Y-%m-%d").to_string(), hours)
                })
                .collect();
            Reply::ok(ApiResponse::ok(obj).with_message(format!("{} history", id)))
        }
        Err(e) => store_failure(id, e),
    }
}

fn store_failure(id: &str, e: hotsearch::StoreError) -> Reply {
    error!(source = id, error = %e, "history query failed");
    Reply::failed(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_reply_shape() {
        let reply = Reply::failed(StatusCode::BAD_GATEWAY, "boom");
        assert_eq!(reply.error().as_deref(), Some("boom"));
        let data = reply.into_data();
        assert_eq!(data["code"], CODE_FAILED);
        assert_eq!(data["message"], "boom");
        assert_eq!(data["obj"], serde_json::json!([]));
        assert!(data.get("icon").is_none());
    }

    #[test]
    fn test_partition_parsing() {
        assert!(parse_partition("2025-03-01", "23").is_ok());
        assert_eq!(
            parse_partition("2025-03-01", "24").unwrap_err().status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            parse_partition("03/01/2025", "1").unwrap_err().status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            parse_partition("2025-03-01", "x").unwrap_err().status,
            StatusCode::BAD_REQUEST
        );
    }
}
