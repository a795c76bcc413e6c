//! Auto-pagination over the controller's offset-paged record endpoints.
//!
//! The controller returns paged collections as
//! `{"collection": {"<record-type>": <record | [records]>, ...}, ...}`.
//! [`fetch_all`] loops offsets sequentially (each page decides whether the
//! previous one was the last), flattens every record under `collection`,
//! and stops on exhaustion, a short page, or the caller's ceiling. A failed
//! page ends the loop with partial results rather than discarding work
//! already done.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// One page request against a paged endpoint.
#[derive(Debug, Clone)]
pub struct PageRequest {
    /// Path of the paged endpoint, relative to the controller base URL.
    pub path: String,
    /// Optional comma-separated field selector forwarded as `fields=`.
    pub fields: Option<String>,
    pub offset: u64,
    pub limit: u64,
}

/// Source of raw pages; the production implementation forwards through
/// [`RequestForwarder`](crate::forwarder::RequestForwarder), tests substitute
/// scripted pages.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> anyhow::Result<Value>;
}

/// One recorded per-page failure.
#[derive(Debug, Clone)]
pub struct PageError {
    /// 1-based page index within this invocation.
    pub page: usize,
    pub offset: u64,
    pub message: String,
}

/// Aggregated result of one auto-paginate invocation.
#[derive(Debug, Default)]
pub struct Aggregate {
    /// All accumulated records, page order preserved.
    pub records: Vec<Value>,
    pub pages_fetched: usize,
    pub reached_max_limit: bool,
    pub errors: Vec<PageError>,
}

impl Aggregate {
    /// Render the aggregate as the tool payload. Partial results carry a
    /// `_warnings` flag so callers can tell "complete" from "best-effort".
    pub fn into_payload(self) -> Value {
        let mut payload = Map::new();
        payload.insert(
            "total_records_fetched".into(),
            Value::from(self.records.len()),
        );
        payload.insert("pages_fetched".into(), Value::from(self.pages_fetched));
        payload.insert(
            "reached_max_limit".into(),
            Value::Bool(self.reached_max_limit),
        );
        if !self.errors.is_empty() {
            payload.insert("_warnings".into(), Value::Bool(true));
            payload.insert(
                "errors".into(),
                Value::Array(
                    self.errors
                        .iter()
                        .map(|e| {
                            json!({
                                "page": e.page,
                                "offset": e.offset,
                                "message": e.message,
                            })
                        })
                        .collect(),
                ),
            );
        }
        payload.insert("records".into(), Value::Array(self.records));
        Value::Object(payload)
    }
}

/// Flatten every record under a page's `collection` mapping.
///
/// Each value is either a single record or a list of records; all are
/// appended in mapping-iteration order. That order comes from an untyped
/// upstream structure and is implementation-defined, not guaranteed stable.
pub fn extract_records(page: &Value) -> Vec<Value> {
    let mut records = Vec::new();
    let Some(collection) = page.get("collection").and_then(Value::as_object) else {
        return records;
    };

    for value in collection.values() {
        match value {
            Value::Array(list) => records.extend(list.iter().cloned()),
            other => records.push(other.clone()),
        }
    }
    records
}

/// Fetch all records of a paged collection up to `max_records`.
///
/// Termination: empty page, short page (`returned < limit`), or the ceiling
/// (the final page is truncated to exactly fill it). A page error stops the
/// loop immediately, keeping everything accumulated so far.
pub async fn fetch_all(
    fetcher: &dyn PageFetcher,
    path: &str,
    fields: Option<&str>,
    start_offset: u64,
    limit: u64,
    max_records: u64,
) -> anyhow::Result<Aggregate> {
    if limit == 0 {
        anyhow::bail!("limit must be greater than 0");
    }
    if max_records == 0 {
        anyhow::bail!("max_records must be greater than 0");
    }

    let mut aggregate = Aggregate::default();
    let mut offset = start_offset;

    loop {
        let request = PageRequest {
            path: path.to_string(),
            fields: fields.map(str::to_string),
            offset,
            limit,
        };

        let page = match fetcher.fetch_page(&request).await {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!(
                    page = aggregate.pages_fetched + 1,
                    offset,
                    error = %err,
                    "Page fetch failed; returning partial results"
                );
                aggregate.errors.push(PageError {
                    page: aggregate.pages_fetched + 1,
                    offset,
                    message: err.to_string(),
                });
                return Ok(aggregate);
            }
        };

        aggregate.pages_fetched += 1;
        let mut page_records = extract_records(&page);
        let returned = page_records.len() as u64;

        let remaining = max_records - aggregate.records.len() as u64;
        if returned >= remaining {
            // Truncate the final page to exactly fill the ceiling.
            page_records.truncate(remaining as usize);
            aggregate.records.append(&mut page_records);
            aggregate.reached_max_limit = true;
            return Ok(aggregate);
        }
        aggregate.records.append(&mut page_records);

        // Empty page or short page: the collection is exhausted.
        if returned == 0 || returned < limit {
            return Ok(aggregate);
        }

        offset += limit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted page source: each entry is either a page of that many
    /// records or an error.
    struct ScriptedPages {
        script: Mutex<Vec<Result<usize, String>>>,
        requests: Mutex<Vec<PageRequest>>,
    }

    impl ScriptedPages {
        fn new(script: Vec<Result<usize, String>>) -> Self {
            Self {
                script: Mutex::new(script),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn seen_offsets(&self) -> Vec<u64> {
            self.requests.lock().unwrap().iter().map(|r| r.offset).collect()
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedPages {
        async fn fetch_page(&self, request: &PageRequest) -> anyhow::Result<Value> {
            self.requests.lock().unwrap().push(request.clone());
            let mut script = self.script.lock().unwrap();
            match script.remove(0) {
                Ok(count) => {
                    let records: Vec<Value> = (0..count)
                        .map(|i| json!({"id": format!("r-{}-{}", request.offset, i)}))
                        .collect();
                    Ok(json!({ "collection": { "asset": records }, "totalCount": count }))
                }
                Err(message) => anyhow::bail!(message),
            }
        }
    }

    #[tokio::test]
    async fn stops_on_short_page() {
        let pages = ScriptedPages::new(vec![Ok(25), Ok(25), Ok(10)]);
        let agg = fetch_all(&pages, "/vnms/assets/asset", None, 0, 25, 1000)
            .await
            .unwrap();

        assert_eq!(agg.records.len(), 60);
        assert_eq!(agg.pages_fetched, 3);
        assert!(!agg.reached_max_limit);
        assert!(agg.errors.is_empty());
        assert_eq!(pages.seen_offsets(), vec![0, 25, 50]);
    }

    #[tokio::test]
    async fn stops_on_empty_page() {
        let pages = ScriptedPages::new(vec![Ok(25), Ok(0)]);
        let agg = fetch_all(&pages, "/vnms/assets/asset", None, 0, 25, 1000)
            .await
            .unwrap();

        assert_eq!(agg.records.len(), 25);
        assert_eq!(agg.pages_fetched, 2);
        assert!(agg.errors.is_empty());
    }

    #[tokio::test]
    async fn ceiling_truncates_final_page() {
        // Pages of 25 forever; ceiling 50 stops after exactly two pages.
        let pages = ScriptedPages::new(vec![Ok(25), Ok(25), Ok(25)]);
        let agg = fetch_all(&pages, "/vnms/assets/asset", None, 0, 25, 50)
            .await
            .unwrap();

        assert_eq!(agg.records.len(), 50);
        assert_eq!(agg.pages_fetched, 2);
        assert!(agg.reached_max_limit);
        assert_eq!(pages.seen_offsets(), vec![0, 25]);
    }

    #[tokio::test]
    async fn ceiling_mid_page_truncates() {
        let pages = ScriptedPages::new(vec![Ok(25), Ok(25)]);
        let agg = fetch_all(&pages, "/vnms/assets/asset", None, 0, 25, 30)
            .await
            .unwrap();

        assert_eq!(agg.records.len(), 30);
        assert_eq!(agg.pages_fetched, 2);
        assert!(agg.reached_max_limit);
    }

    #[tokio::test]
    async fn page_failure_keeps_partial_results() {
        let pages = ScriptedPages::new(vec![Ok(25), Err("controller timeout".into())]);
        let agg = fetch_all(&pages, "/vnms/assets/asset", None, 0, 25, 1000)
            .await
            .unwrap();

        assert_eq!(agg.records.len(), 25);
        assert_eq!(agg.errors.len(), 1);
        assert_eq!(agg.errors[0].page, 2);
        assert_eq!(agg.errors[0].offset, 25);
        assert!(agg.errors[0].message.contains("controller timeout"));

        let payload = agg.into_payload();
        assert_eq!(payload["_warnings"], true);
        assert_eq!(payload["total_records_fetched"], 25);
    }

    #[tokio::test]
    async fn clean_run_has_no_warnings_key() {
        let pages = ScriptedPages::new(vec![Ok(3)]);
        let agg = fetch_all(&pages, "/vnms/assets/asset", None, 0, 25, 1000)
            .await
            .unwrap();
        let payload = agg.into_payload();
        assert!(payload.get("_warnings").is_none());
        assert!(payload.get("errors").is_none());
        assert_eq!(payload["records"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn records_preserve_fetch_order() {
        let pages = ScriptedPages::new(vec![Ok(2), Ok(1)]);
        let agg = fetch_all(&pages, "/vnms/assets/asset", None, 0, 2, 1000)
            .await
            .unwrap();
        let ids: Vec<&str> = agg
            .records
            .iter()
            .map(|r| r["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["r-0-0", "r-0-1", "r-2-0"]);
    }

    #[tokio::test]
    async fn zero_limit_fails_fast() {
        let pages = ScriptedPages::new(vec![]);
        let err = fetch_all(&pages, "/x", None, 0, 0, 100).await.unwrap_err();
        assert!(err.to_string().contains("limit"));
    }

    #[tokio::test]
    async fn honors_nonzero_start_offset() {
        let pages = ScriptedPages::new(vec![Ok(5)]);
        let agg = fetch_all(&pages, "/x", None, 100, 25, 1000).await.unwrap();
        assert_eq!(agg.records.len(), 5);
        assert_eq!(pages.seen_offsets(), vec![100]);
    }

    #[test]
    fn extract_flattens_lists_and_singletons() {
        let page = json!({
            "collection": {
                "appliance": [{"name": "a1"}, {"name": "a2"}],
                "summary": {"total": 2}
            }
        });
        let records = extract_records(&page);
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn extract_handles_missing_collection() {
        assert!(extract_records(&json!({"totalCount": 0})).is_empty());
        assert!(extract_records(&json!("not an object")).is_empty());
    }
}
