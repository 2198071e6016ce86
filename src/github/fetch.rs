use crate::error::{GhReportError, Result};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// A failed page request. `status` is the HTTP status when the server answered.
#[derive(Debug, Clone, PartialEq)]
pub struct PageError {
    pub status: Option<u16>,
    pub message: String,
}

impl PageError {
    pub fn is_auth(&self) -> bool {
        matches!(self.status, Some(401) | Some(403))
    }
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {status}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Anything that can serve one page of a REST collection as a JSON body.
pub trait PageSource {
    async fn fetch_page(
        &self,
        route: &str,
        query: &[(String, String)],
        page: u32,
        per_page: u32,
    ) -> std::result::Result<Value, PageError>;
}

/// One paginated collection to retrieve.
#[derive(Debug, Clone)]
pub struct FetchSpec {
    /// Human-readable name used in logs and errors.
    pub resource: String,
    pub route: String,
    pub query: Vec<(String, String)>,
    /// Field holding the array when the body is an object (`seats`, `users`).
    pub items_field: Option<String>,
    /// A required resource aborts the run when its first page fails.
    pub required: bool,
}

impl FetchSpec {
    pub fn new(resource: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            route: route.into(),
            query: Vec::new(),
            items_field: None,
            required: true,
        }
    }

    pub fn items_field(mut self, field: &str) -> Self {
        self.items_field = Some(field.to_string());
        self
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub items: Vec<Value>,
    /// Pagination stopped early because a page failed.
    pub partial: bool,
    pub pages: u32,
    pub failure: Option<PageError>,
}

/// Sequential page walker with a fixed delay between successful requests.
pub struct Fetcher<'a, S> {
    source: &'a S,
    per_page: u32,
    delay: Duration,
}

impl<'a, S: PageSource> Fetcher<'a, S> {
    pub fn new(source: &'a S, per_page: u32, delay: Duration) -> Self {
        Self {
            source,
            per_page: per_page.max(1),
            delay,
        }
    }

    /// Walk pages until one comes back shorter than `per_page`.
    ///
    /// A failure after the first page stops pagination and returns what was
    /// collected with `partial` set. A first-page failure is fatal for a
    /// required resource and yields an empty partial outcome otherwise.
    pub async fn fetch_all(&self, spec: &FetchSpec) -> Result<FetchOutcome> {
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            tracing::debug!(resource = %spec.resource, route = %spec.route, page, "fetching page");
            let response = self
                .source
                .fetch_page(&spec.route, &spec.query, page, self.per_page)
                .await
                .and_then(|body| extract_items(body, spec.items_field.as_deref()));

            let batch = match response {
                Ok(batch) => batch,
                Err(err) => {
                    tracing::warn!(
                        resource = %spec.resource,
                        route = %spec.route,
                        page,
                        status = ?err.status,
                        "page request failed: {}",
                        err.message
                    );
                    if page == 1 && spec.required {
                        return Err(first_page_error(spec, &err));
                    }
                    return Ok(FetchOutcome {
                        items,
                        partial: true,
                        pages: page - 1,
                        failure: Some(err),
                    });
                }
            };

            let count = batch.len();
            items.extend(batch);
            if count < self.per_page as usize {
                return Ok(FetchOutcome {
                    items,
                    partial: false,
                    pages: page,
                    failure: None,
                });
            }

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            page += 1;
        }
    }
}

fn first_page_error(spec: &FetchSpec, err: &PageError) -> GhReportError {
    let resource = format!("{} ({})", spec.resource, spec.route);
    if err.is_auth() {
        GhReportError::Auth {
            resource,
            reason: err.to_string(),
        }
    } else {
        GhReportError::Fetch {
            resource,
            reason: err.to_string(),
        }
    }
}

fn extract_items(body: Value, field: Option<&str>) -> std::result::Result<Vec<Value>, PageError> {
    let shape_error = |what: &str| PageError {
        status: None,
        message: format!("unexpected response shape: {what}"),
    };

    match (body, field) {
        (Value::Array(items), _) => Ok(items),
        (Value::Object(mut map), Some(field)) => match map.remove(field) {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(shape_error(&format!("`{field}` is not an array"))),
            None => Err(shape_error(&format!("missing `{field}`"))),
        },
        (Value::Object(_), None) => Err(shape_error("expected an array")),
        (other, _) => Err(shape_error(&format!("got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    /// Serves canned pages in order and records the page numbers requested.
    struct ScriptedSource {
        pages: Vec<std::result::Result<Value, PageError>>,
        requested: RefCell<Vec<u32>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<std::result::Result<Value, PageError>>) -> Self {
            Self {
                pages,
                requested: RefCell::new(Vec::new()),
            }
        }
    }

    impl PageSource for ScriptedSource {
        async fn fetch_page(
            &self,
            _route: &str,
            _query: &[(String, String)],
            page: u32,
            _per_page: u32,
        ) -> std::result::Result<Value, PageError> {
            self.requested.borrow_mut().push(page);
            self.pages
                .get(page as usize - 1)
                .cloned()
                .unwrap_or_else(|| Ok(json!([])))
        }
    }

    fn users(range: std::ops::Range<u32>) -> Value {
        Value::Array(range.map(|i| json!({ "login": format!("user{i}") })).collect())
    }

    fn server_error() -> PageError {
        PageError {
            status: Some(502),
            message: "Bad Gateway".into(),
        }
    }

    fn fetcher(source: &ScriptedSource) -> Fetcher<'_, ScriptedSource> {
        Fetcher::new(source, 2, Duration::ZERO)
    }

    #[tokio::test]
    async fn stops_on_short_page() {
        let source = ScriptedSource::new(vec![Ok(users(0..2)), Ok(users(2..4)), Ok(users(4..5))]);
        let outcome = fetcher(&source)
            .fetch_all(&FetchSpec::new("members", "/orgs/acme/members"))
            .await
            .unwrap();

        assert_eq!(outcome.items.len(), 5);
        assert!(!outcome.partial);
        assert_eq!(outcome.pages, 3);
        assert_eq!(*source.requested.borrow(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn stops_on_empty_page_after_full_page() {
        let source = ScriptedSource::new(vec![Ok(users(0..2))]);
        let outcome = fetcher(&source)
            .fetch_all(&FetchSpec::new("members", "/orgs/acme/members"))
            .await
            .unwrap();

        assert_eq!(outcome.items.len(), 2);
        assert!(!outcome.partial);
        assert_eq!(*source.requested.borrow(), vec![1, 2]);
    }

    #[tokio::test]
    async fn reads_items_nested_under_field() {
        let source = ScriptedSource::new(vec![Ok(json!({
            "total_seats": 1,
            "seats": [{ "assignee": { "login": "alice" } }]
        }))]);
        let spec = FetchSpec::new("copilot seats", "/orgs/acme/copilot/billing/seats").items_field("seats");
        let outcome = fetcher(&source).fetch_all(&spec).await.unwrap();

        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0]["assignee"]["login"], "alice");
    }

    #[tokio::test]
    async fn later_page_failure_returns_partial_data() {
        let source = ScriptedSource::new(vec![Ok(users(0..2)), Err(server_error())]);
        let outcome = fetcher(&source)
            .fetch_all(&FetchSpec::new("members", "/orgs/acme/members"))
            .await
            .unwrap();

        assert_eq!(outcome.items.len(), 2);
        assert!(outcome.partial);
        assert_eq!(outcome.pages, 1);
        assert_eq!(outcome.failure, Some(server_error()));
    }

    #[tokio::test]
    async fn first_page_failure_is_fatal_when_required() {
        let source = ScriptedSource::new(vec![Err(server_error())]);
        let err = fetcher(&source)
            .fetch_all(&FetchSpec::new("enterprise licenses", "/enterprises/acme/consumed-licenses"))
            .await
            .unwrap_err();

        match err {
            GhReportError::Fetch { resource, reason } => {
                assert!(resource.contains("/enterprises/acme/consumed-licenses"));
                assert!(reason.contains("502"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn first_page_forbidden_is_an_auth_error() {
        let source = ScriptedSource::new(vec![Err(PageError {
            status: Some(403),
            message: "Resource not accessible by integration".into(),
        })]);
        let err = fetcher(&source)
            .fetch_all(&FetchSpec::new("copilot seats", "/enterprises/acme/copilot/billing/seats"))
            .await
            .unwrap_err();

        assert!(matches!(err, GhReportError::Auth { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn first_page_failure_of_optional_resource_is_empty_partial() {
        let source = ScriptedSource::new(vec![Err(PageError {
            status: Some(409),
            message: "Git Repository is empty.".into(),
        })]);
        let spec = FetchSpec::new("commits", "/repos/acme/empty/commits").optional();
        let outcome = fetcher(&source).fetch_all(&spec).await.unwrap();

        assert!(outcome.items.is_empty());
        assert!(outcome.partial);
        assert_eq!(outcome.pages, 0);
    }

    #[tokio::test]
    async fn unexpected_shape_counts_as_failure() {
        let source = ScriptedSource::new(vec![Ok(json!({ "message": "nope" }))]);
        let err = fetcher(&source)
            .fetch_all(&FetchSpec::new("members", "/orgs/acme/members"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unexpected response shape"));
    }

    #[tokio::test]
    async fn object_without_items_field_is_not_complete() {
        let source = ScriptedSource::new(vec![Ok(json!({ "message": "Not Found" }))]);
        let spec = FetchSpec::new("copilot seats", "/enterprises/acme/copilot/billing/seats")
            .items_field("seats");
        let err = fetcher(&source).fetch_all(&spec).await.unwrap_err();
        assert!(err.to_string().contains("missing `seats`"));

        let source = ScriptedSource::new(vec![Ok(json!({ "message": "Not Found" }))]);
        let outcome = fetcher(&source).fetch_all(&spec.clone().optional()).await.unwrap();
        assert!(outcome.partial);
        assert!(outcome.items.is_empty());

        let source = ScriptedSource::new(vec![Ok(users(0..2)), Ok(json!({ "seats": null }))]);
        let outcome = fetcher(&source).fetch_all(&spec).await.unwrap();
        assert!(outcome.partial);
        assert_eq!(outcome.items.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_applies_between_pages_only() {
        let source = ScriptedSource::new(vec![Ok(users(0..2)), Ok(users(2..4)), Ok(users(4..5))]);
        let delay = Duration::from_millis(250);
        let started = tokio::time::Instant::now();

        let outcome = Fetcher::new(&source, 2, delay)
            .fetch_all(&FetchSpec::new("members", "/orgs/acme/members"))
            .await
            .unwrap();

        assert_eq!(outcome.pages, 3);
        assert_eq!(started.elapsed(), delay * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_delay_after_single_short_page() {
        let source = ScriptedSource::new(vec![Ok(users(0..1))]);
        let started = tokio::time::Instant::now();

        Fetcher::new(&source, 2, Duration::from_secs(5))
            .fetch_all(&FetchSpec::new("members", "/orgs/acme/members"))
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
