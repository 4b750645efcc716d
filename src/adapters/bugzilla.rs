use crate::core::cache::{allow_cache, CacheFormat, CacheMode, QueryCache};
use crate::core::query::{component_closed_query, component_or_group, week_window, Query, QueryKind, OPEN_STATUSES};
use crate::core::weeks::bucket_weeks;
use crate::domain::model::{Component, Issue, Person, ReviewRequest, WeeklyCount};
use crate::domain::ports::IssueSource;
use crate::utils::error::{ReportError, Result};
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

const NAMESPACE: &str = "bugzilla";
const ISSUE_FIELDS: &str = "id,status,resolution,blocks,summary";

pub struct BugzillaClient {
    http: reqwest::Client,
    base: Url,
    api_key: Option<String>,
    cache: QueryCache,
    mode: CacheMode,
    year: i32,
    seen_issues: Mutex<HashMap<u64, Issue>>,
}

impl BugzillaClient {
    pub fn new(
        base: &str,
        api_key: Option<String>,
        cache: QueryCache,
        mode: CacheMode,
        year: i32,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            base: Url::parse(base)?,
            api_key,
            cache,
            mode,
            year,
            seen_issues: Mutex::new(HashMap::new()),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Appends the query pairs plus the API key and returns the request URL
    /// together with its key-free form for logs and errors.
    fn request_url(&self, path: &str, query: &Query) -> Result<(Url, String)> {
        let mut url = self.base.join(path)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query.pairs() {
                pairs.append_pair(key, value);
            }
        }
        let display = url.to_string();
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("api_key", key);
        }
        Ok((url, display))
    }

    async fn fetch(&self, path: &str, query: &Query) -> Result<String> {
        let (url, display_url) = self.request_url(path, query)?;
        tracing::info!("Bugzilla: {}", display_url);

        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ReportError::Status {
                url: display_url,
                status: response.status(),
            });
        }
        Ok(response.text().await?)
    }

    async fn rest_query(&self, query: &Query, cacheable: bool) -> Result<serde_json::Value> {
        let body = self
            .cache
            .get_or_fetch(NAMESPACE, query, CacheFormat::Json, cacheable, || {
                self.fetch("rest/bug", query)
            })
            .await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Runs one query per bucketed week and counts the matching bugs.
    /// Results are ascending by week start. The most recent two weeks are
    /// never served from cache unless the force override is set.
    async fn query_per_week(
        &self,
        base: Query,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<WeeklyCount>> {
        let weeks = bucket_weeks(start, end)?;
        let total = weeks.len();

        let mut results = Vec::with_capacity(total);
        for (index, week) in weeks.iter().enumerate() {
            let query = base.clone().merged(week_window(week));
            let cacheable = allow_cache(self.mode, index, total);
            let value = self.rest_query(&query, cacheable).await?;
            let count = value
                .get("bugs")
                .and_then(|bugs| bugs.as_array())
                .map(|bugs| bugs.len() as u64)
                .ok_or_else(|| ReportError::UnexpectedResponse {
                    context: "bug search payload has no bugs list".to_string(),
                })?;
            results.push(WeeklyCount {
                start: week.start,
                end: week.end,
                count,
            });
        }

        Ok(results)
    }

    pub async fn bugs_closed_per_week(
        &self,
        person: &Person,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<WeeklyCount>> {
        self.query_per_week(QueryKind::BugsClosed.person_query(person, self.year), start, end)
            .await
    }

    pub async fn reviews_involved_per_week(
        &self,
        person: &Person,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<WeeklyCount>> {
        self.query_per_week(
            QueryKind::ReviewsInvolved.person_query(person, self.year),
            start,
            end,
        )
        .await
    }

    pub async fn bugs_closed_by_component_per_week(
        &self,
        component: &Component,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<WeeklyCount>> {
        self.query_per_week(component_closed_query(component), start, end)
            .await
    }

    /// Open issues blocking anything, restricted to the given components.
    /// Not cached: the blocker graph is expected fresh on every run.
    pub async fn overall_blockers(&self, components: &[Component]) -> Result<Vec<Issue>> {
        let query = Query::new()
            .with("f1", "blocked")
            .with("o1", "isnotempty")
            .with("include_fields", ISSUE_FIELDS)
            .with_all("status", OPEN_STATUSES)
            .merged(component_or_group(components, 1));

        let body = self.fetch("rest/bug", &query).await?;
        let payload: BugsPayload = serde_json::from_str(&body)?;
        Ok(payload.bugs)
    }

    async fn lookup_issue(&self, id: u64) -> Result<Option<Issue>> {
        {
            let seen = self.seen_issues.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(found) = seen.get(&id) {
                return Ok(Some(found.clone()));
            }
        }

        let query = Query::new().with("include_fields", ISSUE_FIELDS);
        let (url, display_url) = self.request_url(&format!("rest/bug/{}", id), &query)?;
        tracing::debug!("Bugzilla: {}", display_url);

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            tracing::warn!("failed to get bug {} response {}", id, status);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ReportError::Status {
                url: display_url,
                status,
            });
        }

        let mut payload: BugsPayload = response.json().await?;
        if payload.bugs.is_empty() {
            return Err(ReportError::UnexpectedResponse {
                context: format!("bug {} payload has no bugs entry", id),
            });
        }
        let issue = payload.bugs.swap_remove(0);

        self.seen_issues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, issue.clone());
        Ok(Some(issue))
    }

    /// The review request queue for one requestee and component, filtered
    /// to `review` flags. Always cached when caching is enabled at all;
    /// the queue endpoint is unauthenticated.
    pub async fn review_queue(
        &self,
        person: &Person,
        component: &Component,
    ) -> Result<Vec<ReviewRequest>> {
        let query = Query::new()
            .with("action", "queue")
            .with("component", component.component.as_str())
            .with("do_union", "0")
            .with("group", "type")
            .with("requestee", person.bugzilla_email.as_str())
            .with("type", "all")
            .with("ctype", "csv");

        let cacheable = self.mode != CacheMode::Bypass;
        let body = self
            .cache
            .get_or_fetch(NAMESPACE, &query, CacheFormat::Csv, cacheable, || async {
                let mut url = self.base.join("request.cgi")?;
                {
                    let mut pairs = url.query_pairs_mut();
                    for (key, value) in query.pairs() {
                        pairs.append_pair(key, value);
                    }
                }
                tracing::info!("Bugzilla: {}", url);

                let response = self.http.get(url.clone()).send().await?;
                if !response.status().is_success() {
                    return Err(ReportError::Status {
                        url: url.to_string(),
                        status: response.status(),
                    });
                }
                Ok(response.text().await?)
            })
            .await?;

        // The queue endpoint answers with this string instead of an empty
        // CSV document.
        if body.trim() == "No requests." {
            return Ok(Vec::new());
        }

        let mut requests = Vec::new();
        let mut reader = csv::Reader::from_reader(body.as_bytes());
        for row in reader.deserialize::<QueueRow>() {
            let row = row?;
            if row.flag != "review" {
                continue;
            }
            let date_part = row.created.split_whitespace().next().unwrap_or_default();
            let created = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| {
                ReportError::UnexpectedResponse {
                    context: format!("unparseable request date: {}", row.created),
                }
            })?;
            requests.push(ReviewRequest {
                bug_id: row.bug_id,
                requestee: person.bugzilla_email.clone(),
                component: component.component.clone(),
                created,
            });
        }

        Ok(requests)
    }
}

impl IssueSource for BugzillaClient {
    async fn issue(&self, id: u64) -> Result<Option<Issue>> {
        self.lookup_issue(id).await
    }
}

#[derive(Debug, Deserialize)]
struct BugsPayload {
    #[serde(default)]
    bugs: Vec<Issue>,
}

#[derive(Debug, Deserialize)]
struct QueueRow {
    #[serde(rename = "Flag")]
    flag: String,
    #[serde(rename = "Bug ID")]
    bug_id: String,
    #[serde(rename = "Created")]
    created: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use tempfile::TempDir;

    fn person() -> Person {
        Person {
            name: "ada".to_string(),
            bugzilla_email: "ada@example.org".to_string(),
            github: None,
        }
    }

    fn component() -> Component {
        Component {
            product: "Toolkit".to_string(),
            component: "Build Config".to_string(),
            short: "build".to_string(),
        }
    }

    fn client(server: &MockServer, dir: &TempDir, mode: CacheMode) -> BugzillaClient {
        let cache = QueryCache::new(dir.path().join("cache")).unwrap();
        BugzillaClient::new(
            &server.base_url(),
            None,
            cache,
            mode,
            2024,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn weekly_counts_come_from_the_bugs_list() {
        let server = MockServer::start();
        let dir = TempDir::new().unwrap();

        let search = server.mock(|when, then| {
            when.method(GET)
                .path("/rest/bug")
                .query_param("chfield", "cf_last_resolved");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({"bugs": [{"id": 1}, {"id": 2}]}));
        });

        let client = client(&server, &dir, CacheMode::Bypass);
        let counts = client
            .bugs_closed_per_week(&person(), date(2024, 1, 1), date(2024, 1, 14))
            .await
            .unwrap();

        assert_eq!(search.hits(), 2);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].start, date(2024, 1, 1));
        assert_eq!(counts[1].start, date(2024, 1, 8));
        assert!(counts.iter().all(|week| week.count == 2));
    }

    #[tokio::test]
    async fn older_weeks_hit_the_cache_on_the_second_run() {
        let server = MockServer::start();
        let dir = TempDir::new().unwrap();

        let search = server.mock(|when, then| {
            when.method(GET).path("/rest/bug");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({"bugs": []}));
        });

        let client = client(&server, &dir, CacheMode::Normal);
        // Four weeks: the first two are cacheable, the last two are not.
        for _ in 0..2 {
            client
                .bugs_closed_per_week(&person(), date(2024, 1, 1), date(2024, 1, 28))
                .await
                .unwrap();
        }

        assert_eq!(search.hits(), 6);
    }

    #[tokio::test]
    async fn api_failure_is_fatal_for_weekly_counts() {
        let server = MockServer::start();
        let dir = TempDir::new().unwrap();

        server.mock(|when, then| {
            when.method(GET).path("/rest/bug");
            then.status(500);
        });

        let client = client(&server, &dir, CacheMode::Bypass);
        let err = client
            .bugs_closed_per_week(&person(), date(2024, 1, 1), date(2024, 1, 7))
            .await
            .unwrap_err();

        assert!(matches!(err, ReportError::Status { .. }));
    }

    #[tokio::test]
    async fn component_counts_carry_product_and_component() {
        let server = MockServer::start();
        let dir = TempDir::new().unwrap();

        let search = server.mock(|when, then| {
            when.method(GET)
                .path("/rest/bug")
                .query_param("product", "Toolkit")
                .query_param("component", "Build Config");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({"bugs": [{"id": 3}]}));
        });

        let client = client(&server, &dir, CacheMode::Bypass);
        let counts = client
            .bugs_closed_by_component_per_week(&component(), date(2024, 1, 1), date(2024, 1, 7))
            .await
            .unwrap();

        search.assert();
        assert_eq!(counts[0].count, 1);
    }

    #[tokio::test]
    async fn single_issue_lookup_is_memoized() {
        let server = MockServer::start();
        let dir = TempDir::new().unwrap();

        let lookup = server.mock(|when, then| {
            when.method(GET).path("/rest/bug/42");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({
                    "bugs": [{"id": 42, "status": "NEW", "blocks": [7]}]
                }));
        });

        let client = client(&server, &dir, CacheMode::Bypass);
        let first = client.issue(42).await.unwrap().unwrap();
        let second = client.issue(42).await.unwrap().unwrap();

        assert_eq!(lookup.hits(), 1);
        assert_eq!(first.id, 42);
        assert_eq!(second.blocks, vec![7]);
    }

    #[tokio::test]
    async fn restricted_issue_lookup_is_not_found() {
        let server = MockServer::start();
        let dir = TempDir::new().unwrap();

        server.mock(|when, then| {
            when.method(GET).path("/rest/bug/13");
            then.status(401);
        });

        let client = client(&server, &dir, CacheMode::Bypass);
        assert!(client.issue(13).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn server_error_on_issue_lookup_is_fatal() {
        let server = MockServer::start();
        let dir = TempDir::new().unwrap();

        server.mock(|when, then| {
            when.method(GET).path("/rest/bug/13");
            then.status(503);
        });

        let client = client(&server, &dir, CacheMode::Bypass);
        let err = client.issue(13).await.unwrap_err();
        assert!(matches!(err, ReportError::Status { .. }));
    }

    #[tokio::test]
    async fn overall_blockers_restrict_to_components() {
        let server = MockServer::start();
        let dir = TempDir::new().unwrap();

        let search = server.mock(|when, then| {
            when.method(GET)
                .path("/rest/bug")
                .query_param("f1", "blocked")
                .query_param("o1", "isnotempty")
                .query_param("j_top", "OR")
                .query_param("v3", "Toolkit")
                .query_param("v4", "Build Config");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({
                    "bugs": [{"id": 9, "status": "NEW", "blocks": [1, 2, 3], "summary": "tracker"}]
                }));
        });

        let client = client(&server, &dir, CacheMode::Bypass);
        let roots = client.overall_blockers(&[component()]).await.unwrap();

        search.assert();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].blocks, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn review_queue_keeps_only_review_flags() {
        let server = MockServer::start();
        let dir = TempDir::new().unwrap();

        server.mock(|when, then| {
            when.method(GET).path("/request.cgi").query_param("ctype", "csv");
            then.status(200).body(
                "Requester,Requestee,Flag,Bug ID,Created\n\
                 eve@example.org,ada@example.org,review,555,2024-01-03 10:12 PST\n\
                 eve@example.org,ada@example.org,needinfo,556,2024-01-04 09:00 PST\n",
            );
        });

        let client = client(&server, &dir, CacheMode::Bypass);
        let requests = client.review_queue(&person(), &component()).await.unwrap();

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].bug_id, "555");
        assert_eq!(requests[0].created, date(2024, 1, 3));
    }

    #[tokio::test]
    async fn empty_review_queue_sentinel_yields_no_rows() {
        let server = MockServer::start();
        let dir = TempDir::new().unwrap();

        server.mock(|when, then| {
            when.method(GET).path("/request.cgi");
            then.status(200).body("No requests.");
        });

        let client = client(&server, &dir, CacheMode::Bypass);
        let requests = client.review_queue(&person(), &component()).await.unwrap();
        assert!(requests.is_empty());
    }
}
