use crate::core::cache::{allow_cache, CacheFormat, CacheMode, QueryCache};
use crate::core::query::Query;
use crate::core::weeks::bucket_weeks;
use crate::domain::model::{Person, WeeklyCount};
use crate::utils::error::{ReportError, Result};
use chrono::NaiveDate;
use std::time::Duration;
use url::Url;

const NAMESPACE: &str = "github";

pub struct GithubClient {
    http: reqwest::Client,
    search: Url,
    credentials: Option<(String, String)>,
    cache: QueryCache,
    mode: CacheMode,
    delay: Duration,
}

impl GithubClient {
    pub fn new(
        base: &str,
        credentials: Option<(String, String)>,
        cache: QueryCache,
        mode: CacheMode,
        delay: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            search: Url::parse(base)?.join("search/issues")?,
            credentials,
            cache,
            mode,
            delay,
        })
    }

    async fn search_count(&self, query: &Query, cacheable: bool) -> Result<u64> {
        let body = self
            .cache
            .get_or_fetch(NAMESPACE, query, CacheFormat::Json, cacheable, || async {
                let mut url = self.search.clone();
                url.set_query(Some(&format!("q={}", query.search_terms())));
                tracing::info!("Github: {}", query.search_terms());

                let mut request = self.http.get(url.clone());
                if let Some((username, token)) = &self.credentials {
                    request = request.basic_auth(username, Some(token));
                }

                let response = request.send().await?;
                if !response.status().is_success() {
                    return Err(ReportError::Status {
                        url: url.to_string(),
                        status: response.status(),
                    });
                }
                let body = response.text().await?;

                // Pace real requests to respect the search quota; cache
                // hits never wait.
                tokio::time::sleep(self.delay).await;
                Ok(body)
            })
            .await?;

        let value: serde_json::Value = serde_json::from_str(&body)?;
        value
            .get("total_count")
            .and_then(|count| count.as_u64())
            .ok_or_else(|| ReportError::UnexpectedResponse {
                context: "search payload has no total_count".to_string(),
            })
    }

    /// Runs one search per bucketed week, ascending by week start, with the
    /// same two-week cache policy as the issue tracker.
    async fn counts_per_week(
        &self,
        base: Query,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<WeeklyCount>> {
        let weeks = bucket_weeks(start, end)?;
        let total = weeks.len();

        let mut results = Vec::with_capacity(total);
        for (index, week) in weeks.iter().enumerate() {
            let query = base.clone().with(
                "closed",
                format!(
                    "\"{} .. {}\"",
                    week.start.format("%Y-%m-%d"),
                    week.end.format("%Y-%m-%d")
                ),
            );
            let cacheable = allow_cache(self.mode, index, total);
            let count = self.search_count(&query, cacheable).await?;
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
        let base = Query::new()
            .with("type", "issue")
            .with("state", "closed")
            .with("assignee", self.login(person)?);
        self.counts_per_week(base, start, end).await
    }

    pub async fn reviews_involved_per_week(
        &self,
        person: &Person,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<WeeklyCount>> {
        let base = Query::new()
            .with("type", "pr")
            .with("state", "closed")
            .with("involves", self.login(person)?);
        self.counts_per_week(base, start, end).await
    }

    fn login<'p>(&self, person: &'p Person) -> Result<&'p str> {
        person
            .github
            .as_deref()
            .ok_or_else(|| ReportError::Config {
                message: format!("person {} has no github login", person.name),
            })
    }
}
