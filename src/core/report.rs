use crate::adapters::{BugzillaClient, GithubClient};
use crate::config::ReportConfig;
use crate::core::blockers::collect_blockers;
use crate::core::merge::{by_week_start, merge};
use crate::core::query::{buglist_url, QueryKind};
use crate::domain::model::{
    BlockerReport, Component, ComponentActivity, Document, Extraction, MergedSeries, Person,
    PersonActivity, ReportBundle, ReviewRequest,
};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::Result;
use chrono::Local;
use std::collections::BTreeMap;

pub struct ReportPipeline<S: Storage> {
    config: ReportConfig,
    bugzilla: BugzillaClient,
    github: GithubClient,
    storage: S,
}

impl<S: Storage> ReportPipeline<S> {
    pub fn new(
        config: ReportConfig,
        bugzilla: BugzillaClient,
        github: GithubClient,
        storage: S,
    ) -> Self {
        Self {
            config,
            bugzilla,
            github,
            storage,
        }
    }

    async fn extract_people(&self) -> Result<Vec<PersonActivity>> {
        let (start, end) = self.config.range();
        let mut people = Vec::with_capacity(self.config.people.len());

        for person in &self.config.people {
            tracing::info!("Fetching activity for {}", person.name);
            let bugzilla_closed = self.bugzilla.bugs_closed_per_week(person, start, end).await?;
            let bugzilla_reviews = self
                .bugzilla
                .reviews_involved_per_week(person, start, end)
                .await?;

            let (github_closed, github_reviews) = if person.github.is_some() {
                (
                    self.github.bugs_closed_per_week(person, start, end).await?,
                    self.github
                        .reviews_involved_per_week(person, start, end)
                        .await?,
                )
            } else {
                (Vec::new(), Vec::new())
            };

            people.push(PersonActivity {
                person: person.clone(),
                bugzilla_closed,
                bugzilla_reviews,
                github_closed,
                github_reviews,
            });
        }

        Ok(people)
    }

    async fn extract_components(&self) -> Result<Vec<ComponentActivity>> {
        let (start, end) = self.config.range();
        let mut components = Vec::with_capacity(self.config.components.len());

        for component in &self.config.components {
            tracing::info!("Fetching activity for {}/{}", component.product, component.component);
            let closed = self
                .bugzilla
                .bugs_closed_by_component_per_week(component, start, end)
                .await?;
            components.push(ComponentActivity {
                component: component.clone(),
                closed,
            });
        }

        Ok(components)
    }

    async fn extract_blockers(&self) -> Result<Vec<BlockerReport>> {
        if self.config.components.is_empty() {
            return Ok(Vec::new());
        }
        let roots = self.bugzilla.overall_blockers(&self.config.components).await?;
        collect_blockers(&self.bugzilla, &roots).await
    }

    /// Gathers the review queues of every person/component pair, de-duplicated
    /// by bug id and ordered by request date.
    async fn extract_review_queue(&self) -> Result<Vec<ReviewRequest>> {
        let mut by_bug: BTreeMap<String, ReviewRequest> = BTreeMap::new();
        for person in &self.config.people {
            for component in &self.config.components {
                for request in self.bugzilla.review_queue(person, component).await? {
                    by_bug.insert(request.bug_id.clone(), request);
                }
            }
        }

        let mut queue: Vec<ReviewRequest> = by_bug.into_values().collect();
        queue.sort_by(|a, b| a.created.cmp(&b.created).then(a.bug_id.cmp(&b.bug_id)));
        Ok(queue)
    }
}

impl<S: Storage> Pipeline for ReportPipeline<S> {
    async fn extract(&self) -> Result<Extraction> {
        Ok(Extraction {
            people: self.extract_people().await?,
            components: self.extract_components().await?,
            blockers: self.extract_blockers().await?,
            review_queue: self.extract_review_queue().await?,
        })
    }

    async fn transform(&self, extraction: Extraction) -> Result<ReportBundle> {
        let mut documents = Vec::new();

        for activity in &extraction.people {
            let closed = merge(
                &activity.bugzilla_closed,
                &by_week_start(&activity.github_closed),
            );
            let reviews = merge(
                &activity.bugzilla_reviews,
                &by_week_start(&activity.github_reviews),
            );

            documents.push(Document {
                filename: format!("{}.csv", activity.person.name),
                contents: csv_export(&closed)?,
            });
            documents.push(Document {
                filename: format!("person-{}.html", activity.person.name),
                contents: person_page(&activity.person, &closed, &reviews),
            });
        }

        for activity in &extraction.components {
            let closed = merge(&activity.closed, &Default::default());

            documents.push(Document {
                filename: format!("{}.csv", activity.component.short),
                contents: csv_export(&closed)?,
            });
            documents.push(Document {
                filename: format!("component-{}.html", activity.component.short),
                contents: component_page(&activity.component, &closed),
            });
        }

        documents.push(Document {
            filename: "blockers.html".to_string(),
            contents: blockers_page(&extraction.blockers, self.bugzilla.base().as_str()),
        });
        documents.push(Document {
            filename: "blockers.json".to_string(),
            contents: serde_json::to_string_pretty(&extraction.blockers)?,
        });
        documents.push(Document {
            filename: "review-queue.csv".to_string(),
            contents: review_queue_csv(&extraction.review_queue)?,
        });
        documents.push(Document {
            filename: "index.html".to_string(),
            contents: index_page(
                &self.config,
                self.bugzilla.base(),
                self.bugzilla.year(),
            )?,
        });

        Ok(ReportBundle {
            documents,
            index: "index.html".to_string(),
        })
    }

    async fn load(&self, bundle: ReportBundle) -> Result<String> {
        for document in &bundle.documents {
            self.storage
                .write_file(&document.filename, document.contents.as_bytes())
                .await?;
        }
        Ok(format!("{}/{}", self.config.build.dir, bundle.index))
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn layout(title: &str, body: &str) -> String {
    let generated = Local::now().format("%Y-%m-%d %H:%M");
    let mut page = String::new();
    page.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    page.push_str("  <meta charset=\"utf-8\">\n");
    page.push_str(&format!("  <title>{}</title>\n", escape(title)));
    page.push_str("</head>\n<body>\n");
    page.push_str(body);
    page.push_str(&format!("<footer>Generated {}</footer>\n", generated));
    page.push_str("</body>\n</html>\n");
    page
}

fn series_table(heading: &str, series: &MergedSeries) -> String {
    let mut lines = vec![
        format!("<h2>{}</h2>", escape(heading)),
        format!("<p>Weekly maximum: {}</p>", series.max),
        "<table>".to_string(),
        "  <tr><th>week start</th><th>week end</th><th>bugzilla</th><th>github</th><th>total</th></tr>"
            .to_string(),
    ];
    for row in &series.rows {
        lines.push(format!(
            "  <tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            row.start, row.end, row.bugzilla, row.github, row.total
        ));
    }
    lines.push("</table>".to_string());
    lines.join("\n")
}

fn person_page(person: &Person, closed: &MergedSeries, reviews: &MergedSeries) -> String {
    let mut body = String::new();
    body.push_str(&format!("<h1>{}</h1>\n", escape(&person.name)));
    body.push_str(&format!(
        "<p><a href=\"{0}.csv\">{0}.csv</a></p>\n",
        person.name
    ));
    body.push_str(&series_table("Bugs closed per week", closed));
    body.push('\n');
    body.push_str(&series_table("Reviews involved per week", reviews));
    body.push('\n');
    layout(&person.name, &body)
}

fn component_page(component: &Component, closed: &MergedSeries) -> String {
    let title = format!("{} / {}", component.product, component.component);
    let mut body = String::new();
    body.push_str(&format!("<h1>{}</h1>\n", escape(&title)));
    body.push_str(&format!(
        "<p><a href=\"{0}.csv\">{0}.csv</a></p>\n",
        component.short
    ));
    body.push_str(&series_table("Bugs closed per week", closed));
    body.push('\n');
    layout(&title, &body)
}

fn blockers_page(reports: &[BlockerReport], bugzilla_base: &str) -> String {
    let bug_url = |id: u64| format!("{}show_bug.cgi?id={}", bugzilla_base, id);

    let mut body = String::new();
    body.push_str("<h1>Blockers</h1>\n");
    if reports.is_empty() {
        body.push_str("<p>No tracked issues with more than two blockers.</p>\n");
    }
    for report in reports {
        body.push_str(&format!(
            "<h2><a href=\"{}\">Bug {}</a>: {}</h2>\n",
            bug_url(report.id),
            report.id,
            escape(&report.summary)
        ));
        body.push_str(&format!(
            "<p>{} blockers: {} open, {} closed</p>\n",
            report.total,
            report.open.len(),
            report.closed.len()
        ));
        for (label, issues) in [("Open", &report.open), ("Closed", &report.closed)] {
            if issues.is_empty() {
                continue;
            }
            body.push_str(&format!("<h3>{}</h3>\n<ul>\n", label));
            for issue in issues {
                body.push_str(&format!(
                    "  <li><a href=\"{}\">Bug {}</a> ({})</li>\n",
                    bug_url(issue.id),
                    issue.id,
                    escape(&issue.status)
                ));
            }
            body.push_str("</ul>\n");
        }
    }
    layout("Blockers", &body)
}

fn index_page(config: &ReportConfig, bugzilla_base: &url::Url, year: i32) -> Result<String> {
    let (start, end) = config.range();

    let mut body = String::new();
    body.push_str("<h1>Team activity</h1>\n");
    body.push_str(&format!("<p>{} to {}</p>\n", start, end));

    body.push_str("<h2>People</h2>\n<ul>\n");
    let mut people: Vec<&Person> = config.people.iter().collect();
    people.sort_by(|a, b| a.name.cmp(&b.name));
    for person in people {
        body.push_str(&format!(
            "  <li><a href=\"person-{0}.html\">{0}</a>\n    <ul>\n",
            escape(&person.name)
        ));
        for kind in QueryKind::ALL {
            let url = buglist_url(bugzilla_base, &kind.person_query(person, year))?;
            body.push_str(&format!(
                "      <li><a href=\"{}\">{}</a>: {}</li>\n",
                url,
                kind.label(),
                kind.description()
            ));
        }
        body.push_str("    </ul>\n  </li>\n");
    }
    body.push_str("</ul>\n");

    if !config.components.is_empty() {
        body.push_str("<h2>Components</h2>\n<ul>\n");
        for component in &config.components {
            body.push_str(&format!(
                "  <li><a href=\"component-{}.html\">{} / {}</a></li>\n",
                component.short,
                escape(&component.product),
                escape(&component.component)
            ));
        }
        body.push_str("</ul>\n");
    }

    body.push_str("<h2>Reports</h2>\n<ul>\n");
    body.push_str("  <li><a href=\"blockers.html\">Blockers</a> (<a href=\"blockers.json\">json</a>)</li>\n");
    body.push_str("  <li><a href=\"review-queue.csv\">Review queue</a></li>\n");
    body.push_str("</ul>\n");

    Ok(layout("Team activity", &body))
}

fn csv_export(series: &MergedSeries) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["start", "end", "bugzilla", "github", "total"])?;
    for row in &series.rows {
        writer.write_record([
            row.start.to_string(),
            row.end.to_string(),
            row.bugzilla.to_string(),
            row.github.to_string(),
            row.total.to_string(),
        ])?;
    }
    finish_csv(writer)
}

fn review_queue_csv(queue: &[ReviewRequest]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["bug_id", "requestee", "component", "created"])?;
    for request in queue {
        writer.write_record([
            request.bug_id.clone(),
            request.requestee.clone(),
            request.component.clone(),
            request.created.to_string(),
        ])?;
    }
    finish_csv(writer)
}

fn finish_csv(mut writer: csv::Writer<Vec<u8>>) -> Result<String> {
    writer.flush()?;
    let bytes = writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| std::io::Error::other(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Issue, MergedRow, WeeklyCount};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn series() -> MergedSeries {
        MergedSeries {
            rows: vec![MergedRow {
                start: date(2024, 1, 1),
                end: date(2024, 1, 7),
                bugzilla: 3,
                github: 2,
                total: 5,
            }],
            max: 5,
        }
    }

    #[test]
    fn csv_export_has_header_and_rows() {
        let text = csv_export(&series()).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "start,end,bugzilla,github,total");
        assert_eq!(lines[1], "2024-01-01,2024-01-07,3,2,5");
    }

    #[test]
    fn empty_series_exports_header_only() {
        let text = csv_export(&MergedSeries {
            rows: vec![],
            max: 0,
        })
        .unwrap();
        assert_eq!(text.trim(), "start,end,bugzilla,github,total");
    }

    #[test]
    fn review_queue_csv_is_one_row_per_request() {
        let queue = vec![ReviewRequest {
            bug_id: "555".to_string(),
            requestee: "ada@example.org".to_string(),
            component: "Build Config".to_string(),
            created: date(2024, 1, 3),
        }];
        let text = review_queue_csv(&queue).unwrap();

        assert!(text.starts_with("bug_id,requestee,component,created"));
        assert!(text.contains("555,ada@example.org,Build Config,2024-01-03"));
    }

    #[test]
    fn person_page_links_the_csv_and_tables() {
        let person = Person {
            name: "ada".to_string(),
            bugzilla_email: "ada@example.org".to_string(),
            github: Some("ada-gh".to_string()),
        };
        let page = person_page(&person, &series(), &series());

        assert!(page.contains("<h1>ada</h1>"));
        assert!(page.contains("href=\"ada.csv\""));
        assert!(page.contains("Bugs closed per week"));
        assert!(page.contains("Reviews involved per week"));
        assert!(page.contains("<td>2024-01-01</td>"));
    }

    #[test]
    fn blockers_page_links_each_issue() {
        let reports = vec![BlockerReport {
            id: 9,
            summary: "tracker <script>".to_string(),
            open: vec![Issue {
                id: 11,
                status: "NEW".to_string(),
                resolution: None,
                blocks: vec![],
                summary: None,
            }],
            closed: vec![],
            total: 1,
        }];
        let page = blockers_page(&reports, "https://bugzilla.example.org/");

        assert!(page.contains("show_bug.cgi?id=9"));
        assert!(page.contains("show_bug.cgi?id=11"));
        assert!(page.contains("tracker &lt;script&gt;"));
    }

    #[test]
    fn weekly_series_render_in_given_order() {
        let counts = vec![
            WeeklyCount {
                start: date(2024, 1, 1),
                end: date(2024, 1, 7),
                count: 1,
            },
            WeeklyCount {
                start: date(2024, 1, 8),
                end: date(2024, 1, 14),
                count: 2,
            },
        ];
        let merged = merge(&counts, &Default::default());
        let table = series_table("Bugs closed per week", &merged);

        let first = table.find("2024-01-01").unwrap();
        let second = table.find("2024-01-08").unwrap();
        assert!(first < second);
    }
}
