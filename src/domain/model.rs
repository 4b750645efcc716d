use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One Monday-aligned calendar week. `end` is the Sunday of the same week,
/// so the interval spans exactly 7 days inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekInterval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// A count of matching items for one week from a single source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyCount {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MergedRow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub bugzilla: u64,
    pub github: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MergedSeries {
    pub rows: Vec<MergedRow>,
    pub max: u64,
}

/// A tracked person. Everyone has a Bugzilla account; the GitHub login is
/// optional and its absence simply zeroes the GitHub column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub bugzilla_email: String,
    #[serde(default)]
    pub github: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub product: String,
    pub component: String,
    pub short: String,
}

/// The single-issue lookup payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: u64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub blocks: Vec<u64>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// One root issue and its transitive blockers, classified by status.
#[derive(Debug, Clone, Serialize)]
pub struct BlockerReport {
    pub id: u64,
    pub summary: String,
    pub open: Vec<Issue>,
    pub closed: Vec<Issue>,
    pub total: usize,
}

/// One row of the Bugzilla request queue with a `review` flag.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewRequest {
    pub bug_id: String,
    pub requestee: String,
    pub component: String,
    pub created: NaiveDate,
}

/// Everything fetched from the remote APIs, before merging.
#[derive(Debug, Clone)]
pub struct PersonActivity {
    pub person: Person,
    pub bugzilla_closed: Vec<WeeklyCount>,
    pub bugzilla_reviews: Vec<WeeklyCount>,
    pub github_closed: Vec<WeeklyCount>,
    pub github_reviews: Vec<WeeklyCount>,
}

#[derive(Debug, Clone)]
pub struct ComponentActivity {
    pub component: Component,
    pub closed: Vec<WeeklyCount>,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub people: Vec<PersonActivity>,
    pub components: Vec<ComponentActivity>,
    pub blockers: Vec<BlockerReport>,
    pub review_queue: Vec<ReviewRequest>,
}

/// A rendered output file, relative to the build directory.
#[derive(Debug, Clone)]
pub struct Document {
    pub filename: String,
    pub contents: String,
}

#[derive(Debug, Clone)]
pub struct ReportBundle {
    pub documents: Vec<Document>,
    pub index: String,
}
