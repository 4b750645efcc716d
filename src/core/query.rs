use crate::domain::model::{Component, Person, WeekInterval};
use crate::utils::error::Result;
use std::collections::BTreeMap;
use url::Url;

pub const OPEN_STATUSES: [&str; 4] = ["UNCONFIRMED", "ASSIGNED", "REOPENED", "NEW"];
pub const CLOSED_STATUSES: [&str; 3] = ["RESOLVED", "VERIFIED", "CLOSED"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    One(String),
    Many(Vec<String>),
}

/// One API request, as an ordered key-value structure. Keys are held in a
/// sorted map so that two queries with the same content serialize
/// identically no matter how they were built; the serialization is the
/// cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    params: BTreeMap<String, QueryValue>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), QueryValue::One(value.into()));
        self
    }

    pub fn with_all<I, T>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.params.insert(
            key.into(),
            QueryValue::Many(values.into_iter().map(Into::into).collect()),
        );
        self
    }

    /// Folds `other` into `self`; keys in `other` win.
    pub fn merged(mut self, other: Query) -> Self {
        self.params.extend(other.params);
        self
    }

    /// Flat `(key, value)` pairs in canonical order, multi-values expanded
    /// in their listed order. This is what goes on the wire.
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        let mut out = Vec::new();
        for (key, value) in &self.params {
            match value {
                QueryValue::One(v) => out.push((key.as_str(), v.as_str())),
                QueryValue::Many(vs) => out.extend(vs.iter().map(|v| (key.as_str(), v.as_str()))),
            }
        }
        out
    }

    pub fn canonical(&self) -> String {
        self.pairs()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// `+`-joined `key:value` terms for the code-host search endpoint.
    pub fn search_terms(&self) -> String {
        self.pairs()
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect::<Vec<_>>()
            .join("+")
    }

    pub fn cache_key(&self, namespace: &str) -> String {
        format!("{}:{:x}", namespace, md5::compute(self.canonical()))
    }
}

/// The closed set of Bugzilla queries tracked per person. Each variant
/// builds the parameter set the report links to or counts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    BugsAssigned,
    BugsClosed,
    ReviewsAssigned,
    NiAssigned,
    NiAssignedOpen,
    ReviewsInvolved,
    FixedInYear,
    CreatedInYear,
    CreatedInYearOpen,
    CommentedOtherChangedYear,
}

impl QueryKind {
    pub const ALL: [QueryKind; 10] = [
        QueryKind::BugsAssigned,
        QueryKind::BugsClosed,
        QueryKind::ReviewsAssigned,
        QueryKind::NiAssigned,
        QueryKind::NiAssignedOpen,
        QueryKind::ReviewsInvolved,
        QueryKind::FixedInYear,
        QueryKind::CreatedInYear,
        QueryKind::CreatedInYearOpen,
        QueryKind::CommentedOtherChangedYear,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            QueryKind::BugsAssigned => "bugs_assigned",
            QueryKind::BugsClosed => "closed",
            QueryKind::ReviewsAssigned => "reviews_assigned",
            QueryKind::NiAssigned => "ni_assigned",
            QueryKind::NiAssignedOpen => "ni_assigned_open",
            QueryKind::ReviewsInvolved => "reviews_involved",
            QueryKind::FixedInYear => "fixed_year",
            QueryKind::CreatedInYear => "created_year",
            QueryKind::CreatedInYearOpen => "created_year_open",
            QueryKind::CommentedOtherChangedYear => "commented_other_changed_year",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            QueryKind::BugsAssigned => "all bugs open and assigned to them",
            QueryKind::BugsClosed => "all bugs they've closed",
            QueryKind::ReviewsAssigned => "all bugs with reviews requested of them",
            QueryKind::NiAssigned => "all bugs with a needinfo on them",
            QueryKind::NiAssignedOpen => "all open bugs with an open needinfo on them",
            QueryKind::ReviewsInvolved => "all bugs with reviews they are involved in",
            QueryKind::FixedInYear => "all fixed by them in the year",
            QueryKind::CreatedInYear => "all created by them in the year",
            QueryKind::CreatedInYearOpen => "all created by them in the year and still open",
            QueryKind::CommentedOtherChangedYear => {
                "all bugs of others they commented on, changed in the year"
            }
        }
    }

    pub fn person_query(&self, person: &Person, year: i32) -> Query {
        let email = person.bugzilla_email.as_str();
        match self {
            QueryKind::BugsAssigned => assigned_to(email).with_all("status", OPEN_STATUSES),
            QueryKind::BugsClosed => assigned_to(email).with_all("status", CLOSED_STATUSES),
            QueryKind::ReviewsAssigned => Query::new()
                .with_all("status", OPEN_STATUSES)
                .with("f1", "flagtypes.name")
                .with("o1", "substring")
                .with("v1", "review?")
                .with("f2", "requestees.login_name")
                .with("o2", "substring")
                .with("v2", email),
            QueryKind::NiAssigned => needinfo(email),
            QueryKind::NiAssignedOpen => needinfo(email)
                .with("f3", "bug_status")
                .with("o3", "regexp")
                .with("v3", OPEN_STATUSES.join("|")),
            QueryKind::ReviewsInvolved => Query::new()
                .with("f1", "attachments.description")
                .with("o1", "anywordssubstr")
                .with("v1", email),
            QueryKind::FixedInYear => Query::new()
                .with("emailtype1", "substring")
                .with("emailassigned_to1", "1")
                .with("email1", email)
                .with("f1", "resolution")
                .with("o1", "changedto")
                .with("v1", "FIXED")
                .with("f2", "resolution")
                .with("o2", "changedafter")
                .with("v2", format!("{}-01-01", year))
                .with("f3", "resolution")
                .with("o3", "changedbefore")
                .with("v3", format!("{}-12-31", year)),
            QueryKind::CreatedInYear => created_in_year(email, year),
            QueryKind::CreatedInYearOpen => {
                created_in_year(email, year).with_all("status", OPEN_STATUSES)
            }
            QueryKind::CommentedOtherChangedYear => Query::new()
                .with("emailtype1", "substring")
                .with("emaillongdesc1", "1")
                .with("email1", email)
                .with("f1", "delta_ts")
                .with("o1", "regexp")
                .with("v1", format!("^{}.*", year))
                .with("f2", "assigned_to")
                .with("o2", "notequals")
                .with("v2", email)
                .with("f3", "reporter")
                .with("o3", "notequals")
                .with("v3", email),
        }
    }
}

fn assigned_to(email: &str) -> Query {
    Query::new()
        .with("emailtype1", "exact")
        .with("emailassigned_to1", "1")
        .with("email1", email)
}

fn needinfo(email: &str) -> Query {
    Query::new()
        .with("f1", "flagtypes.name")
        .with("o1", "substring")
        .with("v1", "needinfo")
        .with("f2", "requestees.login_name")
        .with("o2", "substring")
        .with("v2", email)
}

fn created_in_year(email: &str, year: i32) -> Query {
    Query::new()
        .with("emailtype1", "substring")
        .with("emailreporter1", "1")
        .with("email1", email)
        .with("f1", "creation_ts")
        .with("o1", "regexp")
        .with("v1", format!("^{}.*", year))
}

/// Restricts a weekly count query to items whose resolution changed inside
/// the week.
pub fn week_window(week: &WeekInterval) -> Query {
    Query::new()
        .with("chfield", "cf_last_resolved")
        .with("chfieldfrom", week.start.format("%Y-%m-%d").to_string())
        .with("chfieldto", week.end.format("%Y-%m-%d").to_string())
}

pub fn component_closed_query(component: &Component) -> Query {
    Query::new()
        .with("product", component.product.as_str())
        .with("component", component.component.as_str())
        .with_all("status", CLOSED_STATUSES)
}

/// Numbered `f/o/v` OR-groups restricting a search to the given
/// product/component pairs. `counter` is the highest field index already
/// used by the enclosing query.
pub fn component_or_group(components: &[Component], mut counter: usize) -> Query {
    let mut query = Query::new().with("j_top", "OR");
    for component in components {
        counter += 1;
        query = query.with(format!("f{}", counter), "OP");
        counter += 1;
        query = query
            .with(format!("f{}", counter), "product")
            .with(format!("o{}", counter), "equals")
            .with(format!("v{}", counter), component.product.as_str());
        counter += 1;
        query = query
            .with(format!("f{}", counter), "component")
            .with(format!("o{}", counter), "equals")
            .with(format!("v{}", counter), component.component.as_str());
        counter += 1;
        query = query.with(format!("f{}", counter), "CP");
    }
    query
}

/// Human-facing buglist link for a query. The buglist UI names the status
/// field `bug_status`, unlike the REST search.
pub fn buglist_url(base: &Url, query: &Query) -> Result<Url> {
    let mut url = base.join("buglist.cgi")?;
    {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query.pairs() {
            let key = if key == "status" { "bug_status" } else { key };
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}
