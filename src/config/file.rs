use crate::domain::model::{Component, Person};
use crate::utils::error::{ReportError, Result};
use crate::utils::validation::{validate_slug, validate_url, Validate};
use chrono::{Datelike, Local, NaiveDate};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    pub report: RangeConfig,
    #[serde(default)]
    pub bugzilla: BugzillaConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub people: Vec<Person>,
    #[serde(default)]
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RangeConfig {
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    /// Year used by the year-scoped index queries; defaults to the end
    /// date's year.
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BugzillaConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for BugzillaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://bugzilla.mozilla.org".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    /// Fixed delay between real search requests, to respect remote quota.
    pub request_delay_seconds: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            timeout_seconds: 30,
            request_delay_seconds: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: String,
    pub force: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: "cache".to_string(),
            force: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub dir: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            dir: "build".to_string(),
        }
    }
}

impl ReportConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// The reporting range; the end defaults to today.
    pub fn range(&self) -> (NaiveDate, NaiveDate) {
        let end = self
            .report
            .end_date
            .unwrap_or_else(|| Local::now().date_naive());
        (self.report.start_date, end)
    }

    pub fn year(&self) -> i32 {
        self.report.year.unwrap_or_else(|| self.range().1.year())
    }
}

impl Validate for ReportConfig {
    fn validate(&self) -> Result<()> {
        let (start, end) = self.range();
        if start > end {
            return Err(ReportError::InvalidRange {
                reason: format!("start {} is after end {}", start, end),
            });
        }

        validate_url("bugzilla.base_url", &self.bugzilla.base_url)?;
        validate_url("github.base_url", &self.github.base_url)?;

        let mut names = HashSet::new();
        for person in &self.people {
            validate_slug("people.name", &person.name)?;
            if person.bugzilla_email.is_empty() {
                return Err(ReportError::InvalidConfigValue {
                    field: "people.bugzilla_email".to_string(),
                    value: person.name.clone(),
                    reason: "Every person needs a Bugzilla email".to_string(),
                });
            }
            if !names.insert(person.name.as_str()) {
                return Err(ReportError::InvalidConfigValue {
                    field: "people.name".to_string(),
                    value: person.name.clone(),
                    reason: "Duplicate entry".to_string(),
                });
            }
        }

        let mut shorts = HashSet::new();
        for component in &self.components {
            validate_slug("components.short", &component.short)?;
            if !shorts.insert(component.short.as_str()) {
                return Err(ReportError::InvalidConfigValue {
                    field: "components.short".to_string(),
                    value: component.short.clone(),
                    reason: "Duplicate entry".to_string(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [report]
        start_date = "2024-01-01"
        end_date = "2024-06-30"
    "#;

    const FULL: &str = r#"
        [report]
        start_date = "2024-01-01"
        end_date = "2024-06-30"
        year = 2023

        [bugzilla]
        base_url = "https://bugzilla.example.org"

        [cache]
        dir = "my-cache"
        force = true

        [[people]]
        name = "ada"
        bugzilla_email = "ada@example.org"
        github = "ada-gh"

        [[people]]
        name = "brendan"
        bugzilla_email = "brendan@example.org"

        [[components]]
        product = "Toolkit"
        component = "Build Config"
        short = "build"
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = ReportConfig::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.bugzilla.base_url, "https://bugzilla.mozilla.org");
        assert_eq!(config.github.base_url, "https://api.github.com");
        assert_eq!(config.github.request_delay_seconds, 1);
        assert_eq!(config.cache.dir, "cache");
        assert_eq!(config.build.dir, "build");
        assert!(config.people.is_empty());
        assert_eq!(config.year(), 2024);
        config.validate().unwrap();
    }

    #[test]
    fn full_config_parses_people_and_components() {
        let config = ReportConfig::from_toml_str(FULL).unwrap();

        assert_eq!(config.people.len(), 2);
        assert_eq!(config.people[0].github.as_deref(), Some("ada-gh"));
        assert!(config.people[1].github.is_none());
        assert_eq!(config.components[0].short, "build");
        assert_eq!(config.year(), 2023);
        assert!(config.cache.force);
        config.validate().unwrap();
    }

    #[test]
    fn reversed_range_fails_validation() {
        let config = ReportConfig::from_toml_str(
            r#"
            [report]
            start_date = "2024-06-30"
            end_date = "2024-01-01"
        "#,
        )
        .unwrap();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ReportError::InvalidRange { .. }));
    }

    #[test]
    fn non_http_base_url_fails_validation() {
        let mut config = ReportConfig::from_toml_str(MINIMAL).unwrap();
        config.bugzilla.base_url = "ftp://bugzilla.example.org".to_string();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ReportError::InvalidConfigValue { .. }));
    }

    #[test]
    fn duplicate_person_names_fail_validation() {
        let mut config = ReportConfig::from_toml_str(FULL).unwrap();
        config.people[1].name = "ada".to_string();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ReportError::InvalidConfigValue { .. }));
    }

    #[test]
    fn person_name_with_path_separator_fails_validation() {
        let mut config = ReportConfig::from_toml_str(FULL).unwrap();
        config.people[0].name = "../ada".to_string();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ReportError::InvalidConfigValue { .. }));
    }

    #[test]
    fn missing_start_date_is_a_parse_error() {
        let err = ReportConfig::from_toml_str("[report]\n").unwrap_err();
        assert!(matches!(err, ReportError::Toml(_)));
    }
}
