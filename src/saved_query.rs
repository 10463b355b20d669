use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::body::{FilterGroup, QueryBody};
use crate::date_range::DateRange;
use crate::dates::resolve_date;
use crate::error::{Error, Result};
use crate::granularity::Granularity;

const EXTENSION: &str = "toml";

/// A query saved under the queries directory as `<name>.toml`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SavedQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<String>,
    /// `"<dimension> <operator> <expression>"` each.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_row: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granularity: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedQueryFile {
    query: SavedQuery,
}

impl SavedQuery {
    /// Builds the base request body. Dates may be relative ("2 weeks ago");
    /// a missing end date means `today`.
    pub fn to_body(&self, today: NaiveDate) -> Result<QueryBody> {
        let start = self
            .start_date
            .as_deref()
            .ok_or_else(|| Error::InvalidQuery("start-date is missing".to_string()))?;
        let start = resolve_date(start, today)?;
        let end = match self.end_date.as_deref() {
            Some(end) => resolve_date(end, today)?,
            None => today,
        };

        let filters = self
            .filters
            .iter()
            .map(|f| f.parse::<FilterGroup>())
            .collect::<Result<Vec<_>>>()?;

        let mut body = QueryBody::new(DateRange::new(start, end)?)
            .with_dimensions(self.dimensions.iter().cloned())
            .with_filters(filters);
        if let Some(search_type) = &self.search_type {
            body = body.with_search_type(search_type.clone());
        }
        if let Some(row_limit) = self.row_limit {
            body = body.with_row_limit(row_limit);
        }
        if let Some(start_row) = self.start_row {
            body = body.with_start_row(start_row);
        }
        Ok(body)
    }

    pub fn granularity(&self) -> Result<Option<Granularity>> {
        self.granularity.as_deref().map(str::parse::<Granularity>).transpose()
    }
}

/// Directory of saved queries.
pub struct QueryStore {
    dir: PathBuf,
}

impl QueryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.queries`
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".queries"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        let file = if name.ends_with(".toml") {
            name.to_string()
        } else {
            format!("{}.{}", name, EXTENSION)
        };
        self.dir.join(file)
    }

    pub fn load(&self, name: &str) -> Result<SavedQuery> {
        let path = self.path_for(name);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::InvalidQuery(format!("could not read query {}: {}", path.display(), e))
        })?;
        let file: SavedQueryFile = toml::from_str(&content)?;
        Ok(file.query)
    }

    /// Refuses to overwrite an existing query.
    pub fn save(&self, name: &str, query: &SavedQuery) -> Result<PathBuf> {
        let path = self.path_for(name);
        if path.exists() {
            return Err(Error::InvalidQuery(format!(
                "a query named {:?} already exists",
                name
            )));
        }
        std::fs::create_dir_all(&self.dir)?;
        let content = toml::to_string(&SavedQueryFile {
            query: query.clone(),
        })?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Names of saved queries, without extension, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        std::fs::remove_file(self.path_for(name))?;
        Ok(())
    }
}
