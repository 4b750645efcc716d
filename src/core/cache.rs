use crate::core::query::Query;
use crate::utils::error::Result;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFormat {
    Json,
    Csv,
}

impl CacheFormat {
    pub fn ext(&self) -> &'static str {
        match self {
            CacheFormat::Json => "json",
            CacheFormat::Csv => "csv",
        }
    }
}

/// How a run treats the on-disk cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Cache everything except the most recent two weeks of a bucketed
    /// range, so still-moving activity counts are always re-fetched.
    #[default]
    Normal,
    /// Cache every week, including the most recent two (the FORCE_CACHE
    /// override).
    ForceAll,
    /// Never read or write the cache.
    Bypass,
}

/// Whether the week at `index` out of `total` may be served from cache.
pub fn allow_cache(mode: CacheMode, index: usize, total: usize) -> bool {
    match mode {
        CacheMode::Normal => index + 2 < total,
        CacheMode::ForceAll => true,
        CacheMode::Bypass => false,
    }
}

/// Content-addressed, append-only response cache. Entries are keyed by the
/// canonical serialization of the query and are immutable once written;
/// there is no eviction or TTL.
#[derive(Debug, Clone)]
pub struct QueryCache {
    dir: PathBuf,
}

impl QueryCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn entry_path(&self, namespace: &str, query: &Query, format: CacheFormat) -> PathBuf {
        self.dir
            .join(format!("{}.{}", query.cache_key(namespace), format.ext()))
    }

    /// Returns the cached body for the query, or calls `fetch` and persists
    /// the result. With `allow_cache` false the cache is neither read nor
    /// written. A failed fetch leaves no entry behind.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        namespace: &str,
        query: &Query,
        format: CacheFormat,
        allow_cache: bool,
        fetch: F,
    ) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let path = self.entry_path(namespace, query, format);

        if allow_cache && path.exists() {
            tracing::debug!("cache hit: {}", path.display());
            return Ok(fs::read_to_string(&path)?);
        }
        if !allow_cache {
            tracing::debug!("not caching {} query", namespace);
        }

        let body = fetch().await?;

        if allow_cache {
            write_atomically(&path, &body)?;
        }

        Ok(body)
    }
}

/// Write via a temp file and rename, so a torn write is never visible as a
/// cache hit.
fn write_atomically(path: &Path, body: &str) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
