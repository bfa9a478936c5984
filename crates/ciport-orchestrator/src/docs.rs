//! Documentation cache and summarizer
//!
//! Validator diagnostics often point at a documentation page. For every
//! distinct (url, message) pair the page is fetched once and summarized once
//! against the failing candidate; the summary is cached for the rest of the
//! run (and, through [`DocCache::save`], for later runs).
//!
//! Cache misses are resolved through a bounded fan-out. Results are inserted
//! in sorted key order after the fan-out completes, so a fan-out of one
//! produces exactly the same cache as any wider one.

use async_trait::async_trait;
use ciport_agent::LlmClient;
use ciport_core::config::{DialectSettings, DocsSettings};
use ciport_core::{CiportError, DocCacheEntry, DocKey, Result};
use ciport_validation::extract_doc_references;
use futures::stream::{self, StreamExt};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::prompt::build_summary_prompt;

/// Fetch collaborator: `fetch(url) -> plain text`
///
/// Must not fail. Any problem is reported as placeholder text so the
/// summarizer can still say something about the error.
#[async_trait]
pub trait DocFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> String;
}

/// Placeholder returned when a page cannot be fetched
pub fn unavailable_placeholder(url: &str, reason: &str) -> String {
    format!("[documentation unavailable for {}: {}]", url, reason)
}

/// Fetches documentation pages over HTTP and reduces them to plain text
#[derive(Debug, Clone)]
pub struct HttpDocFetcher {
    client: reqwest::Client,
    max_chars: usize,
}

impl HttpDocFetcher {
    pub fn new(timeout: Duration, max_chars: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ciport/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CiportError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, max_chars })
    }

    pub fn from_settings(settings: &DocsSettings) -> Result<Self> {
        Self::new(Duration::from_secs(settings.timeout_secs), settings.max_chars)
    }

    async fn try_fetch(&self, url: &str) -> std::result::Result<String, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }

        let body = response.text().await.map_err(|e| e.to_string())?;
        Ok(html_to_text(&body, self.max_chars))
    }
}

#[async_trait]
impl DocFetcher for HttpDocFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> String {
        match self.try_fetch(url).await {
            Ok(text) => {
                debug!("Fetched {} ({} chars)", url, text.len());
                text
            }
            Err(reason) => {
                warn!("Documentation fetch failed for {}: {}", url, reason);
                unavailable_placeholder(url, &reason)
            }
        }
    }
}

fn hidden_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--.*?-->")
            .expect("hidden block regex is valid")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex is valid"))
}

/// Reduce an HTML page to whitespace-collapsed plain text of at most `max_chars`
pub fn html_to_text(html: &str, max_chars: usize) -> String {
    let text = hidden_block_re().replace_all(html, " ");
    let text = tag_re().replace_all(&text, " ");

    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_chars).collect()
}

/// Summaries keyed by (url, message)
///
/// Append-only: the first summary recorded for a key is kept.
#[derive(Debug, Clone, Default)]
pub struct DocCache {
    entries: Vec<DocCacheEntry>,
    index: HashMap<DocKey, usize>,
}

impl DocCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from prior entries (duplicates keep the first)
    pub fn seed(entries: impl IntoIterator<Item = DocCacheEntry>) -> Self {
        let mut cache = Self::new();
        for entry in entries {
            cache.insert(entry);
        }
        cache
    }

    /// Load a persisted cache; a missing file is an empty cache
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(Self::new());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let entries: Vec<DocCacheEntry> = serde_json::from_str(&content)?;
        debug!("Loaded {} cached doc summaries from {}", entries.len(), path.display());
        Ok(Self::seed(entries))
    }

    /// Persist the cache as a JSON array
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Record an entry unless its key is already present. Returns whether it was added.
    pub fn insert(&mut self, entry: DocCacheEntry) -> bool {
        let key = entry.key();
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(entry);
        true
    }

    pub fn get(&self, key: &DocKey) -> Option<&DocCacheEntry> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, key: &DocKey) -> bool {
        self.index.contains_key(key)
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[DocCacheEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Documentation resolved for one failed attempt
#[derive(Debug, Clone, Default)]
pub struct DocResolution {
    /// Every pair referenced by the diagnostics, in key order
    pub entries: Vec<DocCacheEntry>,
    /// Pairs fetched and summarized during this call
    pub fetched: usize,
    /// Pairs served from the cache
    pub cached: usize,
    pub cost_usd: f64,
}

/// Fetch and summarize one page for one error
async fn summarize<L, F>(
    llm: &L,
    fetcher: &F,
    dialects: &DialectSettings,
    key: &DocKey,
    candidate: &str,
) -> Result<(DocCacheEntry, f64)>
where
    L: LlmClient + ?Sized,
    F: DocFetcher + ?Sized,
{
    let page = fetcher.fetch(&key.url).await;
    let prompt = build_summary_prompt(dialects, &key.message, &key.url, &page, candidate);

    let completion = llm.complete(&prompt).await.map_err(|e| {
        CiportError::Summarization(format!("Summarizing {} failed: {}", key.url, e))
    })?;

    let entry = DocCacheEntry {
        url: key.url.clone(),
        message: key.message.clone(),
        summary: completion.text,
    };
    Ok((entry, completion.cost_usd))
}

/// Resolve documentation for every (url, message) pair in `diagnostics`
///
/// Cached pairs are reused without network access. Each missing pair is
/// fetched and summarized once, then recorded in `cache`. A summarization
/// failure is fatal, but every summary that did complete is still cached.
pub async fn process<L, F>(
    llm: &L,
    fetcher: &F,
    cache: &mut DocCache,
    dialects: &DialectSettings,
    diagnostics: &str,
    candidate: &str,
    concurrency: usize,
) -> Result<DocResolution>
where
    L: LlmClient + ?Sized,
    F: DocFetcher + ?Sized,
{
    let keys = extract_doc_references(diagnostics);
    let misses: Vec<&DocKey> = keys.iter().filter(|key| !cache.contains(key)).collect();

    let mut resolution = DocResolution {
        cached: keys.len() - misses.len(),
        ..Default::default()
    };

    if !misses.is_empty() {
        info!(
            "Resolving {} documentation references ({} cached)",
            misses.len(),
            resolution.cached
        );
    }

    let results: Vec<Result<(DocCacheEntry, f64)>> = stream::iter(
        misses
            .iter()
            .map(|key| summarize(llm, fetcher, dialects, key, candidate)),
    )
    .buffered(concurrency.max(1))
    .collect()
    .await;

    let mut first_error = None;
    for result in results {
        match result {
            Ok((entry, cost)) => {
                resolution.cost_usd += cost;
                if cache.insert(entry) {
                    resolution.fetched += 1;
                }
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }

    resolution.entries = keys
        .iter()
        .filter_map(|key| cache.get(key).cloned())
        .collect();

    Ok(resolution)
}
