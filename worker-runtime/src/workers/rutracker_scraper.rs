//! The `rutracker_scraper` Worker: scrapes RuTracker's search results
//! page for a release matching an asset's cname, per `spec.md` §4.4.
//! Grounded on
//! `original_source/interfaces/scrapers/RuTracker.py`'s `query_url`/
//! `result_rows`/`name`/`tags`/`download_count`/`site_id`/`size`
//! selectors, reimplemented against the `scraper` crate (the Python
//! original uses BeautifulSoup; `scraper`'s CSS-selector API is its
//! closest Rust counterpart). This is a new dependency introduced to
//! satisfy the HTML-scraping need here, not a pattern already present in
//! the teacher tree, which has no scraping code of its own.
//!
//! RuTracker listings carry no per-track durations, so `find_best_match`'s
//! duration-validation path does not apply here (see DESIGN.md's open
//! question decision) — this worker runs a simpler single-search
//! acceptance rule directly: the first result row is accepted as the
//! match.

use async_trait::async_trait;
use scraper::{Html, Selector};
use sonicat::appdata::metadata::ReleaseMatch;
use sonicat::name::divide_cname;
use sonicat::router::AppType;
use sonicat::task::{Task, TaskResult};

fn query_url(title: &str) -> String {
    format!("https://rutracker.org/forum/tracker.php?nm={}", urlencoding(&format!("{title} flac")))
}

fn urlencoding(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_string() } else { format!("%{:02X}", c as u32) })
        .collect()
}

/// Parses the first result row out of a RuTracker search results page,
/// or `None` if the page has no `#search-results` table or no rows.
fn first_result(html: &str) -> Option<ReleaseMatch> {
    let document = Html::parse_document(html);
    let row_selector = Selector::parse("#search-results table tbody tr").ok()?;
    let row = document.select(&row_selector).next()?;

    let title_selector = Selector::parse(".t-title").ok()?;
    let title = row.select(&title_selector).next().map(|e| e.text().collect::<String>()).unwrap_or_default();

    let tag_selector = Selector::parse(".t-tags .tg").ok()?;
    let tags: Vec<String> = row.select(&tag_selector).map(|e| e.text().collect::<String>().to_lowercase()).collect();

    let site_id = row.value().attr("data-topic_id").unwrap_or_default().to_string();

    Some(ReleaseMatch { external_id: site_id, title, tracks: Vec::new(), tags, formats: Vec::new() })
}

pub struct RutrackerClient {
    http: reqwest::Client,
    base_url: String,
}

impl RutrackerClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http, base_url: "https://rutracker.org".to_string() }
    }

    pub fn with_base_url(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }

    async fn search(&self, title: &str) -> anyhow::Result<Option<ReleaseMatch>> {
        let url = format!("{}/forum/tracker.php?nm={}", self.base_url, urlencoding(&format!("{title} flac")));
        let resp = self.http.get(&url).send().await?;
        let html = resp.error_for_status()?.text().await?;
        Ok(first_result(&html))
    }
}

pub struct RutrackerScraperWorker {
    client: RutrackerClient,
}

impl RutrackerScraperWorker {
    pub fn new(client: RutrackerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl crate::Worker for RutrackerScraperWorker {
    fn app_name(&self) -> &'static str {
        "rutracker_scraper"
    }

    fn app_type(&self) -> AppType {
        AppType::Metadata
    }

    async fn run_task(&self, mut task: Task) -> Task {
        let cname = task.args.get("cname").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let (_label, title, _note) = divide_cname(&cname);

        let result = match self.client.search(&title).await {
            Ok(Some(release)) => TaskResult::ok(serde_json::json!({ "matched": true, "release": release })),
            Ok(None) => TaskResult::ok(serde_json::json!({ "matched": false })),
            Err(e) => TaskResult::fail(e.to_string()),
        };
        task.results.push(result);
        task
    }
}
