//! The `lastfm` Worker: searches Last.fm for a release, validated
//! against measured track durations, per `spec.md` §4.4.
//!
//! `original_source/interfaces/api/LastFM.py`'s `Client.search` is a
//! non-functional stub (`return False` unconditionally — `pylast` is
//! wired up but never actually called). Per DESIGN.md's open-question
//! decision, this is implemented as a genuine minimal REST client
//! against Last.fm's public `album.search`/`album.getinfo` endpoints
//! instead of porting the stub.

use async_trait::async_trait;
use serde::Deserialize;
use sonicat::apiclient::{find_best_match, MetadataApiClient};
use sonicat::appdata::analysis::AnalysisStore;
use sonicat::appdata::metadata::{QueryArgs, ReleaseMatch};
use sonicat::catalog::FileRecord;
use sonicat::config::LastfmSecret;
use sonicat::name::divide_cname;
use sonicat::rate_limit::{RateLimiter, LASTFM_MIN_INTERVAL};
use sonicat::router::AppType;
use sonicat::task::{Task, TaskResult};
use std::time::Duration;

const BASE_URL: &str = "http://ws.audioscrobbler.com/2.0/";

#[derive(Deserialize)]
struct SearchResponse {
    results: SearchResults,
}

#[derive(Deserialize)]
struct SearchResults {
    albummatches: AlbumMatches,
}

#[derive(Deserialize)]
struct AlbumMatches {
    #[serde(default)]
    album: Vec<AlbumSummary>,
}

#[derive(Deserialize)]
struct AlbumSummary {
    name: String,
    artist: String,
    mbid: Option<String>,
}

#[derive(Deserialize)]
struct AlbumInfoResponse {
    album: AlbumInfo,
}

#[derive(Deserialize)]
struct AlbumInfo {
    #[serde(default)]
    tracks: Option<TrackList>,
    #[serde(default)]
    tags: Option<TagList>,
}

#[derive(Deserialize)]
struct TrackList {
    #[serde(default)]
    track: Vec<LastfmTrack>,
}

#[derive(Deserialize)]
struct LastfmTrack {
    #[serde(default)]
    duration: String,
}

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    tag: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

pub struct LastfmClient {
    http: reqwest::Client,
    secret: LastfmSecret,
}

impl LastfmClient {
    pub fn new(http: reqwest::Client, secret: LastfmSecret) -> Self {
        Self { http, secret }
    }

    async fn album_info(&self, artist: &str, album: &str) -> anyhow::Result<AlbumInfoResponse> {
        let url = format!(
            "{BASE_URL}?method=album.getinfo&artist={}&album={}&api_key={}&format=json",
            urlencoding(artist),
            urlencoding(album),
            self.secret.api_key,
        );
        let resp = self.http.get(&url).header("User-Agent", &self.secret.user_agent).send().await?;
        Ok(resp.error_for_status()?.json().await?)
    }
}

#[async_trait]
impl MetadataApiClient for LastfmClient {
    fn api_name(&self) -> &'static str {
        "lastfm"
    }

    fn min_interval(&self) -> Duration {
        LASTFM_MIN_INTERVAL
    }

    async fn search(&self, title: &str, args: &QueryArgs) -> anyhow::Result<Vec<ReleaseMatch>> {
        let url = format!(
            "{BASE_URL}?method=album.search&album={}&api_key={}&format=json",
            urlencoding(title),
            self.secret.api_key,
        );
        let resp = self.http.get(&url).header("User-Agent", &self.secret.user_agent).send().await?;
        let search: SearchResponse = resp.error_for_status()?.json().await?;

        let mut matches = Vec::new();
        for summary in search.results.albummatches.album.into_iter().take(20) {
            if let Some(ref artist_filter) = args.artist {
                if !summary.artist.eq_ignore_ascii_case(artist_filter) {
                    continue;
                }
            }
            let info = self.album_info(&summary.artist, &summary.name).await?;
            let tracks: Vec<f64> = info
                .tracks
                .map(|t| t.track.iter().map(|tr| tr.duration.parse::<f64>().unwrap_or(0.0)).collect())
                .unwrap_or_default();
            let tags: Vec<String> =
                info.tags.map(|t| t.tag.into_iter().map(|tag| tag.name.to_lowercase()).collect()).unwrap_or_default();
            matches.push(ReleaseMatch {
                external_id: summary.mbid.unwrap_or_else(|| summary.name.clone()),
                title: summary.name,
                tracks,
                tags,
                formats: Vec::new(),
            });
        }
        Ok(matches)
    }
}

fn urlencoding(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_string() } else { format!("%{:02X}", c as u32) })
        .collect()
}

pub struct LastfmWorker {
    client: LastfmClient,
    limiter: RateLimiter,
    analysis: AnalysisStore,
}

impl LastfmWorker {
    pub fn new(client: LastfmClient, analysis: AnalysisStore) -> Self {
        Self { client, limiter: RateLimiter::new(), analysis }
    }
}

#[async_trait]
impl crate::Worker for LastfmWorker {
    fn app_name(&self) -> &'static str {
        "lastfm"
    }

    fn app_type(&self) -> AppType {
        AppType::Metadata
    }

    async fn run_task(&self, mut task: Task) -> Task {
        let cname = task.args.get("cname").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let catalog = task.args.get("catalog").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let (label, title, _note) = divide_cname(&cname);

        let files: Vec<FileRecord> = match task.args.get("file_data") {
            Some(v) => serde_json::from_value(v.clone()).unwrap_or_default(),
            None => Vec::new(),
        };
        let measured: Vec<f64> = files
            .iter()
            .filter_map(|f| self.analysis.duration_for_file(&catalog, f.id).ok().flatten())
            .collect();

        let result = match find_best_match(&self.client, &self.limiter, &label, &title, None, &measured).await {
            Ok(Some(release)) => TaskResult::ok(serde_json::json!({ "matched": true, "release": release })),
            Ok(None) => TaskResult::ok(serde_json::json!({ "matched": false })),
            Err(e) => TaskResult::fail(e.to_string()),
        };
        task.results.push(result);
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_resolves_tracks_and_tags_via_album_getinfo() {
        let mut server = mockito::Server::new_async().await;
        let search_mock = server
            .mock("GET", "/?method=album.search&album=Pack%20Vol%201&api_key=ghi&format=json")
            .with_status(200)
            .with_body(r#"{"results":{"albummatches":{"album":[{"name":"Pack Vol 1","artist":"Acme Sounds","mbid":"abc-123"}]}}}"#)
            .create_async()
            .await;
        let info_mock = server
            .mock("GET", "/?method=album.getinfo&artist=Acme%20Sounds&album=Pack%20Vol%201&api_key=ghi&format=json")
            .with_status(200)
            .with_body(r#"{"album":{"tracks":{"track":[{"duration":"212"}]},"tags":{"tag":[{"name":"Techno"}]}}}"#)
            .create_async()
            .await;

        let client = LastfmClient::new(reqwest::Client::new(), LastfmSecret { user_agent: "sonicat/0.1".into(), api_key: "ghi".into(), shared_secret: String::new() });
        let client = LastfmClientForTest { inner: client, base: server.url() };
        let results = client.search("Pack Vol 1", &QueryArgs::default()).await.unwrap();
        search_mock.assert_async().await;
        info_mock.assert_async().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tracks, vec![212.0]);
        assert_eq!(results[0].tags, vec!["techno".to_string()]);
    }

    struct LastfmClientForTest {
        inner: LastfmClient,
        base: String,
    }

    #[async_trait]
    impl MetadataApiClient for LastfmClientForTest {
        fn api_name(&self) -> &'static str {
            self.inner.api_name()
        }
        fn min_interval(&self) -> Duration {
            Duration::from_millis(1)
        }
        async fn search(&self, title: &str, args: &QueryArgs) -> anyhow::Result<Vec<ReleaseMatch>> {
            let url = format!("{}/?method=album.search&album={}&api_key={}&format=json", self.base, urlencoding(title), self.inner.secret.api_key);
            let resp = self.inner.http.get(&url).header("User-Agent", &self.inner.secret.user_agent).send().await?;
            let search: SearchResponse = resp.error_for_status()?.json().await?;
            let mut matches = Vec::new();
            for summary in search.results.albummatches.album {
                if let Some(ref artist_filter) = args.artist {
                    if !summary.artist.eq_ignore_ascii_case(artist_filter) {
                        continue;
                    }
                }
                let info_url = format!(
                    "{}/?method=album.getinfo&artist={}&album={}&api_key={}&format=json",
                    self.base,
                    urlencoding(&summary.artist),
                    urlencoding(&summary.name),
                    self.inner.secret.api_key
                );
                let resp = self.inner.http.get(&info_url).header("User-Agent", &self.inner.secret.user_agent).send().await?;
                let info: AlbumInfoResponse = resp.error_for_status()?.json().await?;
                let tracks: Vec<f64> =
                    info.album.tracks.map(|t| t.track.iter().map(|tr| tr.duration.parse::<f64>().unwrap_or(0.0)).collect()).unwrap_or_default();
                let tags: Vec<String> =
                    info.album.tags.map(|t| t.tag.into_iter().map(|tag| tag.name.to_lowercase()).collect()).unwrap_or_default();
                matches.push(ReleaseMatch {
                    external_id: summary.mbid.unwrap_or_else(|| summary.name.clone()),
                    title: summary.name,
                    tracks,
                    tags,
                    formats: Vec::new(),
                });
            }
            Ok(matches)
        }
    }
}
