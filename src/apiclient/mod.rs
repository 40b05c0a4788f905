//! The rate-limited metadata API client contract (`spec.md` §1/§4.4):
//! throttle, validate, retry. Concrete HTTP transport (the actual
//! Discogs/Last.fm requests) is an external collaborator per §1's
//! scope note — implemented in `worker-runtime`'s concrete workers
//! against the `MetadataApiClient` trait defined here.

use crate::appdata::metadata::{query_variants, validate_duration_match, QueryArgs, ReleaseMatch};
use crate::name::{drop_media_type_labels, title_has_media_type_label};
use crate::rate_limit::RateLimiter;
use std::time::Duration;

/// One metadata API's search surface. Implementors perform the actual
/// HTTP request and map the response into candidate releases; this
/// trait only knows "given these query args and a title, return
/// candidates" — it does not know about rate limiting or retry, which
/// `find_best_match` layers on top.
#[async_trait::async_trait]
pub trait MetadataApiClient: Send + Sync {
    /// Name used as the `RateLimiter` key (`"discogs"`, `"lastfm"`).
    fn api_name(&self) -> &'static str;

    /// This API's documented minimum inter-call interval.
    fn min_interval(&self) -> Duration;

    /// Searches for `title` under `args`, inspecting at most 20 results
    /// (`spec.md` §6's rate-limit envelope) and returning them as
    /// candidate release matches (not yet validated against measured
    /// durations).
    async fn search(&self, title: &str, args: &QueryArgs) -> anyhow::Result<Vec<ReleaseMatch>>;
}

/// Drives the retry ladder of `spec.md` §4.4: progressively broader
/// query argument sets, additionally retried with media-type labels
/// stripped from the title, each search throttled through `limiter`.
/// Returns the first candidate whose track count and durations validate
/// against `measured_durations` (`spec.md` §8's ±2s rule), or `None` if
/// every variant was exhausted (the caller then records a
/// `FailedSearchLedger` entry).
pub async fn find_best_match(
    client: &dyn MetadataApiClient,
    limiter: &RateLimiter,
    label: &str,
    title: &str,
    year: Option<u32>,
    measured_durations: &[f64],
) -> anyhow::Result<Option<ReleaseMatch>> {
    let mut titles = vec![title.to_string()];
    if title_has_media_type_label(title) {
        titles.push(drop_media_type_labels(title));
    }

    for variant_title in &titles {
        for args in query_variants(label, year) {
            limiter.throttle(client.api_name(), client.min_interval()).await;
            let candidates = client.search(variant_title, &args).await?;
            for candidate in candidates {
                if validate_duration_match(measured_durations, &candidate.tracks) {
                    return Ok(Some(candidate));
                }
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubClient {
        calls: Arc<AtomicUsize>,
        accept_on_call: usize,
        tracks: Vec<f64>,
    }

    #[async_trait::async_trait]
    impl MetadataApiClient for StubClient {
        fn api_name(&self) -> &'static str {
            "discogs"
        }

        fn min_interval(&self) -> Duration {
            Duration::from_millis(1)
        }

        async fn search(&self, _title: &str, _args: &QueryArgs) -> anyhow::Result<Vec<ReleaseMatch>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == self.accept_on_call {
                Ok(vec![ReleaseMatch {
                    external_id: "1".into(),
                    title: "Pack Vol 1".into(),
                    tracks: self.tracks.clone(),
                    tags: vec![],
                    formats: vec![],
                }])
            } else {
                Ok(vec![])
            }
        }
    }

    #[tokio::test]
    async fn accepts_first_validating_candidate() {
        let client = StubClient { calls: Arc::new(AtomicUsize::new(0)), accept_on_call: 0, tracks: vec![212.0, 198.5] };
        let limiter = RateLimiter::new();
        let result = find_best_match(&client, &limiter, "Acme Sounds", "Pack Vol 1", None, &[212.0, 198.5])
            .await
            .unwrap();
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn retries_through_broader_query_variants() {
        let client = StubClient { calls: Arc::new(AtomicUsize::new(0)), accept_on_call: 2, tracks: vec![212.0] };
        let limiter = RateLimiter::new();
        let result = find_best_match(&client, &limiter, "Acme Sounds", "Pack Vol 1", None, &[212.0])
            .await
            .unwrap();
        assert!(result.is_some());
        assert!(client.calls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn returns_none_when_nothing_validates() {
        let client = StubClient { calls: Arc::new(AtomicUsize::new(0)), accept_on_call: 999, tracks: vec![212.0] };
        let limiter = RateLimiter::new();
        let result = find_best_match(&client, &limiter, "Acme Sounds", "Pack Vol 1", None, &[212.0])
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
