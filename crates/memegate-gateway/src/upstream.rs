//! Clients for the two upstream services behind `/memes`.
//!
//! Responses are decoded into typed schemas that only name the fields we read;
//! anything missing falls through to the next candidate instead of panicking.

use futures::future::BoxFuture;
use rand::seq::IndexedRandom;
use serde::Deserialize;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::metrics::{UPSTREAM_FAILURES, UPSTREAM_LATENCY};

pub const GEOCODER: &str = "geocoder";
pub const MEDIA_SEARCH: &str = "media_search";

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{service} request failed: {source}")]
    Request {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned status {status}")]
    Status {
        service: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("{service} returned an unreadable body: {source}")]
    Decode {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("no valid location found for the provided coordinates")]
    NoLocation,

    #[error("no media found for query: {0}")]
    NoMedia(String),
}

impl UpstreamError {
    /// Which upstream produced the error.
    pub fn service(&self) -> &'static str {
        match self {
            UpstreamError::Request { service, .. }
            | UpstreamError::Status { service, .. }
            | UpstreamError::Decode { service, .. } => service,
            UpstreamError::NoLocation => GEOCODER,
            UpstreamError::NoMedia(_) => MEDIA_SEARCH,
        }
    }
}

/// The metered operation's two collaborators.
///
/// Object-safe so the gateway can hold any implementation behind an `Arc`.
pub trait MemeSource: Send + Sync {
    /// Reverse-geocode coordinates into a place name.
    fn resolve_location<'a>(
        &'a self,
        lat: &'a str,
        lon: &'a str,
    ) -> BoxFuture<'a, Result<String, UpstreamError>>;

    /// Search for media matching `query` and return one URL.
    fn search_media<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<String, UpstreamError>>;
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    #[serde(default)]
    components: GeocodeComponents,
}

#[derive(Debug, Default, Deserialize)]
struct GeocodeComponents {
    city: Option<String>,
    town: Option<String>,
    state: Option<String>,
}

impl GeocodeResponse {
    /// City, else town, else state of the first result.
    fn place_name(self) -> Option<String> {
        let components = self.results.into_iter().next()?.components;
        components
            .city
            .or(components.town)
            .or(components.state)
            .filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    images: Option<HitImages>,
}

#[derive(Debug, Deserialize)]
struct HitImages {
    original: Option<Rendition>,
}

#[derive(Debug, Deserialize)]
struct Rendition {
    url: Option<String>,
}

impl SearchResponse {
    fn original_urls(self) -> Vec<String> {
        self.data
            .into_iter()
            .filter_map(|hit| hit.images?.original?.url)
            .filter(|url| !url.is_empty())
            .collect()
    }
}

fn pick_random(urls: &[String]) -> Option<String> {
    urls.choose(&mut rand::rng()).cloned()
}

/// OpenCage + Giphy over HTTPS.
pub struct HttpMemeSource {
    client: reqwest::Client,
    opencage_url: String,
    opencage_api_key: String,
    giphy_url: String,
    giphy_api_key: String,
    giphy_limit: u32,
}

impl HttpMemeSource {
    pub fn from_config(config: &GatewayConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            opencage_url: config.opencage_url.clone(),
            opencage_api_key: config.opencage_api_key.clone(),
            giphy_url: config.giphy_url.clone(),
            giphy_api_key: config.giphy_api_key.clone(),
            giphy_limit: config.giphy_limit,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        service: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, UpstreamError> {
        let timer = UPSTREAM_LATENCY.with_label_values(&[service]).start_timer();
        let result = async {
            let response = request
                .send()
                .await
                .map_err(|source| UpstreamError::Request { service, source })?;

            let status = response.status();
            if !status.is_success() {
                return Err(UpstreamError::Status { service, status });
            }

            response
                .json::<T>()
                .await
                .map_err(|source| UpstreamError::Decode { service, source })
        }
        .await;
        timer.observe_duration();

        if let Err(ref e) = result {
            UPSTREAM_FAILURES.with_label_values(&[service]).inc();
            tracing::warn!(service, error = %e, "upstream request failed");
        }
        result
    }
}

impl MemeSource for HttpMemeSource {
    fn resolve_location<'a>(
        &'a self,
        lat: &'a str,
        lon: &'a str,
    ) -> BoxFuture<'a, Result<String, UpstreamError>> {
        Box::pin(async move {
            let request = self.client.get(&self.opencage_url).query(&[
                ("q", format!("{lat},{lon}")),
                ("key", self.opencage_api_key.clone()),
            ]);
            let body: GeocodeResponse = self.get_json(GEOCODER, request).await?;
            body.place_name().ok_or(UpstreamError::NoLocation)
        })
    }

    fn search_media<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<String, UpstreamError>> {
        Box::pin(async move {
            let request = self.client.get(&self.giphy_url).query(&[
                ("api_key", self.giphy_api_key.clone()),
                ("q", query.to_string()),
                ("limit", self.giphy_limit.to_string()),
            ]);
            let body: SearchResponse = self.get_json(MEDIA_SEARCH, request).await?;
            let urls = body.original_urls();
            pick_random(&urls).ok_or_else(|| UpstreamError::NoMedia(query.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geocode(json: serde_json::Value) -> Option<String> {
        serde_json::from_value::<GeocodeResponse>(json)
            .unwrap()
            .place_name()
    }

    #[test]
    fn test_place_name_prefers_city_then_town_then_state() {
        let all = serde_json::json!({"results": [{"components": {
            "city": "Lisbon", "town": "Belém", "state": "Lisboa"
        }}]});
        assert_eq!(geocode(all).as_deref(), Some("Lisbon"));

        let town = serde_json::json!({"results": [{"components": {
            "town": "Sintra", "state": "Lisboa"
        }}]});
        assert_eq!(geocode(town).as_deref(), Some("Sintra"));

        let state = serde_json::json!({"results": [{"components": {"state": "Alentejo"}}]});
        assert_eq!(geocode(state).as_deref(), Some("Alentejo"));
    }

    #[test]
    fn test_place_name_missing() {
        assert_eq!(geocode(serde_json::json!({"results": []})), None);
        assert_eq!(geocode(serde_json::json!({})), None);
        assert_eq!(
            geocode(serde_json::json!({"results": [{"components": {"country": "Portugal"}}]})),
            None
        );
        assert_eq!(geocode(serde_json::json!({"results": [{}]})), None);
    }

    #[test]
    fn test_original_urls_skips_malformed_hits() {
        let body: SearchResponse = serde_json::from_value(serde_json::json!({"data": [
            {"images": {"original": {"url": "https://media.example/a.gif"}}},
            {"images": {"original": {}}},
            {"images": {}},
            {},
            {"images": {"original": {"url": "https://media.example/b.gif"}}}
        ]}))
        .unwrap();
        assert_eq!(
            body.original_urls(),
            vec![
                "https://media.example/a.gif".to_string(),
                "https://media.example/b.gif".to_string()
            ]
        );
    }

    #[test]
    fn test_pick_random() {
        assert_eq!(pick_random(&[]), None);
        let urls = vec!["a".to_string(), "b".to_string()];
        for _ in 0..20 {
            let picked = pick_random(&urls).unwrap();
            assert!(urls.contains(&picked));
        }
    }

    #[test]
    fn test_error_service_labels() {
        assert_eq!(UpstreamError::NoLocation.service(), GEOCODER);
        assert_eq!(UpstreamError::NoMedia("cats".into()).service(), MEDIA_SEARCH);
    }
}
