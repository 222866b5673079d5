//! Client for the Fritz (SkyPortal) survey API

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::astro_math;
use crate::config::FritzSettings;
use crate::util::*;

/// Source lookups needed to plan and report observations
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    /// Right ascension and declination in degrees
    async fn radec(&self, ztf_id: &str) -> Result<(Degrees, Degrees)>;

    /// The most recent detection
    async fn latest_photometry(&self, ztf_id: &str) -> Result<Photometry>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Photometry {
    pub mag: f64,
    pub mjd: f64,
    pub band: String,
}

impl Photometry {
    pub fn days_ago(&self, now: DateTime<Utc>) -> f64 {
        astro_math::mjd(now) - self.mjd
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct SourceData {
    ra: Option<f64>,
    dec: Option<f64>,
}

#[derive(Deserialize)]
struct PhotometryPoint {
    mag: Option<f64>,
    mjd: f64,
    filter: String,
}

fn parse_radec(body: &str) -> Result<(Degrees, Degrees)> {
    let source: Envelope<SourceData> = serde_json::from_str(body)?;
    let missing = |field| Error::MissingField {
        service: "Fritz",
        field,
    };
    Ok((
        source.data.ra.ok_or_else(|| missing("ra"))?,
        source.data.dec.ok_or_else(|| missing("dec"))?,
    ))
}

/// Entries without a magnitude are non-detections; the last detection in API order wins
fn parse_latest_detection(ztf_id: &str, body: &str) -> Result<Photometry> {
    let points: Envelope<Vec<PhotometryPoint>> = serde_json::from_str(body)?;
    points
        .data
        .into_iter()
        .filter_map(|p| {
            p.mag.map(|mag| Photometry {
                mag,
                mjd: p.mjd,
                band: p.filter,
            })
        })
        .last()
        .ok_or_else(|| Error::EmptyPhotometry(ztf_id.to_string()))
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// 0.5 s, 1 s, 2 s, ...
fn backoff() -> impl Iterator<Item = Duration> {
    retry::delay::Exponential::from_millis(2).map(|delay| delay * 250)
}

pub struct FritzClient {
    http: reqwest::Client,
    base_url: String,
    max_retry: Duration,
    finder_image_size: u32,
}

impl FritzClient {
    pub fn new(settings: &FritzSettings, token: &str) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("token {}", token))
            .map_err(|_| Error::malformed("Fritz token", "<hidden>"))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            max_retry: Duration::from_secs(settings.max_retry_secs),
            finder_image_size: settings.finder_image_size,
        })
    }

    /// Basic API request.
    /// Transport errors, server errors and rate limiting are retried with exponential
    /// backoff until the configured retry time is used up. As such, the request
    /// should be idempotent.
    pub async fn api(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut delays = backoff();
        let mut waited = Duration::ZERO;

        loop {
            let mut request = self.http.request(method.clone(), &url);
            if let Some(body) = body {
                request = request.json(body);
            }

            let error = match request.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("{} {}: {}", method, url, response.status());
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let error = Error::Status {
                        url: url.clone(),
                        status,
                        body,
                    };
                    if !is_transient(status) {
                        return Err(error);
                    }
                    error
                }
                Err(e) => Error::Http(e),
            };

            let delay = delays.next().unwrap_or(self.max_retry);
            if waited + delay > self.max_retry {
                warn!(
                    "Request did not succeed within {} s: {}",
                    self.max_retry.as_secs(),
                    error
                );
                return Err(error);
            }
            warn!("Error querying Fritz: {} -- Retrying in {:?}", error, delay);
            tokio::time::sleep(delay).await;
            waited += delay;
        }
    }

    /// The finding chart of a source, as returned by the API (a PDF)
    pub async fn finding_chart(&self, ztf_id: &str) -> Result<Response> {
        self.api(
            Method::GET,
            &format!(
                "/sources/{}/finder?imsize={}",
                ztf_id, self.finder_image_size
            ),
            None,
        )
        .await
    }
}

#[async_trait]
impl SourceCatalog for FritzClient {
    async fn radec(&self, ztf_id: &str) -> Result<(Degrees, Degrees)> {
        let response = self
            .api(Method::GET, &format!("/sources/{}", ztf_id), None)
            .await?;
        parse_radec(&response.text().await?)
    }

    async fn latest_photometry(&self, ztf_id: &str) -> Result<Photometry> {
        let response = self
            .api(Method::GET, &format!("/sources/{}/photometry", ztf_id), None)
            .await?;
        parse_latest_detection(ztf_id, &response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{serve, CannedResponse};
    use chrono::TimeZone;

    const PHOTOMETRY: &str = r#"{"status": "success", "data": [
        {"mjd": 60170.2, "mag": 19.8, "filter": "ztfg"},
        {"mjd": 60171.3, "mag": 19.5, "filter": "ztfr"},
        {"mjd": 60179.3, "mag": null, "filter": "ztfg"}
    ]}"#;

    fn settings(base_url: &str, max_retry_secs: u64) -> FritzSettings {
        FritzSettings {
            base_url: base_url.to_string(),
            max_retry_secs,
            finder_image_size: 2,
        }
    }

    #[test]
    fn test_parse_radec() {
        let (ra, dec) =
            parse_radec(r#"{"data": {"id": "ZTF23aalftvv", "ra": 258.5355720, "dec": 81.0748332}}"#)
                .unwrap();
        assert_float_absolute_eq!(ra, 258.5355720);
        assert_float_absolute_eq!(dec, 81.0748332);

        assert!(matches!(
            parse_radec(r#"{"data": {"ra": 1.0, "dec": null}}"#),
            Err(Error::MissingField { field: "dec", .. })
        ));
        assert!(matches!(parse_radec("<html>"), Err(Error::Json(_))));
    }

    #[test]
    fn test_latest_detection() {
        let latest = parse_latest_detection("ZTF23aalftvv", PHOTOMETRY).unwrap();
        assert_eq!(
            latest,
            Photometry {
                mag: 19.5,
                mjd: 60171.3,
                band: "ztfr".to_string()
            }
        );

        let now = Utc.with_ymd_and_hms(2023, 8, 26, 0, 0, 0).unwrap();
        assert_float_absolute_eq!(latest.days_ago(now), 10.7, 1E-6);

        assert!(matches!(
            parse_latest_detection(
                "ZTF23aalftvv",
                r#"{"data": [{"mjd": 60179.3, "mag": null, "filter": "ztfg"}]}"#
            ),
            Err(Error::EmptyPhotometry(id)) if id == "ZTF23aalftvv"
        ));
    }

    #[tokio::test]
    async fn test_token_and_paths() {
        let (url, server) = serve(vec![
            CannedResponse::json(200, r#"{"data": {"ra": 10.5, "dec": -5.25}}"#),
            CannedResponse::json(200, PHOTOMETRY),
        ])
        .await;
        let client = FritzClient::new(&settings(&url, 0), "secret").unwrap();

        assert_eq!(client.radec("ZTF23aalftvv").await.unwrap(), (10.5, -5.25));
        assert_eq!(
            client.latest_photometry("ZTF23aalftvv").await.unwrap().band,
            "ztfr"
        );

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("GET /sources/ZTF23aalftvv HTTP/1.1"));
        assert!(requests[0]
            .to_lowercase()
            .contains("authorization: token secret"));
        assert!(requests[1].starts_with("GET /sources/ZTF23aalftvv/photometry HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let (url, server) = serve(vec![
            CannedResponse::json(503, "busy"),
            CannedResponse::json(200, r#"{"data": {"ra": 1.0, "dec": 2.0}}"#),
        ])
        .await;
        let client = FritzClient::new(&settings(&url, 10), "secret").unwrap();

        assert_eq!(client.radec("ZTF23aalftvv").await.unwrap(), (1.0, 2.0));
        assert_eq!(server.await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_client_errors_fail_fast() {
        let (url, server) = serve(vec![CannedResponse::json(404, "no such source")]).await;
        let client = FritzClient::new(&settings(&url, 600), "secret").unwrap();

        match client.radec("ZTF23aaaaaaa").await {
            Err(Error::Status { status, body, .. }) => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(body, "no such source");
            }
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }
        assert_eq!(server.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_time_is_bounded() {
        let (url, _server) = serve(vec![CannedResponse::json(500, "broken")]).await;
        let client = FritzClient::new(&settings(&url, 0), "secret").unwrap();

        assert!(matches!(
            client.radec("ZTF23aalftvv").await,
            Err(Error::Status { .. })
        ));
    }

    #[test]
    fn test_backoff() {
        let delays = backoff().take(4).collect::<Vec<_>>();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000)
            ]
        );
    }
}
