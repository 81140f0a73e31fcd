//! TMDB remote lookups used to enrich catalog records.
//!
//! The pipeline talks to the remote side only through [`RemoteSource`], which
//! exposes the two independent lookups (movie detail and credits). The
//! production implementation is [`TmdbClient`]; tests plug in fakes.

use std::future::Future;

use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use reelfill_shared::{Participant, ReelfillError, Result, TmdbSettings};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("reelfill/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// RemoteSource
// ---------------------------------------------------------------------------

/// The two remote lookups keyed by remote id.
///
/// Each worker owns its own source, so implementations need not share
/// connections across workers.
pub trait RemoteSource: Send + Sync + 'static {
    /// Fetch title, synopsis, language, release date and poster.
    fn movie_detail(&self, remote_id: &str) -> impl Future<Output = Result<MovieDetail>> + Send;

    /// Fetch the ordered cast list.
    fn movie_credits(&self, remote_id: &str) -> impl Future<Output = Result<Vec<Participant>>> + Send;
}

/// Detail fields as they land on a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovieDetail {
    pub title: String,
    pub overview: String,
    pub language: String,
    pub release_date: String,
    /// Absolute poster URL; empty when the remote has no poster.
    pub poster_url: String,
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DetailResponse {
    #[serde(default)]
    original_title: Option<String>,
    #[serde(default)]
    original_language: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreditsResponse {
    #[serde(default)]
    cast: Vec<CastEntry>,
}

#[derive(Debug, Deserialize)]
struct CastEntry {
    #[serde(default)]
    character: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

// ---------------------------------------------------------------------------
// TmdbClient
// ---------------------------------------------------------------------------

/// HTTP client for the TMDB v3 API.
pub struct TmdbClient {
    client: Client,
    base_url: Url,
    image_base_url: String,
    api_key: String,
    language: String,
}

impl TmdbClient {
    /// Build a client with its own connection pool.
    pub fn new(settings: &TmdbSettings) -> Result<Self> {
        let base_url = Url::parse(&settings.base_url).map_err(|e| {
            ReelfillError::config(format!("invalid TMDB base URL '{}': {e}", settings.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ReelfillError::config(format!(
                "TMDB base URL cannot be a base: {base_url}"
            )));
        }

        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout);

        if let Some(proxy) = &settings.proxy {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| {
                ReelfillError::config(format!("invalid proxy '{proxy}': {e}"))
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| {
            ReelfillError::Network(format!("failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            client,
            base_url,
            image_base_url: settings.image_base_url.clone(),
            api_key: settings.api_key.clone(),
            language: settings.language.clone(),
        })
    }

    /// Join path segments onto the API root.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`: the base URL always has path segments.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// GET a JSON document, keeping the API key out of error messages.
    async fn get_json<T: DeserializeOwned>(
        &self,
        label: &str,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<T> {
        debug!(%label, "requesting");

        let response = self
            .client
            .get(url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(query)
            .send()
            .await
            .map_err(|e| ReelfillError::Network(format!("{label}: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReelfillError::Network(format!("{label}: HTTP {status}")));
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                ReelfillError::decode(label, e.without_url())
            } else {
                ReelfillError::Network(format!("{label}: body read failed: {}", e.without_url()))
            }
        })
    }

    fn poster_url(&self, poster_path: Option<String>) -> String {
        match poster_path {
            Some(path) if !path.is_empty() => format!("{}{path}", self.image_base_url),
            _ => String::new(),
        }
    }
}

impl RemoteSource for TmdbClient {
    #[instrument(skip(self))]
    async fn movie_detail(&self, remote_id: &str) -> Result<MovieDetail> {
        let label = format!("movie/{remote_id}");
        let url = self.endpoint(&["movie", remote_id]);
        let resp: DetailResponse = self
            .get_json(&label, url, &[("language", self.language.as_str())])
            .await?;

        Ok(MovieDetail {
            title: resp.original_title.unwrap_or_default(),
            overview: resp.overview.unwrap_or_default(),
            language: resp.original_language.unwrap_or_default(),
            release_date: resp.release_date.unwrap_or_default(),
            poster_url: self.poster_url(resp.poster_path),
        })
    }

    #[instrument(skip(self))]
    async fn movie_credits(&self, remote_id: &str) -> Result<Vec<Participant>> {
        let label = format!("movie/{remote_id}/credits");
        let url = self.endpoint(&["movie", remote_id, "credits"]);
        let resp: CreditsResponse = self.get_json(&label, url, &[]).await?;

        Ok(resp
            .cast
            .into_iter()
            .map(|c| Participant {
                character: c.character.unwrap_or_default(),
                name: c.name.unwrap_or_default(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base_url: &str) -> TmdbSettings {
        TmdbSettings {
            api_key: "test-key".into(),
            base_url: base_url.into(),
            image_base_url: "https://img.example.com/w300".into(),
            language: "zh-CN".into(),
            proxy: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn endpoint_keeps_api_version_prefix() {
        let client = TmdbClient::new(&settings("https://api.themoviedb.org/3")).unwrap();
        let url = client.endpoint(&["movie", "550", "credits"]);
        assert_eq!(url.as_str(), "https://api.themoviedb.org/3/movie/550/credits");
    }

    #[test]
    fn invalid_base_url_is_config_error() {
        let result = TmdbClient::new(&settings("not a url"));
        assert!(matches!(result, Err(ReelfillError::Config { .. })));
    }

    #[tokio::test]
    async fn detail_maps_fields() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/movie/862"))
            .and(query_param("api_key", "test-key"))
            .and(query_param("language", "zh-CN"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"original_title":"Toy Story","original_language":"en",
                    "overview":"Toys come alive.","release_date":"1995-10-30",
                    "poster_path":"/toy.jpg","budget":30000000}"#,
            ))
            .mount(&server)
            .await;

        let client = TmdbClient::new(&settings(&server.uri())).unwrap();
        let detail = client.movie_detail("862").await.expect("detail");

        assert_eq!(detail.title, "Toy Story");
        assert_eq!(detail.language, "en");
        assert_eq!(detail.overview, "Toys come alive.");
        assert_eq!(detail.release_date, "1995-10-30");
        assert_eq!(detail.poster_url, "https://img.example.com/w300/toy.jpg");
    }

    #[tokio::test]
    async fn detail_without_poster_has_empty_url() {
        let server = MockServer::start().await;

        Mock::given(path("/movie/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"original_title":"Untitled","poster_path":null}"#,
            ))
            .mount(&server)
            .await;

        let client = TmdbClient::new(&settings(&server.uri())).unwrap();
        let detail = client.movie_detail("1").await.expect("detail");
        assert_eq!(detail.title, "Untitled");
        assert!(detail.poster_url.is_empty());
    }

    #[tokio::test]
    async fn credits_preserve_order() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/movie/862/credits"))
            .and(query_param("api_key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"id":862,"cast":[
                    {"character":"Woody (voice)","name":"Tom Hanks"},
                    {"character":"Buzz Lightyear (voice)","name":"Tim Allen"},
                    {"character":null,"name":"Extra"}
                ]}"#,
            ))
            .mount(&server)
            .await;

        let client = TmdbClient::new(&settings(&server.uri())).unwrap();
        let cast = client.movie_credits("862").await.expect("credits");

        assert_eq!(cast.len(), 3);
        assert_eq!(cast[0].name, "Tom Hanks");
        assert_eq!(cast[1].character, "Buzz Lightyear (voice)");
        assert_eq!(cast[2].character, "");
    }

    #[tokio::test]
    async fn http_error_is_network_error() {
        let server = MockServer::start().await;

        Mock::given(path("/movie/404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = TmdbClient::new(&settings(&server.uri())).unwrap();
        let err = client.movie_detail("404").await.unwrap_err();

        assert!(matches!(err, ReelfillError::Network(_)));
        assert!(err.to_string().contains("HTTP 404"));
        assert!(!err.to_string().contains("test-key"));
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let server = MockServer::start().await;

        Mock::given(path("/movie/9/credits"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = TmdbClient::new(&settings(&server.uri())).unwrap();
        let err = client.movie_credits("9").await.unwrap_err();
        assert!(matches!(err, ReelfillError::Decode { .. }));
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;

        Mock::given(path("/movie/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{}")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let mut s = settings(&server.uri());
        s.timeout = Duration::from_millis(200);
        let client = TmdbClient::new(&s).unwrap();

        let err = client.movie_detail("slow").await.unwrap_err();
        assert!(matches!(err, ReelfillError::Network(_)));
    }
}
