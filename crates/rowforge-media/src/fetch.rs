//! HTTP image fetcher

use rowforge_common::{Result, RowforgeError};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
const DEFAULT_ACCEPT: &str = "image/avif,image/webp,image/png,image/*,*/*;q=0.8";

/// Downloads originals over HTTP
///
/// Some hosts reject bare clients, so requests carry browser-like headers
/// and a 403 is retried once with the image's own origin as referrer.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: reqwest::Client,
}

impl ImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| RowforgeError::Network(format!("HTTP client build failed: {}", e)))?;

        Ok(Self { client })
    }

    /// Fetch one image, returning its raw bytes
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, DEFAULT_ACCEPT)
            .send()
            .await
            .map_err(|e| RowforgeError::Network(format!("GET {} failed: {}", url, e)))?;

        let response = if response.status() == reqwest::StatusCode::FORBIDDEN {
            warn!(url, "Got 403, retrying with referrer");
            let referrer = origin_of(url);
            self.client
                .get(url)
                .header(reqwest::header::ACCEPT, DEFAULT_ACCEPT)
                .header(reqwest::header::REFERER, referrer)
                .send()
                .await
                .map_err(|e| RowforgeError::Network(format!("GET {} failed: {}", url, e)))?
        } else {
            response
        };

        if !response.status().is_success() {
            return Err(RowforgeError::Network(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }

        if let Some(content_type) = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !content_type.starts_with("image/")
                && !content_type.starts_with("application/octet-stream")
            {
                return Err(RowforgeError::Network(format!(
                    "GET {} returned non-image content type '{}'",
                    url, content_type
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RowforgeError::Network(format!("Reading body of {} failed: {}", url, e)))?;

        if bytes.is_empty() {
            return Err(RowforgeError::Network(format!("GET {} returned empty body", url)));
        }

        debug!(url, size = bytes.len(), "Fetched image");
        Ok(bytes.to_vec())
    }
}

/// Scheme + host (+ non-default port) of a URL, used as the fallback referrer
fn origin_of(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => match parsed.port() {
                Some(port) => format!("{}://{}:{}/", parsed.scheme(), host, port),
                None => format!("{}://{}/", parsed.scheme(), host),
            },
            None => url.to_string(),
        },
        Err(_) => url.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    fn fetcher() -> ImageFetcher {
        ImageFetcher::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(PNG_BYTES),
            )
            .mount(&server)
            .await;

        let bytes = fetcher().fetch(&format!("{}/a.png", server.uri())).await.unwrap();
        assert_eq!(bytes, PNG_BYTES);
    }

    #[tokio::test]
    async fn test_forbidden_retried_with_referrer() {
        let server = MockServer::start().await;
        let origin = format!("{}/", server.uri());

        // Without a referrer the host refuses; with one it serves.
        Mock::given(method("GET"))
            .and(path("/a.png"))
            .and(header("referer", origin.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(PNG_BYTES),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/a.png"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let bytes = fetcher().fetch(&format!("{}/a.png", server.uri())).await.unwrap();
        assert_eq!(bytes, PNG_BYTES);
    }

    #[tokio::test]
    async fn test_non_image_content_type_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html>not found</html>"),
            )
            .mount(&server)
            .await;

        let result = fetcher().fetch(&format!("{}/a.png", server.uri())).await;
        assert!(matches!(result, Err(RowforgeError::Network(_))));
    }

    #[tokio::test]
    async fn test_empty_body_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.png"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("content-type", "image/png"),
            )
            .mount(&server)
            .await;

        let result = fetcher().fetch(&format!("{}/a.png", server.uri())).await;
        assert!(matches!(result, Err(RowforgeError::Network(_))));
    }

    #[test]
    fn test_origin_of() {
        assert_eq!(origin_of("https://cdn.example.com/img/a.png"), "https://cdn.example.com/");
        assert_eq!(origin_of("http://127.0.0.1:8080/a.png"), "http://127.0.0.1:8080/");
    }
}
