use std::time::Duration;

use meshgen_contracts::data_uri;
use meshgen_contracts::media::{MediaPart, MediaSource};
use meshgen_contracts::GenerationError;
use reqwest::blocking::Client as HttpClient;
use reqwest::Url;

use crate::backends::truncate_text;

/// Content type assumed when neither the download nor the part names one.
pub const FALLBACK_CONTENT_TYPE: &str = "video/mp4";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Single GET of a vendor-hosted file. Non-2xx responses are returned as-is
/// and judged by [`materialize`].
pub trait MediaFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<FetchedMedia, GenerationError>;
}

/// Fetches vendor URLs with the API key appended as a `key` query parameter.
pub struct HttpFetcher {
    http: HttpClient,
    api_key: Option<String>,
}

impl HttpFetcher {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| HttpClient::new());
        Self { http, api_key }
    }

    fn authenticated_url(&self, url: &str) -> Result<Url, GenerationError> {
        let mut parsed = Url::parse(url).map_err(|err| GenerationError::Download {
            url: redact_credentials(url),
            status: None,
            reason: format!("invalid URL: {err}"),
        })?;
        if let Some(key) = self.api_key.as_deref() {
            parsed.query_pairs_mut().append_pair("key", key);
        }
        Ok(parsed)
    }
}

impl MediaFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedMedia, GenerationError> {
        let target = self.authenticated_url(url)?;
        let response = self
            .http
            .get(target)
            .send()
            .map_err(|err| GenerationError::Download {
                url: redact_credentials(url),
                status: None,
                reason: err.without_url().to_string(),
            })?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .map_err(|err| GenerationError::Download {
                url: redact_credentials(url),
                status: Some(status),
                reason: format!("failed reading body: {}", err.without_url()),
            })?
            .to_vec();
        Ok(FetchedMedia {
            status,
            content_type,
            bytes,
        })
    }
}

/// Returns the part as a self-contained data URI.
///
/// Inline parts pass through untouched. Remote parts are fetched exactly
/// once; there is no retry.
pub fn materialize(
    part: &MediaPart,
    fetcher: &dyn MediaFetcher,
) -> Result<String, GenerationError> {
    let url = match &part.source {
        MediaSource::Inline(uri) => return Ok(uri.clone()),
        MediaSource::Url(url) => url,
    };
    let fetched = fetcher.fetch(url)?;
    if !(200..300).contains(&fetched.status) {
        let body = String::from_utf8_lossy(&fetched.bytes);
        let detail = truncate_text(body.trim(), 200);
        return Err(GenerationError::Download {
            url: redact_credentials(url),
            status: Some(fetched.status),
            reason: if detail.is_empty() {
                format!("HTTP {}", fetched.status)
            } else {
                format!("HTTP {}: {detail}", fetched.status)
            },
        });
    }
    if fetched.bytes.is_empty() {
        return Err(GenerationError::Download {
            url: redact_credentials(url),
            status: Some(fetched.status),
            reason: "response body was empty".to_string(),
        });
    }
    let content_type = resolve_content_type(fetched.content_type.as_deref(), &part.content_type);
    Ok(data_uri::encode(content_type, &fetched.bytes))
}

/// Header first, then the part's own type, then [`FALLBACK_CONTENT_TYPE`].
/// A generic header never replaces the type the part was matched by.
fn resolve_content_type<'a>(header: Option<&'a str>, part_type: &'a str) -> &'a str {
    let header = header.and_then(bare_mime);
    let part_type = bare_mime(part_type);
    match (header, part_type) {
        (Some(header), Some(part_type)) if GENERIC_CONTENT_TYPES.contains(&header) => part_type,
        (Some(header), _) => header,
        (None, Some(part_type)) => part_type,
        (None, None) => FALLBACK_CONTENT_TYPE,
    }
}

const GENERIC_CONTENT_TYPES: [&str; 3] = [
    "application/octet-stream",
    "binary/octet-stream",
    "text/plain",
];

fn bare_mime(value: &str) -> Option<&str> {
    value
        .split(';')
        .next()
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
}

/// Masks the value of any `key` query parameter.
pub fn redact_credentials(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let pairs: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, _)) if name.eq_ignore_ascii_case("key") => format!("{name}=<redacted>"),
            _ => pair.to_string(),
        })
        .collect();
    format!("{base}?{}", pairs.join("&"))
}
