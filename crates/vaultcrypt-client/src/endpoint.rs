//! Endpoint URL checks shared by the token and vault clients.

/// Returned when an endpoint URL is neither `https://` nor local `http://`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "insecure endpoint URL rejected: {0}. \
     Only https:// URLs are allowed (http:// is permitted for localhost/127.0.0.1 only)"
)]
pub struct InsecureEndpoint(pub String);

/// Validate that a URL uses `https://`, allowing `http://` only for localhost.
pub(crate) fn validate_url_scheme(url: &str) -> Result<(), InsecureEndpoint> {
    if url.starts_with("https://") {
        return Ok(());
    }
    if let Some(host_part) = url.strip_prefix("http://") {
        let host = host_part.split('/').next().unwrap_or("");
        let host_no_port = host.split(':').next().unwrap_or("");
        if host_no_port == "localhost" || host_no_port == "127.0.0.1" {
            return Ok(());
        }
    }
    Err(InsecureEndpoint(url.to_owned()))
}
