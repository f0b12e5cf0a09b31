use reqwest::{Response, Url};

use citabot_store::StoreError;

pub(crate) fn request_error(error: reqwest::Error, timeout_secs: u64) -> StoreError {
    if error.is_timeout() {
        StoreError::Timeout(timeout_secs)
    } else {
        StoreError::Unavailable(error.to_string())
    }
}

/// Passes successful responses through and turns the rest into `Rejected`.
pub(crate) async fn ensure_success(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(StoreError::Rejected { status: status.as_u16(), message: message.trim().to_owned() })
}

/// Appends percent-encoded path segments to `base`.
pub(crate) fn join_segments(base: &str, segments: &[&str]) -> Result<Url, StoreError> {
    let mut url = Url::parse(base)
        .map_err(|error| StoreError::Unavailable(format!("invalid base url `{base}`: {error}")))?;
    url.path_segments_mut()
        .map_err(|_| StoreError::Unavailable(format!("base url `{base}` cannot carry a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
