pub mod ai;
pub mod db;

use crate::errors::Nl2SqlError;
use reqwest::{Response, StatusCode};

/// Maps a non-success HTTP response to the matching error variant.
pub(crate) async fn ensure_success(
    service: &'static str,
    response: Response,
) -> Result<Response, Nl2SqlError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Nl2SqlError::Authentication(
            format!("{service} returned {status}: {error_text}"),
        )),
        _ => Err(Nl2SqlError::ExternalService(format!(
            "{service} returned {status}: {error_text}"
        ))),
    }
}
