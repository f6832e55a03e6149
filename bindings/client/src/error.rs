use reqwest::Response;
use truapi_core::prelude::LaunchError;

/// Translate a transport failure of the named operation into a [LaunchError].
///
/// The service answers bad credentials with a redirect loop, so running out of redirects is
/// reported as an authentication problem rather than a remote failure.
pub fn handle_http_err(operation: &str, err: reqwest::Error) -> LaunchError {
    if err.is_redirect() {
        return LaunchError::redirect_limit();
    }

    LaunchError::remote(operation, err.status().map(|s| s.as_u16()), err.to_string())
}

/// Pass a successful response through, or turn any other status into a remote failure that
/// carries the response body for diagnostics.
pub async fn check_response(operation: &str, response: Response) -> Result<Response, LaunchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let cause = if body.trim().is_empty() {
        format!("status {status}")
    } else {
        format!("status {status}: {}", body.trim())
    };

    Err(LaunchError::remote(operation, Some(status.as_u16()), cause))
}
