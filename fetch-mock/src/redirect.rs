use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use http::Method;
use url::Url;

use fetch_mock_core::MockResponse;

use crate::error::{FetchError, MAX_REDIRECTS};
use crate::request::{CredentialsMode, FetchRequest};

/// Computes the follow-up request for a 3xx response, or `None` when the
/// response carries no `Location` and is returned to the caller as-is.
///
/// 301/302/303 rewrite the method to GET and drop the body; 307/308
/// preserve both. The chase is bounded at 20 hops and any URL seen twice
/// is a loop. A cross-origin hop drops `Authorization`, and carrying
/// `credentials: include` across origins is refused outright.
pub(crate) fn next_request(
    request: &FetchRequest,
    response: &MockResponse,
    chain: &mut Vec<Url>,
) -> Result<Option<FetchRequest>, FetchError> {
    let location = match response.location() {
        Some(location) => location.to_string(),
        None => return Ok(None),
    };

    chain.push(request.url.clone());
    if chain.len() > MAX_REDIRECTS {
        return Err(FetchError::TooManyRedirects);
    }

    let next = request
        .url
        .join(&location)
        .map_err(|_| FetchError::InvalidUrl(location))?;
    if chain.contains(&next) {
        return Err(FetchError::RedirectLoop(next));
    }

    let mut follow_up = request.clone();
    follow_up.url = next.clone();

    if matches!(response.status(), 301 | 302 | 303) {
        follow_up.method = Method::GET;
        follow_up.body = None;
        follow_up.headers.remove(CONTENT_TYPE);
        follow_up.headers.remove(CONTENT_LENGTH);
    }

    if next.origin() != request.url.origin() {
        follow_up.headers.remove(AUTHORIZATION);
        if follow_up.credentials == CredentialsMode::Include {
            return Err(FetchError::CredentialedCrossOriginRedirect(next));
        }
    }

    Ok(Some(follow_up))
}
