//! Redirect resolution
//!
//! Drives repeated single calls following 3xx responses:
//! ISSUING -> (REDIRECTED -> ISSUING)* -> DONE. Hops run strictly in sequence.

use serde::{Deserialize, Serialize};
use url::Url;

use super::client::Execute;
use super::request::{HeaderList, PreparedRequest, RequestBody};
use super::response::{HttpResponse, ResponseBody};
use crate::error::{CourierError, HttpError};

/// Headers dropped from every follow-up hop
const STRIPPED_ON_REDIRECT: &[&str] = &["content-length", "host", "content-type"];

/// One request/response pair within a redirect chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectHop {
    /// URL that was requested
    pub url: String,

    /// Method the hop was sent with
    pub method: String,

    /// Response received
    pub response: HttpResponse,

    /// Extracted `Location` value
    pub location: Option<String>,
}

impl RedirectHop {
    pub fn status(&self) -> u16 {
        self.response.status
    }

    pub fn headers(&self) -> &HeaderList {
        &self.response.headers
    }

    pub fn body(&self) -> &ResponseBody {
        &self.response.body
    }
}

/// Ordered hop history (oldest first). Never empty; the final response is
/// the last hop's response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectChain {
    hops: Vec<RedirectHop>,
}

impl RedirectChain {
    pub fn hops(&self) -> &[RedirectHop] {
        &self.hops
    }

    pub fn final_hop(&self) -> &RedirectHop {
        &self.hops[self.hops.len() - 1]
    }

    pub fn final_response(&self) -> &HttpResponse {
        &self.final_hop().response
    }

    /// URL the final response was served from
    pub fn final_url(&self) -> &str {
        &self.final_hop().url
    }

    /// Number of redirects that were followed
    pub fn redirects_followed(&self) -> usize {
        self.hops.len() - 1
    }

    pub fn into_hops(self) -> Vec<RedirectHop> {
        self.hops
    }
}

/// Follows redirects on top of a single-call executor
pub struct RedirectResolver<E> {
    executor: E,
    max_redirects: usize,
}

impl<E: Execute> RedirectResolver<E> {
    pub fn new(executor: E, max_redirects: usize) -> Self {
        Self {
            executor,
            max_redirects,
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    /// Execute `original` and follow redirects.
    ///
    /// Exceeding the redirect limit, a 3xx without `Location` or a `Location`
    /// that cannot be resolved ends the chain normally. A failed hop aborts
    /// the whole resolution.
    pub async fn resolve(&self, original: &PreparedRequest) -> Result<RedirectChain, CourierError> {
        let mut hops: Vec<RedirectHop> = Vec::new();
        let mut current = original.clone();

        loop {
            let response = self.executor.execute(&current, hops.len()).await?;
            let location = response.location().map(str::to_string);
            let status = response.status;

            hops.push(RedirectHop {
                url: current.url.clone(),
                method: current.method.clone(),
                response,
                location: location.clone(),
            });

            let location = match location {
                Some(location)
                    if original.follow_redirects
                        && (300..400).contains(&status)
                        && hops.len() <= self.max_redirects =>
                {
                    location
                }
                _ => break,
            };

            let next = match next_request(original, &current, status, &location) {
                Ok(next) => next,
                Err(e) => {
                    tracing::warn!(
                        request_id = %original.id,
                        hop = hops.len(),
                        status,
                        location = %location,
                        error = %e,
                        "Unresolvable redirect target, ending chain"
                    );
                    break;
                }
            };
            tracing::debug!(
                request_id = %original.id,
                hop = hops.len(),
                status,
                from = %current.url,
                to = %next.url,
                "Following redirect"
            );
            current = next;
        }

        if original.follow_redirects
            && hops.len() > self.max_redirects
            && hops[hops.len() - 1].response.is_redirect()
        {
            tracing::info!(
                request_id = %original.id,
                max_redirects = self.max_redirects,
                "Redirect limit reached, returning last response"
            );
        }

        Ok(RedirectChain { hops })
    }
}

/// Resolve a `Location` value against the URL that produced it
pub fn resolve_location(base: &str, location: &str) -> Result<String, HttpError> {
    let location = location.trim();

    if has_scheme(location) {
        return Url::parse(location)
            .map(String::from)
            .map_err(|e| HttpError::InvalidUrl(format!("{} ({})", location, e)));
    }

    let base = Url::parse(base).map_err(|e| HttpError::InvalidUrl(format!("{} ({})", base, e)))?;
    base.join(location)
        .map(String::from)
        .map_err(|e| HttpError::InvalidUrl(format!("{} ({})", location, e)))
}

fn has_scheme(location: &str) -> bool {
    match location.split_once(':') {
        Some((scheme, _)) => {
            let mut chars = scheme.chars();
            chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Derive the next hop's request.
///
/// 302 and 303 switch to GET without a body; other statuses keep method and
/// body. Headers restart from the caller's original set minus framing headers.
pub fn next_request(
    original: &PreparedRequest,
    current: &PreparedRequest,
    status: u16,
    location: &str,
) -> Result<PreparedRequest, HttpError> {
    let url = resolve_location(&current.url, location)?;

    let (method, body) = match status {
        302 | 303 => ("GET".to_string(), RequestBody::None),
        _ => (current.method.clone(), current.body.clone()),
    };

    let mut headers = original.headers.clone();
    for name in STRIPPED_ON_REDIRECT {
        headers.remove(name);
    }

    Ok(PreparedRequest {
        id: original.id.clone(),
        method,
        url,
        headers,
        body,
        follow_redirects: original.follow_redirects,
        emit_events: original.emit_events,
    })
}
