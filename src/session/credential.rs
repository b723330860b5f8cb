//! Extracting the login credential from a confirmation URL.

use crate::error::{ChatRelayError, Result};
use crate::platform::Credential;

const USER_ID_KEY: &str = "DedeUserID";
const CSRF_KEY: &str = "bili_jct";
const SESSION_KEY: &str = "SESSDATA";

/// Parse the credential out of the query string of `url`.
///
/// Accepts absolute URLs, relative ones, or a bare query string. All three
/// parts must be present and non-empty.
pub fn parse_credential_url(url: &str) -> Result<Credential> {
    let query = url.split_once('?').map_or(url, |(_, query)| query);
    let parsed = reqwest::Url::parse(&format!("http://localhost/?{query}")).map_err(|e| {
        ChatRelayError::AuthFailure {
            message: format!("unreadable credential URL: {}", e),
        }
    })?;

    let mut user_id = String::new();
    let mut csrf = String::new();
    let mut session = String::new();
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            USER_ID_KEY => user_id = value.into_owned(),
            CSRF_KEY => csrf = value.into_owned(),
            SESSION_KEY => session = value.into_owned(),
            _ => {}
        }
    }

    let missing: Vec<&'static str> = [
        (USER_ID_KEY, &user_id),
        (CSRF_KEY, &csrf),
        (SESSION_KEY, &session),
    ]
    .into_iter()
    .filter(|(_, value)| value.is_empty())
    .map(|(key, _)| key)
    .collect();
    if !missing.is_empty() {
        return Err(ChatRelayError::IncompleteCredential { missing });
    }

    Ok(Credential {
        user_id,
        csrf,
        cookie: format!("{SESSION_KEY}={session}"),
    })
}
