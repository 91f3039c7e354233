//! One-shot user messages carried across a redirect.
//!
//! Messages travel in a signed `flash` cookie and are cleared by the page
//! that displays them.

use crate::share::Signer;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Redirect, Response};
use tracing::debug;

pub const FLASH_COOKIE: &str = "flash";
const FLASH_SALT: &str = "flash";
const MAX_MESSAGES: usize = 10;
/// Browsers drop cookies past roughly 4 KB
const MAX_COOKIE_BYTES: usize = 3800;

#[derive(Clone)]
pub struct Flash {
    signer: Signer,
}

impl Flash {
    pub fn new(secret: &str) -> Self {
        Self {
            signer: Signer::new(secret, FLASH_SALT),
        }
    }

    /// Redirect to `to`, showing `messages` on the next rendered page.
    pub fn redirect(&self, to: &str, messages: &[String]) -> Response {
        let redirect = Redirect::to(to);
        if messages.is_empty() {
            return redirect.into_response();
        }

        match self.set_cookie(messages) {
            Some(cookie) => ([(SET_COOKIE, cookie)], redirect).into_response(),
            None => redirect.into_response(),
        }
    }

    /// Build the cookie from the newest messages that fit in
    /// [`MAX_COOKIE_BYTES`]. A lone message that is still too long is cut.
    fn set_cookie(&self, messages: &[String]) -> Option<HeaderValue> {
        let mut kept: Vec<String> =
            messages[messages.len().saturating_sub(MAX_MESSAGES)..].to_vec();

        loop {
            let cookie = self.cookie_header(&kept)?;
            if cookie.len() <= MAX_COOKIE_BYTES {
                return HeaderValue::from_str(&cookie).ok();
            }

            if kept.len() > 1 {
                kept.remove(0);
            } else {
                let message = kept.first_mut()?;
                let chars = message.chars().count();
                if chars == 0 {
                    return None;
                }
                *message = message.chars().take(chars / 2).collect();
            }
        }
    }

    fn cookie_header(&self, messages: &[String]) -> Option<String> {
        let json = serde_json::to_vec(messages).ok()?;
        Some(format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            FLASH_COOKIE,
            self.signer.sign(&json)
        ))
    }

    /// Cookie header that removes pending messages
    pub fn clear_cookie() -> HeaderValue {
        HeaderValue::from_static("flash=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
    }

    /// Read pending messages from the request cookies. Unsigned or
    /// unreadable cookies yield no messages.
    pub fn take(&self, headers: &HeaderMap) -> Vec<String> {
        let Some(value) = cookie_value(headers, FLASH_COOKIE) else {
            return Vec::new();
        };

        match self.signer.unsign(&value) {
            Ok(json) => serde_json::from_slice(&json).unwrap_or_default(),
            Err(e) => {
                debug!(error = %e, "Ignoring invalid flash cookie");
                Vec::new()
            }
        }
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
