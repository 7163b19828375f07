//! Cookie jar threaded through the flow as an immutable value.
//!
//! Every request leg returns a new jar: the carried one merged with whatever
//! the response set. Later values win per name, first-seen order is kept.

use std::fmt;

use cookie::Cookie;
use reqwest::header::{HeaderMap, SET_COOKIE};

/// Ordered `name=value` pairs with last-write-wins per name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    pairs: Vec<(String, String)>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `Cookie` request header value (`a=1; b=2`).
    pub fn parse(header: &str) -> Self {
        let mut jar = Self::new();
        for cookie in Cookie::split_parse(header).filter_map(Result::ok) {
            jar.set(cookie.name(), cookie.value());
        }
        jar
    }

    /// Collect the cookies a response asked us to store.
    ///
    /// Each `Set-Cookie` header normally carries one cookie. Some proxies
    /// fold several into one comma-joined value; those are split apart so
    /// both shapes end up as the same `name=value` list.
    pub fn from_set_cookie(headers: &HeaderMap) -> Self {
        let values: Vec<&str> = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        Self::from_set_cookie_values(&values)
    }

    /// Same as [`CookieJar::from_set_cookie`] over raw header values.
    pub fn from_set_cookie_values(values: &[&str]) -> Self {
        let mut jar = Self::new();
        for value in values {
            for raw in split_folded(value) {
                match Cookie::parse(raw) {
                    Ok(cookie) => jar.set(cookie.name(), cookie.value()),
                    Err(e) => tracing::debug!("Ignoring Set-Cookie {raw:?}: {e}"),
                }
            }
        }
        jar
    }

    /// A new jar holding `self` overlaid with `newer`.
    pub fn merge(&self, newer: &CookieJar) -> CookieJar {
        let mut merged = self.clone();
        for (name, value) in &newer.pairs {
            merged.set(name, value);
        }
        merged
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Render as a `Cookie` request header value.
    pub fn header_value(&self) -> String {
        self.pairs
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn set(&mut self, name: &str, value: &str) {
        match self.pairs.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.pairs.push((name.to_string(), value.to_string())),
        }
    }
}

impl fmt::Display for CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header_value())
    }
}

/// Split a possibly folded `Set-Cookie` value into individual cookies.
///
/// A comma only starts a new cookie when the text after it looks like
/// `name=` before any `;`. That keeps `Expires=Wed, 21 Oct 2026` intact.
fn split_folded(value: &str) -> Vec<&str> {
    let mut cookies = Vec::new();
    let mut start = 0;
    for (idx, _) in value.match_indices(',') {
        let rest = &value[idx + 1..];
        let head = rest.split(';').next().unwrap_or("");
        let starts_cookie = head
            .split_once('=')
            .is_some_and(|(name, _)| !name.trim().is_empty() && !name.trim().contains(' '));
        if starts_cookie {
            cookies.push(value[start..idx].trim());
            start = idx + 1;
        }
    }
    cookies.push(value[start..].trim());
    cookies.retain(|c| !c.is_empty());
    cookies
}
