//! # Cookies
//!
//! Reading request cookies and building `Set-Cookie` values.
//!
//! Non-refresh cookies take `Secure`/`SameSite` from [`CookiePolicy`] (dev vs. prod). The
//! refresh cookie is always `HttpOnly; Secure; SameSite=Strict`.

use axum::http::{
    header::{COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use lib_core::Config;

/// Value of the first cookie called `name`, across all `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

/// Environment-configured attributes for non-refresh cookies.
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    pub secure: bool,
    pub same_site: String,
}

impl CookiePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            secure: config.secure_cookies,
            same_site: config.cookie_same_site.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SetCookie {
    name: String,
    value: String,
    max_age: Option<i64>,
    domain: Option<String>,
    http_only: bool,
    secure: bool,
    same_site: Option<String>,
}

impl SetCookie {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            max_age: None,
            domain: None,
            http_only: true,
            secure: false,
            same_site: None,
        }
    }

    /// The refresh cookie: HttpOnly, Secure, SameSite=Strict.
    pub fn strict(name: &str, value: &str) -> Self {
        let mut cookie = Self::new(name, value);
        cookie.secure = true;
        cookie.same_site = Some("Strict".to_string());
        cookie
    }

    /// Cookie that clears `name` on the client.
    pub fn expired(name: &str, policy: &CookiePolicy) -> Self {
        Self::new(name, "").policy(policy).max_age(0)
    }

    pub fn policy(mut self, policy: &CookiePolicy) -> Self {
        self.secure = policy.secure;
        self.same_site = Some(policy.same_site.clone());
        self
    }

    pub fn max_age(mut self, secs: i64) -> Self {
        self.max_age = Some(secs);
        self
    }

    pub fn domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    /// Readable from client scripts (double-submit CSRF cookie).
    pub fn readable(mut self) -> Self {
        self.http_only = false;
        self
    }

    pub fn render(&self) -> String {
        let mut out = format!("{}={}; Path=/", self.name, self.value);
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={max_age}"));
        }
        if let Some(domain) = &self.domain {
            out.push_str(&format!("; Domain={domain}"));
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if let Some(same_site) = &self.same_site {
            out.push_str(&format!("; SameSite={same_site}"));
        }
        out
    }

    /// Append as a `Set-Cookie` header. Values that are not valid header text are skipped.
    pub fn append_to(&self, headers: &mut HeaderMap) {
        match HeaderValue::from_str(&self.render()) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(_) => tracing::warn!(cookie = %self.name, "[COOKIE] Invalid cookie value, not set"),
        }
    }
}
