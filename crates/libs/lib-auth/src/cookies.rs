//! Cookie names shared by the login handlers and the guards.

/// `Bearer <access jwt>`.
pub const COOKIE_JWT: &str = "__SGJwt";
/// Refresh jwt. HttpOnly, Secure, SameSite=Strict.
pub const COOKIE_REFRESH_JWT: &str = "__SGRefreshJwt";
/// Opaque session id.
pub const COOKIE_SESSION: &str = "__SGSession";
/// Session id the CSRF token is bound to.
pub const COOKIE_CSRF_SESSION: &str = "__SGCsrfSession";
/// Readable CSRF token, for the cookie-echo variant.
pub const COOKIE_CSRF: &str = "__SGCsrf";
/// Session id the captcha answer is bound to.
pub const COOKIE_CAPTCHA: &str = "__SGCaptcha";
