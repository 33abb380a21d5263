//! # Captcha Challenges
//!
//! Arithmetic challenges whose answer is stored server-side (`captcha:<sid>`), bound to the
//! `__SGCaptcha` cookie. Answers are single use: checking consumes the stored value.
//! Rendering the challenge as an image is left to the client.

use crate::error::AuthError;
use lib_core::SharedKv;

const CAPTCHA_SESSION_LEN: usize = 32;

fn captcha_key(sid: &str) -> String {
    format!("captcha:{sid}")
}

#[derive(Debug, Clone)]
pub struct CaptchaChallenge {
    pub session_id: String,
    /// e.g. `"7 + 12"`.
    pub expression: String,
}

pub struct CaptchaService {
    kv: SharedKv,
    ttl_secs: u64,
}

impl CaptchaService {
    pub fn new(kv: SharedKv, ttl_secs: u64) -> Self {
        Self { kv, ttl_secs }
    }

    /// Generate a challenge, reusing `session_id` when the client already has one.
    pub async fn generate(&self, session_id: Option<&str>) -> Result<CaptchaChallenge, AuthError> {
        let session_id = match session_id.filter(|s| !s.is_empty()) {
            Some(sid) => sid.to_string(),
            None => lib_utils::random_key(CAPTCHA_SESSION_LEN),
        };

        let (expression, answer) = arithmetic_challenge();
        self.kv
            .set_ex(&captcha_key(&session_id), &answer.to_string(), self.ttl_secs)
            .await?;

        Ok(CaptchaChallenge {
            session_id,
            expression,
        })
    }

    /// Check `answer` against the stored one and consume it.
    pub async fn verify(&self, session_id: Option<&str>, answer: Option<i64>) -> Result<(), AuthError> {
        let Some(sid) = session_id.filter(|s| !s.is_empty()) else {
            return Err(AuthError::CaptchaMismatch);
        };

        let key = captcha_key(sid);
        let stored = self.kv.get(&key).await?;
        self.kv.del(&key).await?;

        match (stored.and_then(|s| s.parse::<i64>().ok()), answer) {
            (Some(expected), Some(given)) if expected == given => Ok(()),
            _ => Err(AuthError::CaptchaMismatch),
        }
    }
}

fn arithmetic_challenge() -> (String, i64) {
    let a = lib_utils::random_digits(1, 20);
    let b = lib_utils::random_digits(1, 20);
    match lib_utils::random_digits(0, 2) {
        0 => (format!("{a} + {b}"), a + b),
        1 => {
            let (hi, lo) = (a.max(b), a.min(b));
            (format!("{hi} - {lo}"), hi - lo)
        }
        _ => {
            let b = b % 10 + 1;
            (format!("{a} * {b}"), a * b)
        }
    }
}
