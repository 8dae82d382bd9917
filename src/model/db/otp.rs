use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

/// An outstanding one-time passcode for an alumnus.
///
/// Only an HMAC of the code is kept. Each student has at most one session;
/// issuing a new code replaces the old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpSession {
    pub student_id: String,
    /// Hex-encoded HMAC-SHA256 of the code.
    pub code_hmac: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub expire_at: DateTime<Utc>,
    pub used: bool,
    /// Wrong codes presented against this session so far.
    #[serde(default)]
    pub attempts: u32,
}

impl OtpSession {
    /// Wrong guesses allowed before a session is burnt.
    pub const MAX_ATTEMPTS: u32 = 5;

    pub fn new(student_id: String, code_hmac: String, expire_at: DateTime<Utc>) -> Self {
        Self {
            student_id,
            code_hmac,
            expire_at,
            used: false,
            attempts: 0,
        }
    }

    /// Can this session still accept a code at `now`?
    pub fn live(&self, now: DateTime<Utc>) -> bool {
        !self.used && self.attempts < Self::MAX_ATTEMPTS && now < self.expire_at
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn sessions_die_when_used_expired_or_guessed_at() {
        let now = Utc::now();
        let mut session = OtpSession::new("BU/2015/0421".to_string(), "abc".to_string(), now);
        assert!(!session.live(now));

        session.expire_at = now + Duration::minutes(10);
        assert!(session.live(now));

        session.attempts = OtpSession::MAX_ATTEMPTS;
        assert!(!session.live(now));

        session.attempts = 0;
        session.used = true;
        assert!(!session.live(now));
    }
}
