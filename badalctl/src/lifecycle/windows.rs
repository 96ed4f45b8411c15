//! Pure window math for the token lifecycle.
//!
//! All expiry decisions reduce to the dual rule: a token that has been
//! activated lives for the form window (extended while an OAuth round-trip
//! is flagged); a token that was never activated lives for the activation
//! window measured from send time. Keeping this in one place lets both the
//! request path and the sweeps agree on what "expired" means.

use chrono::{DateTime, Duration, Utc};

use crate::config::WindowsConfig;
use crate::db::models::email_tokens::EmailToken;

#[derive(Debug, Clone, Copy)]
pub struct Windows {
    activation: Duration,
    form: Duration,
    oauth_form: Duration,
    otp_ttl: Duration,
}

impl Windows {
    pub fn from_config(config: &WindowsConfig) -> Self {
        Self {
            activation: Duration::from_std(config.activation).unwrap_or_else(|_| Duration::hours(24)),
            form: Duration::from_std(config.form).unwrap_or_else(|_| Duration::minutes(10)),
            oauth_form: Duration::from_std(config.oauth_form).unwrap_or_else(|_| Duration::minutes(30)),
            otp_ttl: Duration::from_std(config.otp_ttl).unwrap_or_else(|_| Duration::hours(1)),
        }
    }

    /// How long the form stays open once activated.
    pub fn form_window(&self, oauth_in_progress: bool) -> Duration {
        if oauth_in_progress { self.oauth_form } else { self.form }
    }

    pub fn form(&self) -> Duration {
        self.form
    }

    pub fn activation(&self) -> Duration {
        self.activation
    }

    /// When this token stops being usable (and reopenable).
    pub fn expiry_time(&self, token: &EmailToken) -> DateTime<Utc> {
        match token.activated_at {
            Some(activated_at) => activated_at + self.form_window(token.oauth_in_progress),
            None => token.sent_at + self.activation,
        }
    }

    /// The dual expiry rule shared by activation, validation, submission and
    /// the reopen grace check.
    pub fn is_expired(&self, token: &EmailToken, now: DateTime<Utc>) -> bool {
        now > self.expiry_time(token)
    }

    /// OTP freshness: a phone verification older than the TTL cannot back a
    /// submission.
    pub fn otp_fresh(&self, phone_verified_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(phone_verified_at) <= self.otp_ttl
    }
}
