use crate::config::AuthConfig;
use crate::error::AuthError;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TOKEN_TTL: Duration = Duration::hours(2);
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::seconds(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // Session subject (user email)
    pub exp: i64,     // Expiration time
    pub iat: i64,     // Issued at
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Time left before expiry; negative once expired.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at() - now
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Why a presented token was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    Malformed,
    SignatureMismatch,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    Absent,
    Invalid(TokenRejection),
    Valid(Claims),
}

impl TokenStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, TokenStatus::Valid(_))
    }

    pub fn claims(&self) -> Option<&Claims> {
        match self {
            TokenStatus::Valid(claims) => Some(claims),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshDecision {
    pub should_issue_new: bool,
    /// Expiry of the presented token when it is still valid.
    pub current_expiry: Option<DateTime<Utc>>,
    pub subject: Option<String>,
}

/// Issues and checks the signed `token` cookie value.
///
/// Keys are derived once from the configured secret. Every check is a pure
/// function of the token and the clock; nothing is stored server-side, so
/// a token stays usable until it expires even after logout.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    refresh_threshold: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration, refresh_threshold: Duration) -> Result<Self, AuthError> {
        if secret.trim().is_empty() {
            return Err(AuthError::SigningError("signing secret is empty".into()));
        }
        if ttl <= Duration::zero() {
            return Err(AuthError::SigningError("token ttl must be positive".into()));
        }

        // Expiry is compared against the caller's clock in `validate_at`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
            refresh_threshold,
        })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let ttl = Duration::try_seconds(config.token_ttl_secs)
            .ok_or_else(|| AuthError::SigningError("token ttl out of range".into()))?;
        let refresh_threshold = Duration::try_seconds(config.refresh_threshold_secs)
            .ok_or_else(|| AuthError::SigningError("refresh threshold out of range".into()))?;

        Self::new(&config.jwt_secret, ttl, refresh_threshold)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, subject: &str) -> Result<IssuedToken, AuthError> {
        self.issue_at(subject, Utc::now())
    }

    pub fn issue_at(&self, subject: &str, now: DateTime<Utc>) -> Result<IssuedToken, AuthError> {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AuthError::SigningError("token expiry out of range".into()))?;
        let claims = Claims {
            sub: subject.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(IssuedToken { token, expires_at: claims.expires_at() })
    }

    pub fn validate(&self, token: Option<&str>) -> TokenStatus {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: Option<&str>, now: DateTime<Utc>) -> TokenStatus {
        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => return TokenStatus::Absent,
        };

        let claims = match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                return TokenStatus::Invalid(match e.kind() {
                    ErrorKind::InvalidSignature => TokenRejection::SignatureMismatch,
                    _ => TokenRejection::Malformed,
                })
            }
        };

        if now >= claims.expires_at() {
            return TokenStatus::Invalid(TokenRejection::Expired);
        }

        TokenStatus::Valid(claims)
    }

    pub fn decide_refresh(&self, existing: Option<&str>) -> RefreshDecision {
        self.decide_refresh_at(existing, Utc::now())
    }

    /// A token that cannot be used (missing, forged, expired) counts as no
    /// session at all; rejecting it is the gate's job, not this one's.
    pub fn decide_refresh_at(&self, existing: Option<&str>, now: DateTime<Utc>) -> RefreshDecision {
        match self.validate_at(existing, now) {
            TokenStatus::Valid(claims) => RefreshDecision {
                should_issue_new: claims.remaining_at(now) < self.refresh_threshold,
                current_expiry: Some(claims.expires_at()),
                subject: Some(claims.sub),
            },
            TokenStatus::Absent | TokenStatus::Invalid(_) => RefreshDecision {
                should_issue_new: true,
                current_expiry: None,
                subject: None,
            },
        }
    }
}
