//! Session token handling
//!
//! Tokens are compact JWS values signed with HS256 using a process-wide
//! secret. Verification takes the current time as an argument, so expiry
//! is a pure function of the claims and `now`.

use std::fmt;
use std::str::FromStr;

use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::types::{Result, TallyError};

/// Minimum secret length accepted outside dev mode
pub const MIN_SECRET_LEN: usize = 32;

const DEV_SECRET: &str = "dev-mode-secret-not-for-production-use-123456";

/// Payload stored in a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account ID
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Username at issuance
    pub username: String,
}

/// Unit of a [`TokenExpiry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl ExpiryUnit {
    fn seconds(self) -> u64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 60 * 60,
            Self::Days => 24 * 60 * 60,
            Self::Weeks => 7 * 24 * 60 * 60,
        }
    }

    fn parse(unit: &str) -> Option<Self> {
        match unit.to_ascii_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => Some(Self::Seconds),
            "m" | "min" | "mins" | "minute" | "minutes" => Some(Self::Minutes),
            "h" | "hr" | "hrs" | "hour" | "hours" => Some(Self::Hours),
            "d" | "day" | "days" => Some(Self::Days),
            "w" | "week" | "weeks" => Some(Self::Weeks),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Seconds => "second",
            Self::Minutes => "minute",
            Self::Hours => "hour",
            Self::Days => "day",
            Self::Weeks => "week",
        }
    }
}

/// Token lifetime as magnitude + unit, e.g. `2 days`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenExpiry {
    pub magnitude: u64,
    pub unit: ExpiryUnit,
}

impl TokenExpiry {
    pub fn new(magnitude: u64, unit: ExpiryUnit) -> Self {
        Self { magnitude, unit }
    }

    pub fn as_secs(&self) -> u64 {
        self.magnitude.saturating_mul(self.unit.seconds())
    }
}

impl Default for TokenExpiry {
    fn default() -> Self {
        Self::new(2, ExpiryUnit::Days)
    }
}

impl FromStr for TokenExpiry {
    type Err = String;

    /// Accepts `"2 days"`, `"2days"`, `"12h"`, `"90 minutes"`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("missing unit in token expiry '{s}'"))?;
        let (digits, unit) = s.split_at(split);

        let magnitude: u64 = digits
            .parse()
            .map_err(|_| format!("invalid magnitude in token expiry '{s}'"))?;
        if magnitude == 0 {
            return Err("token expiry must be greater than zero".to_string());
        }

        let unit = ExpiryUnit::parse(unit.trim())
            .ok_or_else(|| format!("unknown unit in token expiry '{s}'"))?;

        Ok(Self { magnitude, unit })
    }
}

impl fmt::Display for TokenExpiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = if self.magnitude == 1 { "" } else { "s" };
        write!(f, "{} {}{}", self.magnitude, self.unit.name(), plural)
    }
}

/// Issues and verifies session tokens
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry: TokenExpiry,
}

impl TokenService {
    /// Create a token service
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: &str, expiry: TokenExpiry) -> Result<Self> {
        if secret.is_empty() {
            return Err(TallyError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < MIN_SECRET_LEN {
            return Err(TallyError::Config(format!(
                "JWT_SECRET must be at least {MIN_SECRET_LEN} characters"
            )));
        }

        Ok(Self::with_secret(secret, expiry))
    }

    /// Create a service for dev mode (fixed, public secret)
    pub fn new_dev(expiry: TokenExpiry) -> Self {
        Self::with_secret(DEV_SECRET, expiry)
    }

    fn with_secret(secret: &str, expiry: TokenExpiry) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry,
        }
    }

    pub fn expiry(&self) -> TokenExpiry {
        self.expiry
    }

    /// Sign a token for `account_id` valid from `now` for the configured
    /// duration
    pub fn issue(&self, account_id: &str, username: &str, now: u64) -> Result<String> {
        let claims = Claims {
            sub: account_id.to_string(),
            iat: now,
            exp: now.saturating_add(self.expiry.as_secs()),
            username: username.to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TallyError::Server(format!("Failed to generate token: {}", e)))
    }

    /// Verify signature and structure, then expiry against `now`
    pub fn verify(&self, token: &str, now: u64) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below against the caller's clock
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| {
                let reason = match err.kind() {
                    ErrorKind::InvalidSignature => "invalid signature",
                    ErrorKind::InvalidAlgorithm => "unexpected algorithm",
                    ErrorKind::MissingRequiredClaim(_) => "missing claim",
                    ErrorKind::Json(_) => "malformed claims",
                    _ => "malformed token",
                };
                TallyError::TokenInvalid(reason.to_string())
            })?;

        if now >= claims.exp {
            return Err(TallyError::TokenExpired);
        }

        Ok(claims)
    }
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

/// Extract token from an Authorization header value.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn test_service() -> TokenService {
        TokenService::new(
            "test-secret-that-is-at-least-32-characters-long",
            TokenExpiry::new(1, ExpiryUnit::Hours),
        )
        .unwrap()
    }

    #[test]
    fn test_issue_and_verify_token() {
        let service = test_service();

        let token = service.issue("acct-1", "alice", NOW).unwrap();
        let claims = service.verify(&token, NOW + 10).unwrap();

        assert_eq!(claims.sub, "acct-1");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.iat, NOW);
        assert_eq!(claims.exp, NOW + 3600);
    }

    #[test]
    fn test_expiry_boundary() {
        let service = test_service();
        let token = service.issue("acct-1", "alice", NOW).unwrap();

        assert!(service.verify(&token, NOW + 3599).is_ok());
        assert!(matches!(service.verify(&token, NOW + 3600), Err(TallyError::TokenExpired)));
        assert!(matches!(service.verify(&token, NOW + 3601), Err(TallyError::TokenExpired)));
    }

    #[test]
    fn test_invalid_token() {
        let service = test_service();
        let result = service.verify("invalid-token", NOW);
        assert!(matches!(result, Err(TallyError::TokenInvalid(_))));
    }

    #[test]
    fn test_tampered_token_is_invalid_even_when_expired() {
        let service = test_service();
        let token = service.issue("acct-1", "alice", NOW).unwrap();

        // Flip the first character of the signature segment
        let sig_start = token.rfind('.').unwrap() + 1;
        let mut tampered = token.clone().into_bytes();
        tampered[sig_start] = if tampered[sig_start] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(tampered).unwrap();

        // Signature is checked before expiry
        let result = service.verify(&tampered, NOW + 10_000);
        assert!(matches!(result, Err(TallyError::TokenInvalid(_))));
    }

    #[test]
    fn test_wrong_secret() {
        let service1 = test_service();
        let service2 = TokenService::new(
            "different-secret-that-is-at-least-32-characters",
            TokenExpiry::default(),
        )
        .unwrap();

        let token = service1.issue("acct-1", "alice", NOW).unwrap();

        let result = service2.verify(&token, NOW);
        assert!(matches!(result, Err(TallyError::TokenInvalid(_))));
    }

    #[test]
    fn test_secret_validation() {
        assert!(TokenService::new("short", TokenExpiry::default()).is_err());
        assert!(TokenService::new("", TokenExpiry::default()).is_err());
        assert!(TokenService::new("this-secret-is-at-least-32-chars-long", TokenExpiry::default()).is_ok());
    }

    #[test]
    fn test_dev_mode_service() {
        let service = TokenService::new_dev(TokenExpiry::default());
        let token = service.issue("acct-1", "alice", NOW).unwrap();
        assert!(service.verify(&token, NOW).is_ok());
    }

    #[test]
    fn test_parse_token_expiry() {
        assert_eq!("2 days".parse::<TokenExpiry>().unwrap(), TokenExpiry::new(2, ExpiryUnit::Days));
        assert_eq!("2days".parse::<TokenExpiry>().unwrap(), TokenExpiry::new(2, ExpiryUnit::Days));
        assert_eq!("12h".parse::<TokenExpiry>().unwrap(), TokenExpiry::new(12, ExpiryUnit::Hours));
        assert_eq!(" 90 Minutes ".parse::<TokenExpiry>().unwrap(), TokenExpiry::new(90, ExpiryUnit::Minutes));
        assert_eq!("1 week".parse::<TokenExpiry>().unwrap().as_secs(), 604_800);

        assert!("".parse::<TokenExpiry>().is_err());
        assert!("days".parse::<TokenExpiry>().is_err());
        assert!("10".parse::<TokenExpiry>().is_err());
        assert!("0 days".parse::<TokenExpiry>().is_err());
        assert!("3 fortnights".parse::<TokenExpiry>().is_err());
    }

    #[test]
    fn test_token_expiry_display() {
        assert_eq!(TokenExpiry::new(2, ExpiryUnit::Days).to_string(), "2 days");
        assert_eq!(TokenExpiry::new(1, ExpiryUnit::Hours).to_string(), "1 hour");
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(
            extract_token_from_header(Some("Bearer abc123")),
            Some("abc123")
        );
        assert_eq!(extract_token_from_header(Some("abc123")), Some("abc123"));

        assert_eq!(extract_token_from_header(None), None);
        assert_eq!(extract_token_from_header(Some("")), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
    }
}
