//! Client authentication: HTTP Basic credentials in plain or salted
//! hash form, hash algorithm negotiation for the handshake, and TOTP.

use base64::Engine;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use relay_core::Host;
use relay_eval::eval_simple;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;

use crate::http::HttpRequest;

/// Supported password hash algorithms, weakest first; the index is the
/// negotiation strength.
pub const HASH_ALGOS: &[&str] = &["sha256", "sha512", "pbkdf2+sha256", "pbkdf2+sha512"];

/// Upper bound on client-supplied pbkdf2 iteration counts.
const MAX_ITERATIONS: u32 = 1_000_000;

const TOTP_STEP_SECS: u64 = 30;
const TOTP_DIGITS: u32 = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing password")]
    MissingPassword,
    #[error("Invalid password")]
    InvalidPassword,
    #[error("Missing TOTP")]
    MissingTotp,
    #[error("Invalid TOTP")]
    InvalidTotp,
}

/// Picks the strongest algorithm present in both the client list and
/// the server's allowed list.
pub fn negotiate_hash_algo(client_algos: &[String], allowed: &[String]) -> Option<&'static str> {
    HASH_ALGOS
        .iter()
        .rev()
        .find(|algo| {
            client_algos.iter().any(|c| c == *algo) && allowed.iter().any(|a| a == *algo)
        })
        .copied()
}

/// Validates the request's credentials against the host configuration.
pub fn check_auth(host: &Host, request: &HttpRequest) -> Result<(), AuthError> {
    let config = host.config();
    let password = eval_simple(&config.network.password, host);

    let credentials = request
        .header("authorization")
        .and_then(parse_basic)
        .ok_or(AuthError::MissingPassword)?;
    if !verify_credentials(&credentials, &password, &config.network.password_hash_algo) {
        return Err(AuthError::InvalidPassword);
    }

    let totp_secret = eval_simple(&config.network.totp_secret, host);
    if !totp_secret.is_empty() {
        let value = request.param("totp").ok_or(AuthError::MissingTotp)?;
        if !validate_totp(&totp_secret, value, unix_now(), 1) {
            return Err(AuthError::InvalidTotp);
        }
    }
    Ok(())
}

/// Extracts and decodes `Basic <base64>` credentials.
fn parse_basic(header: &str) -> Option<String> {
    let encoded = header.strip_prefix("Basic ").or_else(|| header.strip_prefix("basic "))?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    String::from_utf8(decoded).ok()
}

/// Verifies decoded credentials:
/// - `plain:<password>`
/// - `hash:sha256|sha512:<salt_hex>:<hash_hex>` where the digest is
///   computed over salt ‖ password
/// - `hash:pbkdf2+sha256|pbkdf2+sha512:<salt_hex>:<iterations>:<hash_hex>`
pub fn verify_credentials(credentials: &str, password: &str, allowed_algos: &[String]) -> bool {
    if let Some(plain) = credentials.strip_prefix("plain:") {
        return !password.is_empty() && plain == password;
    }
    let Some(rest) = credentials.strip_prefix("hash:") else {
        return false;
    };
    let parts: Vec<&str> = rest.split(':').collect();
    if password.is_empty() {
        return false;
    }
    match parts.as_slice() {
        [algo @ ("sha256" | "sha512"), salt_hex, hash_hex] => {
            if !allowed_algos.iter().any(|a| a == algo) {
                return false;
            }
            let Ok(salt) = hex::decode(salt_hex) else {
                return false;
            };
            let computed = match *algo {
                "sha256" => {
                    let mut hasher = Sha256::new();
                    hasher.update(&salt);
                    hasher.update(password.as_bytes());
                    hex::encode(hasher.finalize())
                }
                _ => {
                    let mut hasher = Sha512::new();
                    hasher.update(&salt);
                    hasher.update(password.as_bytes());
                    hex::encode(hasher.finalize())
                }
            };
            computed.eq_ignore_ascii_case(hash_hex)
        }
        [algo @ ("pbkdf2+sha256" | "pbkdf2+sha512"), salt_hex, iterations_str, hash_hex] => {
            if !allowed_algos.iter().any(|a| a == algo) {
                return false;
            }
            let Ok(salt) = hex::decode(salt_hex) else {
                return false;
            };
            let Ok(iterations) = iterations_str.parse::<u32>() else {
                return false;
            };
            if iterations == 0 || iterations > MAX_ITERATIONS {
                return false;
            }
            let computed = match *algo {
                "pbkdf2+sha256" => {
                    let mut out = [0u8; 32];
                    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut out);
                    hex::encode(out)
                }
                _ => {
                    let mut out = [0u8; 64];
                    pbkdf2_hmac::<Sha512>(password.as_bytes(), &salt, iterations, &mut out);
                    hex::encode(out)
                }
            };
            computed.eq_ignore_ascii_case(hash_hex)
        }
        _ => false,
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Computes the TOTP value for one time step (RFC 6238, HMAC-SHA1,
/// 6 digits).
pub fn totp_value(secret: &[u8], time_step: u64) -> String {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(&time_step.to_be_bytes());
    let digest = mac.finalize().into_bytes();
    let offset = usize::from(digest[digest.len() - 1] & 0x0f);
    let code = (u32::from_be_bytes([
        digest[offset],
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]) & 0x7fff_ffff)
        % 10u32.pow(TOTP_DIGITS);
    format!("{code:06}")
}

/// Validates a TOTP value against a base32 secret with a ± `window`
/// time-step tolerance.
pub fn validate_totp(secret_base32: &str, value: &str, now_secs: u64, window: u64) -> bool {
    let normalized: String = secret_base32
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    let Ok(secret) = relay_text::base_decode(relay_text::Base::Base32, &normalized) else {
        return false;
    };
    if secret.is_empty() || value.is_empty() {
        return false;
    }
    let current_step = now_secs / TOTP_STEP_SECS;
    let start = current_step.saturating_sub(window);
    (start..=current_step + window).any(|step| totp_value(&secret, step) == value)
}
