use crate::entry::OtpParams;
use thiserror::Error;
use time::OffsetDateTime;
use totp_rs::{Algorithm, Secret, TOTP};

/// Length of the TOTP window most services use.
pub const DEFAULT_PERIOD: u64 = 30;

#[derive(Debug, Error)]
pub enum OtpError {
    #[error("unsupported token type '{0}', expected TOTP/HOTP/STEAM")]
    UnsupportedType(String),
    #[error("unsupported digits '{0}', expected 5-10")]
    UnsupportedDigits(u8),
    #[error("unsupported algorithm '{0}', expected SHA1/SHA256/SHA512")]
    UnsupportedAlgorithm(String),
    #[error("invalid secret (base32): {0}")]
    InvalidSecret(String),
    #[error("secret decoded to an empty byte string")]
    EmptySecret,
    #[error("time is before the unix epoch")]
    BeforeEpoch,
}

/// Generates the code `params` describes at instant `at`.
///
/// HOTP entries are rendered at their stored counter, which is never advanced
/// here: the backup is read-only for this application.
pub fn generate_code(secret: &str, params: &OtpParams, at: OffsetDateTime) -> Result<String, OtpError> {
    let kind = params.token_type.to_uppercase();
    let (algo, digits, step, time) = match kind.as_str() {
        "TOTP" => (
            parse_algorithm(&params.algorithm)?,
            checked_digits(params.digits)?,
            params.period.max(1),
            unix_seconds(at)?,
        ),
        // HOTP(counter) is TOTP with a one second step evaluated at t = counter.
        "HOTP" => (
            parse_algorithm(&params.algorithm)?,
            checked_digits(params.digits)?,
            1,
            params.counter.unwrap_or(0),
        ),
        "STEAM" => (Algorithm::Steam, 5, params.period.max(1), unix_seconds(at)?),
        _ => return Err(OtpError::UnsupportedType(params.token_type.clone())),
    };

    let secret_bytes = decode_secret(secret)?;

    // Unchecked: 80-bit secrets are common and rejected by the checked constructor.
    let totp = TOTP::new_unchecked(algo, digits, 1, step, secret_bytes);
    Ok(totp.generate(time))
}

fn parse_algorithm(name: &str) -> Result<Algorithm, OtpError> {
    match name.to_uppercase().as_str() {
        "SHA1" => Ok(Algorithm::SHA1),
        "SHA256" => Ok(Algorithm::SHA256),
        "SHA512" => Ok(Algorithm::SHA512),
        _ => Err(OtpError::UnsupportedAlgorithm(name.to_string())),
    }
}

fn checked_digits(digits: u8) -> Result<usize, OtpError> {
    if (5..=10).contains(&digits) {
        Ok(digits as usize)
    } else {
        Err(OtpError::UnsupportedDigits(digits))
    }
}

fn decode_secret(secret: &str) -> Result<Vec<u8>, OtpError> {
    let normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=' && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let bytes = Secret::Encoded(normalized)
        .to_bytes()
        .map_err(|e| OtpError::InvalidSecret(format!("{e:?}")))?;

    if bytes.is_empty() {
        return Err(OtpError::EmptySecret);
    }
    Ok(bytes)
}

fn unix_seconds(at: OffsetDateTime) -> Result<u64, OtpError> {
    u64::try_from(at.unix_timestamp()).map_err(|_| OtpError::BeforeEpoch)
}

/// Seconds (fractional) since the epoch, as a float for countdown maths.
pub fn unix_seconds_f64(at: OffsetDateTime) -> f64 {
    at.unix_timestamp_nanos() as f64 / 1e9
}

/// Seconds left before the code for a `period`-second window rotates.
/// Always in `(0, period]`.
pub fn seconds_until_rotation(at: OffsetDateTime, period: u64) -> f64 {
    let period = period.max(1) as f64;
    period - unix_seconds_f64(at).rem_euclid(period)
}
