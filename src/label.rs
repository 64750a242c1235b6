use crate::entry::OtpEntry;
use time::OffsetDateTime;
use tracing::warn;

pub const OTP_TOKEN: &str = "{otp}";

/// Shown in place of `{otp}` when a code cannot be generated.
pub const ERROR_MARKER: &str = "Error";

/// Static tokens, substituted in this order before `{otp}`.
const STATIC_TOKENS: [&str; 11] = [
    "{name}",
    "{secret}",
    "{updatedAt}",
    "{serviceTypeID}",
    "{link}",
    "{tokenType}",
    "{source}",
    "{label}",
    "{account}",
    "{digits}",
    "{period}",
];

fn field(token: &str, e: &OtpEntry) -> String {
    match token {
        "{name}" => e.name.clone(),
        "{secret}" => e.secret.clone(),
        "{updatedAt}" => opt(&e.updated_at),
        "{serviceTypeID}" => opt(&e.service_type_id),
        "{link}" => opt(&e.otp.link),
        "{tokenType}" => e.otp.token_type.clone(),
        "{source}" => opt(&e.otp.source),
        "{label}" => opt(&e.otp.label),
        "{account}" => opt(&e.otp.account),
        "{digits}" => e.otp.digits.to_string(),
        "{period}" => e.otp.period.to_string(),
        _ => token.to_string(),
    }
}

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

pub fn render(template: &str, entry: &OtpEntry) -> String {
    render_at(template, entry, OffsetDateTime::now_utc())
}

/// Renders `template` for `entry` with `{otp}` evaluated at `at`.
/// Unknown placeholders are left untouched.
pub fn render_at(template: &str, entry: &OtpEntry, at: OffsetDateTime) -> String {
    let mut text = STATIC_TOKENS
        .iter()
        .fold(template.to_string(), |text, token| {
            if text.contains(token) {
                text.replace(token, &field(token, entry))
            } else {
                text
            }
        });

    if text.contains(OTP_TOKEN) {
        let code = match entry.generate_at(at) {
            Ok(code) => code,
            Err(e) => {
                warn!("cannot generate code for {}: {e}", entry.display_name());
                ERROR_MARKER.to_string()
            }
        };
        text = text.replace(OTP_TOKEN, &code);
    }
    text
}

/// Whether labels from `template` change over time and need periodic refresh.
pub fn is_live(template: &str) -> bool {
    template.contains(OTP_TOKEN)
}
