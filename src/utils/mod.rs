//! Common utilities and helper functions

pub mod retry;
pub mod shutdown;

use rand::Rng;
use url::Url;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Mask an access code for log output, keeping the first group only
pub fn mask_code(code: &str) -> String {
    let head: String = code.chars().take(4).collect();
    format!("{head}-****-****")
}

/// Parse a host URL and make sure it ends with `/`
///
/// Returns `None` for anything that is not an absolute http(s) URL.
pub fn normalize_host_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }
    let mut normalized = parsed.to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Some(normalized)
}

/// Generate a syntactically valid access code that was never issued
///
/// Format: `VACC-IPY<c>-<cccc>` with characters from `A-Z0-9`.
pub fn synthetic_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut pick = || CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char;
    let first = pick();
    let tail: String = (0..4).map(|_| pick()).collect();
    format!("VACC-IPY{first}-{tail}")
}

/// Strip the German country prefix from a phone number for form entry
pub fn local_phone(phone: &str) -> &str {
    phone.strip_prefix("+49").unwrap_or(phone)
}
