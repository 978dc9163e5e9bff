//! Candidate filtering for contact values.
//!
//! Pages mention many addresses that are not the member's own: platform
//! mailboxes, generic support inboxes, retina image names that happen to
//! look like `logo@2x.png`. Everything that reaches an extracted profile
//! passes through here first.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Hosts belonging to the platform itself.
pub const PLATFORM_DOMAINS: &[&str] = &["linkedin.com", "licdn.com"];

const GENERIC_MAILBOX_PREFIXES: &[&str] = &[
    "support@",
    "noreply@",
    "no-reply@",
    "donotreply@",
    "info@",
    "help@",
    "privacy@",
    "admin@",
    "webmaster@",
    "postmaster@",
];

const IMAGE_SUFFIXES: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".ico", ".bmp",
];

const MAX_EMAIL_LEN: usize = 50;
const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 15;

static EMAIL_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("valid email regex")
});

static EMAIL_EXACT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("valid email regex")
});

static PHONE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?\(?\d[\d\s().\-]{4,}\d").expect("valid phone regex"));

/// Returns true if `host` is the platform or one of its subdomains.
pub fn is_platform_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    PLATFORM_DOMAINS
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")))
}

/// Clean one email candidate, or reject it.
pub fn accept_email(candidate: &str) -> Option<String> {
    let email = candidate
        .trim()
        .trim_end_matches(['.', ',', ';', ':', ')', ']'])
        .trim_start_matches(['(', '[', '<']);

    if email.is_empty() || email.len() > MAX_EMAIL_LEN || !EMAIL_EXACT.is_match(email) {
        return None;
    }

    let lower = email.to_ascii_lowercase();
    if PLATFORM_DOMAINS.iter().any(|d| lower.contains(d)) {
        return None;
    }
    if GENERIC_MAILBOX_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return None;
    }
    if IMAGE_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        return None;
    }

    Some(email.to_string())
}

/// First acceptable email found anywhere in `text`.
pub fn first_email(text: &str) -> Option<String> {
    EMAIL_TOKEN
        .find_iter(text)
        .find_map(|m| accept_email(m.as_str()))
}

/// Clean one phone candidate, or reject it when the digit count is implausible.
pub fn accept_phone(candidate: &str) -> Option<String> {
    let phone = candidate.trim().trim_end_matches(['.', ',', ';']);
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits) {
        return None;
    }
    Some(phone.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// First acceptable phone number found anywhere in `text`.
pub fn first_phone(text: &str) -> Option<String> {
    PHONE_TOKEN
        .find_iter(text)
        .find_map(|m| accept_phone(m.as_str()))
}

/// Resolve `href` against `base` when it is relative.
pub fn resolve_link(href: &str, base: Option<&Url>) -> Option<Url> {
    let href = href.trim();
    match Url::parse(href) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => base.and_then(|b| b.join(href).ok()),
        Err(_) => None,
    }
}

/// Canonical `{scheme}://{host}/in/{slug}` form of a member profile link.
///
/// Returns `None` for anything that is not a profile on the platform's own
/// host (company pages, posts, CDN assets).
pub fn canonical_profile_url(url: &Url) -> Option<String> {
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?.to_ascii_lowercase();
    if host != "linkedin.com" && !host.ends_with(".linkedin.com") {
        return None;
    }

    let mut segments = url.path_segments()?;
    if segments.next()? != "in" {
        return None;
    }
    let slug = segments.next().filter(|s| !s.is_empty())?;

    Some(format!("{}://{host}/in/{slug}", url.scheme()))
}

/// An off-platform link, unwrapping the platform's redirect wrapper.
pub fn external_link(href: &str, base: Option<&Url>) -> Option<String> {
    let url = resolve_link(href, base)?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?;
    if !is_platform_host(host) {
        return Some(url.to_string());
    }

    if url.path().starts_with("/redir/redirect") {
        let target = url
            .query_pairs()
            .find(|(k, _)| k == "url")
            .map(|(_, v)| v.into_owned())?;
        return external_link(&target, None);
    }
    None
}
