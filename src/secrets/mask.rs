//! Masking of secret sources for logs and status output.

/// Placeholder that replaces the final path segment of a source.
pub const MASK: &str = "***";

/// Mask a secret source for display.
///
/// The scheme and the leading path segments stay visible so operators can
/// tell which store and folder a secret lives in; the final segment and any
/// query string are hidden.
///
/// ```
/// use herald::secrets::mask_source;
///
/// assert_eq!(mask_source("vault://vault:8200/secret/data/bot"), "vault://vault:8200/secret/data/***");
/// assert_eq!(mask_source("cloud://prod/bot-token?key=access"), "cloud://prod/***");
/// assert_eq!(mask_source("cloud://bot-token"), "cloud://***");
/// ```
pub fn mask_source(source: &str) -> String {
    let (scheme, rest) = match source.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, source),
    };

    let rest = rest.split_once('?').map_or(rest, |(path, _)| path);
    let rest = rest.trim_end_matches('/');

    let masked = match rest.rfind('/') {
        Some(idx) => format!("{}/{}", &rest[..idx], MASK),
        None => MASK.to_string(),
    };

    match scheme {
        Some(scheme) => format!("{}://{}", scheme, masked),
        None => masked,
    }
}
