//! URL helpers: loopback detection, tenant links and slugs

use crate::errors::{AppError, Result};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};
use url::Url;

/// Maximum slug length
pub const MAX_SLUG_LEN: usize = 60;

/// Hosts treated as local development
pub fn is_loopback(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1" | "[::1]")
}

/// Public link to a tenant page, relative to the current origin
///
/// Loopback origins get path routing (`/{sector}/{slug}{path}`); other
/// origins get the sector as subdomain of the origin's base domain.
pub fn tenant_url(origin: &Url, sector: &str, slug: &str, path: &str) -> Result<String> {
    let host = origin.host_str().ok_or_else(|| AppError::InvalidFormat {
        message: format!("origin '{}' has no host", origin),
    })?;
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    if is_loopback(host) {
        let port = origin.port().map(|p| format!(":{}", p)).unwrap_or_default();
        return Ok(format!(
            "{}://{}{}/{}/{}{}",
            origin.scheme(),
            host,
            port,
            sector,
            slug,
            path
        ));
    }

    let base_domain = host.split_once('.').map(|(_, rest)| rest).unwrap_or(host);
    Ok(format!(
        "{}://{}.{}/{}{}",
        origin.scheme(),
        sector,
        base_domain,
        slug,
        path
    ))
}

/// URL-safe slug: lowercase ASCII alphanumerics separated by single dashes
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.to_lowercase().nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    slug
}

/// Whether `slug` is already in canonical slug form
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slugify(slug) == slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Gülüş Diş Kliniği"), "gulus-dis-klinigi");
        assert_eq!(slugify("  Café  Rösti & Co. "), "cafe-rosti-co");
        assert_eq!(slugify("---"), "");
        assert_eq!(slugify("clinic-a"), "clinic-a");
        assert_eq!(slugify(&"a".repeat(80)).len(), MAX_SLUG_LEN);
    }

    #[test]
    fn test_is_valid_slug() {
        assert!(is_valid_slug("clinic-a"));
        assert!(is_valid_slug("salon2"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("Clinic-A"));
        assert!(!is_valid_slug("clinic--a"));
        assert!(!is_valid_slug("-clinic"));
        assert!(!is_valid_slug("klinik/ü"));
    }

    #[test]
    fn test_tenant_url_loopback() {
        let origin = Url::parse("http://localhost:5173/anything").unwrap();
        assert_eq!(
            tenant_url(&origin, "dentist", "clinic-a", "/about").unwrap(),
            "http://localhost:5173/dentist/clinic-a/about"
        );

        let origin = Url::parse("http://127.0.0.1/").unwrap();
        assert_eq!(
            tenant_url(&origin, "beauty", "salon-b", "/").unwrap(),
            "http://127.0.0.1/beauty/salon-b/"
        );
    }

    #[test]
    fn test_tenant_url_subdomain() {
        let origin = Url::parse("https://www.example.com/pricing").unwrap();
        assert_eq!(
            tenant_url(&origin, "dentist", "clinic-a", "contact").unwrap(),
            "https://dentist.example.com/clinic-a/contact"
        );
    }
}
