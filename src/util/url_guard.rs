use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors raised when a campaign target URL fails validation.
#[derive(Error, Debug)]
pub enum UrlGuardError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("Refusing to open private address: {0}")]
    PrivateAddress(String),
}

/// Validates a campaign target URL before it is handed to the OS opener.
///
/// Campaign records come from the partner backend; a compromised or
/// misconfigured campaign must not be able to point the kiosk at `file://`
/// resources or hosts on the resort's internal network. Accepts only public
/// http/https targets.
///
/// # Errors
///
/// Returns [`UrlGuardError`] when the URL does not parse, uses a non-HTTP(S)
/// scheme, or resolves to a loopback/private/link-local address literal.
pub fn validate_target_url(url_str: &str) -> Result<Url, UrlGuardError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlGuardError::UnsupportedScheme(scheme.to_owned())),
    }

    if let Some(host) = url.host_str() {
        if host.eq_ignore_ascii_case("localhost") {
            return Err(UrlGuardError::PrivateAddress(host.to_owned()));
        }

        // IPv6 literals arrive bracketed in the host string
        let bare = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if let Ok(ip) = bare.parse::<IpAddr>() {
            if is_private_address(&ip) {
                return Err(UrlGuardError::PrivateAddress(ip.to_string()));
            }
        }
    }

    Ok(url)
}

fn is_private_address(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let seg0 = v6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link local
            v6.is_loopback()
                || v6.is_unspecified()
                || (seg0 & 0xfe00) == 0xfc00
                || (seg0 & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_targets_accepted() {
        assert!(validate_target_url("https://partner.example.com/offer").is_ok());
        assert!(validate_target_url("http://example.org/menu.pdf").is_ok());
        assert!(validate_target_url("https://example.com:8443/book").is_ok());
    }

    #[test]
    fn test_non_http_schemes_rejected() {
        assert!(matches!(
            validate_target_url("file:///etc/passwd"),
            Err(UrlGuardError::UnsupportedScheme(_))
        ));
        assert!(validate_target_url("javascript:alert(1)").is_err());
        assert!(validate_target_url("ftp://example.com/brochure").is_err());
    }

    #[test]
    fn test_localhost_rejected() {
        assert!(validate_target_url("http://localhost/admin").is_err());
        assert!(validate_target_url("http://127.0.0.1:8080/").is_err());
        assert!(validate_target_url("http://[::1]/").is_err());
    }

    #[test]
    fn test_private_ranges_rejected() {
        assert!(validate_target_url("http://192.168.0.10/cam").is_err());
        assert!(validate_target_url("http://10.1.2.3/").is_err());
        assert!(validate_target_url("http://172.16.5.5/").is_err());
        assert!(validate_target_url("http://169.254.0.1/").is_err());
        assert!(validate_target_url("http://[fe80::1]/").is_err());
        assert!(validate_target_url("http://[fd00::1]/").is_err());
    }

    #[test]
    fn test_unparseable_rejected() {
        assert!(matches!(
            validate_target_url("not a url"),
            Err(UrlGuardError::InvalidUrl(_))
        ));
    }
}
