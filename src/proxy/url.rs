//! Minimal absolute-URI parsing for the plaintext proxy path. Clients are
//! expected to send proxy-style absolute-URI request
//! lines (`METHOD http://host[:port]/path HTTP/1.1`); bare origin-form
//! request lines are out of scope.

use crate::error::{SessionError, SessionResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub scheme: String,
    /// Authority exactly as it appeared in the request line, no implied
    /// port filled in, so it can be reused verbatim when rewriting the
    /// scheme to `https` (`http://example.com/` upgrades to
    /// `https://example.com/`, not `https://example.com:80/`).
    pub authority: String,
    pub host: String,
    pub port: u16,
    pub path_and_query: String,
}

impl ParsedUrl {
    /// `"host:port"`, with the port defaulted to 80.
    pub fn origin(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub fn parse_absolute_url(raw: &str) -> SessionResult<ParsedUrl> {
    let (scheme, rest) = raw
        .split_once("://")
        .ok_or_else(|| SessionError::Malformed(format!("not an absolute URL: {raw:?}")))?;

    let (authority, path_and_query) = match rest.find('/') {
        Some(idx) => (&rest[..idx], rest[idx..].to_string()),
        None => (rest, "/".to_string()),
    };

    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) => {
            let port: u16 = p
                .parse()
                .map_err(|_| SessionError::Malformed(format!("bad port in {raw:?}")))?;
            (h.to_string(), port)
        }
        None => (authority.to_string(), 80),
    };

    Ok(ParsedUrl {
        scheme: scheme.to_string(),
        authority: authority.to_string(),
        host,
        port,
        path_and_query,
    })
}

/// Parses a CONNECT request-target (`host:port`, authority-form).
pub fn parse_authority(raw: &str) -> SessionResult<(String, u16)> {
    let (host, port) = raw
        .rsplit_once(':')
        .ok_or_else(|| SessionError::Malformed(format!("CONNECT target missing port: {raw:?}")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| SessionError::Malformed(format!("bad CONNECT port: {raw:?}")))?;
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_absolute_url_with_default_port() {
        let u = parse_absolute_url("http://example.com/").unwrap();
        assert_eq!(u.host, "example.com");
        assert_eq!(u.port, 80);
        assert_eq!(u.authority, "example.com");
        assert_eq!(u.path_and_query, "/");
        assert_eq!(u.origin(), "example.com:80");
    }

    #[test]
    fn parses_absolute_url_with_explicit_port_and_query() {
        let u = parse_absolute_url("http://example.com:8080/a/b?x=1").unwrap();
        assert_eq!(u.port, 8080);
        assert_eq!(u.path_and_query, "/a/b?x=1");
        assert_eq!(u.authority, "example.com:8080");
    }

    #[test]
    fn parses_absolute_url_with_no_path() {
        let u = parse_absolute_url("http://example.com").unwrap();
        assert_eq!(u.path_and_query, "/");
    }

    #[test]
    fn rejects_origin_form() {
        assert!(parse_absolute_url("/just/a/path").is_err());
    }

    #[test]
    fn parses_connect_authority() {
        assert_eq!(
            parse_authority("example.com:443").unwrap(),
            ("example.com".to_string(), 443)
        );
    }

    #[test]
    fn connect_authority_without_port_is_malformed() {
        assert!(parse_authority("example.com").is_err());
    }
}
