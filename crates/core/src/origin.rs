use thiserror::Error;
use url::Url;

/// Header values consulted when determining where a request came from.
///
/// The HTTP layer fills this from a case-insensitive header map so the
/// extraction rules stay independent of any web framework.
#[derive(Debug, Clone, Copy, Default)]
pub struct OriginHeaders<'a> {
    pub origin: Option<&'a str>,
    pub referer: Option<&'a str>,
    pub forwarded_host: Option<&'a str>,
    pub host: Option<&'a str>,
}

impl<'a> OriginHeaders<'a> {
    /// Returns the URL-like string the origin domain is derived from.
    ///
    /// `origin` wins over `referer`; when neither is usable a URL is
    /// synthesized from `x-forwarded-host` (first hop) or `host`.
    pub fn source(&self) -> Result<String, OriginError> {
        if let Some(origin) = present(self.origin).filter(|value| *value != "null") {
            return Ok(origin.to_string());
        }
        if let Some(referer) = present(self.referer) {
            return Ok(referer.to_string());
        }

        let forwarded = present(self.forwarded_host)
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        match forwarded.or_else(|| present(self.host)) {
            Some(host) => Ok(format!("http://{host}")),
            None => Err(OriginError::Missing),
        }
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Reduces a URL-like string to its bare, lowercase hostname without `www.`.
pub fn normalize_domain(source: &str) -> Result<String, OriginError> {
    let parsed =
        Url::parse(source.trim()).map_err(|_| OriginError::Unparseable(source.to_string()))?;
    let host = parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| OriginError::Unparseable(source.to_string()))?
        .to_ascii_lowercase();

    Ok(match host.strip_prefix("www.") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => host,
    })
}

/// Derives the normalized origin domain for a request.
pub fn extract_origin_domain(headers: &OriginHeaders<'_>) -> Result<String, OriginError> {
    let source = headers.source()?;
    normalize_domain(&source)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OriginError {
    #[error("request carries no origin, referer or host header")]
    Missing,
    #[error("unable to determine a hostname from {0:?}")]
    Unparseable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_www_prefix_from_origin() {
        let headers = OriginHeaders {
            origin: Some("https://www.example.com"),
            ..OriginHeaders::default()
        };
        assert_eq!(extract_origin_domain(&headers).unwrap(), "example.com");
    }

    #[test]
    fn prefers_origin_over_referer_and_host() {
        let headers = OriginHeaders {
            origin: Some("http://kgktechnologies.com"),
            referer: Some("https://other.test/careers"),
            forwarded_host: Some("proxy.test"),
            host: Some("localhost:8080"),
        };
        assert_eq!(extract_origin_domain(&headers).unwrap(), "kgktechnologies.com");
    }

    #[test]
    fn falls_back_to_referer_then_forwarded_host_then_host() {
        let referer = OriginHeaders {
            referer: Some("https://www.dglobal.com/careers?x=1"),
            host: Some("api.internal"),
            ..OriginHeaders::default()
        };
        assert_eq!(extract_origin_domain(&referer).unwrap(), "dglobal.com");

        let forwarded = OriginHeaders {
            forwarded_host: Some("Brand.Example.com, proxy.internal"),
            host: Some("api.internal"),
            ..OriginHeaders::default()
        };
        assert_eq!(extract_origin_domain(&forwarded).unwrap(), "brand.example.com");

        let host = OriginHeaders {
            host: Some("localhost:8000"),
            ..OriginHeaders::default()
        };
        assert_eq!(extract_origin_domain(&host).unwrap(), "localhost");
    }

    #[test]
    fn null_origin_is_treated_as_absent() {
        let headers = OriginHeaders {
            origin: Some("null"),
            referer: Some("https://example.org/apply"),
            ..OriginHeaders::default()
        };
        assert_eq!(extract_origin_domain(&headers).unwrap(), "example.org");
    }

    #[test]
    fn missing_headers_are_reported() {
        let headers = OriginHeaders {
            origin: Some("  "),
            ..OriginHeaders::default()
        };
        assert_eq!(extract_origin_domain(&headers), Err(OriginError::Missing));
    }

    #[test]
    fn rejects_values_without_hostname() {
        let err = normalize_domain("not a url").unwrap_err();
        assert!(matches!(err, OriginError::Unparseable(_)));
    }

    #[test]
    fn lowercases_and_drops_port() {
        assert_eq!(
            normalize_domain("HTTPS://WWW.KGKTechnologies.COM:8443/apply").unwrap(),
            "kgktechnologies.com"
        );
    }
}
