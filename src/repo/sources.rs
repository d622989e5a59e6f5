//! apt source-list generation for the build root.
//!
//! The primary architecture is served from `archive.ubuntu.com`, optionally
//! through a country mirror picked with a geo-IP lookup. Every other
//! architecture lives on `ports.ubuntu.com`, where no mirrors exist and the
//! lookup is skipped entirely.

use tracing::debug;

use crate::error::SourcesError;

/// Architecture served from the main archive
pub const PRIMARY_ARCH: &str = "amd64";

const GEOIP_SERVER: &str = "http://geoip.ubuntu.com/lookup";

/// Default source list template.
///
/// Placeholders: `${prefix}`, `${suffix}`, `${security}`, `${release}`.
pub const DEFAULT_SOURCES: &str = "\
deb http://${prefix}.ubuntu.com/${suffix}/ ${release} main restricted
deb http://${prefix}.ubuntu.com/${suffix}/ ${release}-updates main restricted
deb http://${prefix}.ubuntu.com/${suffix}/ ${release} universe
deb http://${prefix}.ubuntu.com/${suffix}/ ${release}-updates universe
deb http://${prefix}.ubuntu.com/${suffix}/ ${release} multiverse
deb http://${prefix}.ubuntu.com/${suffix}/ ${release}-updates multiverse
deb http://${security}.ubuntu.com/${suffix} ${release}-security main restricted
deb http://${security}.ubuntu.com/${suffix} ${release}-security universe
deb http://${security}.ubuntu.com/${suffix} ${release}-security multiverse
";

/// Source of the country code used to pick an archive mirror
#[async_trait::async_trait]
pub trait MirrorLookup: Send + Sync {
    /// Lowercase country code such as `ar`, or `None` to use the main archive.
    async fn country_code(&self) -> Option<String>;
}

/// Looks up the caller's country with the Ubuntu geo-IP service.
pub struct GeoIpLookup {
    url: String,
}

impl Default for GeoIpLookup {
    fn default() -> Self {
        Self {
            url: GEOIP_SERVER.to_string(),
        }
    }
}

impl GeoIpLookup {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait::async_trait]
impl MirrorLookup for GeoIpLookup {
    async fn country_code(&self) -> Option<String> {
        let body = match reqwest::get(&self.url).await {
            Ok(resp) => match resp.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!(target: "sources", url = %self.url, error = %e, "geo-IP response unreadable");
                    return None;
                }
            },
            Err(e) => {
                debug!(target: "sources", url = %self.url, error = %e, "geo-IP lookup failed");
                return None;
            }
        };
        parse_country_code(&body)
    }
}

/// Never resolves a country; always selects the main archive.
pub struct NoMirror;

#[async_trait::async_trait]
impl MirrorLookup for NoMirror {
    async fn country_code(&self) -> Option<String> {
        None
    }
}

/// Extract `<CountryCode>` from a geo-IP response.
pub fn parse_country_code(xml: &str) -> Option<String> {
    const OPEN: &str = "<CountryCode>";
    const CLOSE: &str = "</CountryCode>";

    let start = xml.find(OPEN)? + OPEN.len();
    let len = xml[start..].find(CLOSE)?;
    let code = xml[start..start + len].trim();
    if code.is_empty() {
        None
    } else {
        Some(code.to_lowercase())
    }
}

/// Render `template` for `arch` and `release`.
///
/// `lookup` is consulted only for [`PRIMARY_ARCH`].
pub async fn format_sources_list<L>(
    template: &str,
    arch: &str,
    release: &str,
    lookup: &L,
) -> Result<String, SourcesError>
where
    L: MirrorLookup + ?Sized,
{
    let (prefix, suffix, security) = if arch == PRIMARY_ARCH {
        let prefix = match lookup.country_code().await {
            Some(cc) => format!("{}.archive", cc),
            None => "archive".to_string(),
        };
        (prefix, "ubuntu", "security")
    } else {
        ("ports".to_string(), "ubuntu-ports", "ports")
    };

    debug!(target: "sources", arch = %arch, release = %release, prefix = %prefix, "formatting sources list");

    substitute(
        template,
        &[
            ("prefix", prefix.as_str()),
            ("suffix", suffix),
            ("security", security),
            ("release", release),
        ],
    )
}

/// Replace `${name}` placeholders. Unknown names are an error.
fn substitute(template: &str, vars: &[(&str, &str)]) -> Result<String, SourcesError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find("${") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| SourcesError::Unterminated(rest[pos..].lines().next().unwrap_or("").to_string()))?;
        let name = &after[..end];
        let value = vars
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
            .ok_or_else(|| SourcesError::UnknownPlaceholder(name.to_string()))?;
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedMirror {
        code: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl FixedMirror {
        fn new(code: Option<&'static str>) -> Self {
            Self {
                code,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl MirrorLookup for FixedMirror {
        async fn country_code(&self) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.code.map(str::to_string)
        }
    }

    #[tokio::test]
    async fn test_sources_amd64_vivid() {
        let mirror = FixedMirror::new(Some("ar"));
        let sources = format_sources_list(DEFAULT_SOURCES, "amd64", "vivid", &mirror)
            .await
            .unwrap();

        let expected = "\
deb http://ar.archive.ubuntu.com/ubuntu/ vivid main restricted
deb http://ar.archive.ubuntu.com/ubuntu/ vivid-updates main restricted
deb http://ar.archive.ubuntu.com/ubuntu/ vivid universe
deb http://ar.archive.ubuntu.com/ubuntu/ vivid-updates universe
deb http://ar.archive.ubuntu.com/ubuntu/ vivid multiverse
deb http://ar.archive.ubuntu.com/ubuntu/ vivid-updates multiverse
deb http://security.ubuntu.com/ubuntu vivid-security main restricted
deb http://security.ubuntu.com/ubuntu vivid-security universe
deb http://security.ubuntu.com/ubuntu vivid-security multiverse
";
        assert_eq!(sources, expected);
        assert_eq!(mirror.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sources_armhf_trusty() {
        let mirror = FixedMirror::new(Some("ar"));
        let sources = format_sources_list(DEFAULT_SOURCES, "armhf", "trusty", &mirror)
            .await
            .unwrap();

        let expected = "\
deb http://ports.ubuntu.com/ubuntu-ports/ trusty main restricted
deb http://ports.ubuntu.com/ubuntu-ports/ trusty-updates main restricted
deb http://ports.ubuntu.com/ubuntu-ports/ trusty universe
deb http://ports.ubuntu.com/ubuntu-ports/ trusty-updates universe
deb http://ports.ubuntu.com/ubuntu-ports/ trusty multiverse
deb http://ports.ubuntu.com/ubuntu-ports/ trusty-updates multiverse
deb http://ports.ubuntu.com/ubuntu-ports trusty-security main restricted
deb http://ports.ubuntu.com/ubuntu-ports trusty-security universe
deb http://ports.ubuntu.com/ubuntu-ports trusty-security multiverse
";
        assert_eq!(sources, expected);
        assert_eq!(mirror.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sources_without_country_uses_main_archive() {
        let sources = format_sources_list(DEFAULT_SOURCES, "amd64", "xenial", &NoMirror)
            .await
            .unwrap();
        assert!(sources.starts_with("deb http://archive.ubuntu.com/ubuntu/ xenial main restricted\n"));
    }

    #[tokio::test]
    async fn test_unknown_placeholder_is_rejected() {
        let err = format_sources_list("deb http://${mirror}/ ${release} main\n", "armhf", "trusty", &NoMirror)
            .await
            .unwrap_err();
        assert!(matches!(err, SourcesError::UnknownPlaceholder(ref name) if name == "mirror"));
    }

    #[test]
    fn test_unterminated_placeholder_is_rejected() {
        let err = substitute("deb ${release main", &[("release", "trusty")]).unwrap_err();
        assert!(matches!(err, SourcesError::Unterminated(_)));
    }

    #[test]
    fn test_parse_country_code() {
        let xml = "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>\
                   <Ip>190.2.1.1</Ip><Status>OK</Status><CountryCode>AR</CountryCode>\
                   <CountryCode3>ARG</CountryCode3></Response>";
        assert_eq!(parse_country_code(xml), Some("ar".to_string()));
        assert_eq!(parse_country_code("<Response><CountryCode></CountryCode></Response>"), None);
        assert_eq!(parse_country_code("not xml"), None);
    }
}
