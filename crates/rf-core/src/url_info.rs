//! URL and origin views used by the matching hot path
//!
//! A `UrlInfo` is built once per request and shared by every rule check:
//! it keeps the serialized spec, a lowercased copy for case-insensitive
//! rules, and the byte span of the host inside the spec.

use url::{Position, Url};

// =============================================================================
// Origin
// =============================================================================

/// Origin of the document a request is made for.
///
/// Unlike `url::Origin`, all opaque origins compare equal. The activation
/// cache relies on this.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    Opaque,
    Tuple {
        scheme: String,
        host: String,
        port: u16,
    },
}

impl Origin {
    /// Origin of a URL.
    pub fn from_url(url: &Url) -> Self {
        match url.origin() {
            url::Origin::Tuple(scheme, host, port) => Origin::Tuple {
                scheme,
                host: host.to_string(),
                port,
            },
            url::Origin::Opaque(_) => Origin::Opaque,
        }
    }

    /// Parse an origin from a URL string. Unparseable input is opaque.
    pub fn parse(input: &str) -> Self {
        Url::parse(input)
            .map(|url| Self::from_url(&url))
            .unwrap_or(Origin::Opaque)
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, Origin::Opaque)
    }

    /// Host of a tuple origin.
    pub fn host(&self) -> Option<&str> {
        match self {
            Origin::Tuple { host, .. } => Some(host),
            Origin::Opaque => None,
        }
    }
}

// =============================================================================
// Url Info
// =============================================================================

/// Precomputed views of a request URL.
#[derive(Debug, Clone)]
pub struct UrlInfo {
    url: Url,
    fold_spec: String,
    host_start: usize,
    host_end: usize,
}

impl UrlInfo {
    pub fn new(url: Url) -> Self {
        let fold_spec = url.as_str().to_ascii_lowercase();
        let host_start = url[..Position::BeforeHost].len();
        let host_end = url[..Position::AfterHost].len();
        Self {
            url,
            fold_spec,
            host_start,
            host_end,
        }
    }

    pub fn parse(input: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(input)?))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Serialized URL.
    pub fn spec(&self) -> &str {
        self.url.as_str()
    }

    /// Lowercased serialized URL.
    pub fn fold_spec(&self) -> &str {
        &self.fold_spec
    }

    /// Byte range of the host inside `spec()`. Empty when there is no host.
    pub fn host_span(&self) -> (usize, usize) {
        (self.host_start, self.host_end)
    }

    pub fn host(&self) -> &str {
        &self.url.as_str()[self.host_start..self.host_end]
    }
}
