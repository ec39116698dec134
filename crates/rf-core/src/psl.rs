//! Public Suffix List lookups for eTLD+1 extraction
//!
//! The built-in list of the `psl` crate is used unless a list was loaded
//! at runtime with [`load_public_suffix_list`].

use std::sync::RwLock;

use publicsuffix::Psl as _;

/// Rejected Public Suffix List text.
#[derive(Debug, thiserror::Error)]
#[error("invalid public suffix list: {0}")]
pub struct SuffixListError(String);

static SUFFIX_LIST: RwLock<Option<publicsuffix::List>> = RwLock::new(None);

/// Parse a list in the publicsuffix.org format.
pub fn parse_public_suffix_list(text: &str) -> Result<publicsuffix::List, SuffixListError> {
    let list: publicsuffix::List = text.parse().map_err(|e: publicsuffix::Error| SuffixListError(e.to_string()))?;
    Ok(list)
}

/// Replace the built-in list for every later lookup.
pub fn load_public_suffix_list(text: &str) -> Result<(), SuffixListError> {
    let list = parse_public_suffix_list(text)?;
    match SUFFIX_LIST.write() {
        Ok(mut guard) => *guard = Some(list),
        Err(poisoned) => *poisoned.into_inner() = Some(list),
    }
    log::info!("Loaded public suffix list ({} bytes)", text.len());
    Ok(())
}

/// eTLD+1 of `host` according to `list`, `None` for public suffixes and
/// hosts under no known suffix.
pub fn registrable_domain_in<'a>(list: &publicsuffix::List, host: &'a str) -> Option<&'a str> {
    let len = list.domain(host.as_bytes())?.as_bytes().len();
    host.get(host.len() - len..)
}

/// Registrable domain (eTLD+1) of a host. IP addresses, public suffixes
/// and hosts without a known suffix are returned as is.
pub fn registrable_domain(host: &str) -> &str {
    let host = host.trim_end_matches('.');
    if host.starts_with('[') || host.parse::<std::net::IpAddr>().is_ok() {
        return host;
    }

    let found = match SUFFIX_LIST.read() {
        Ok(guard) => match guard.as_ref() {
            Some(list) => registrable_domain_in(list, host),
            None => builtin_registrable_domain(host),
        },
        Err(_) => builtin_registrable_domain(host),
    };
    found.unwrap_or(host)
}

fn builtin_registrable_domain(host: &str) -> Option<&str> {
    let len = ::psl::domain(host.as_bytes())?.as_bytes().len();
    host.get(host.len() - len..)
}
