//! Normalizers, validators, classifiers and label enrichers referenced by
//! the network catalog schemas.
//!
//! Every function here is pure. Normalizers are idempotent, so they can run
//! before classification and again during construction.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::OnceLock;

use crate::cache::BoundedCache;
use crate::schema::{Classifier, LabelEnricher, Normalizer, Validator};
use crate::value::{Attributes, Value};

/// Capacity of the process-wide IP parsing cache.
pub const IP_INFO_CACHE_CAPACITY: usize = 128;

/// Facts derived from parsing an IP address string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpInfo {
    /// Canonical text form (compressed, lowercase for IPv6).
    pub normalized: String,
    /// Inside a private, reserved or link-local range.
    pub is_private: bool,
    /// Loopback address.
    pub is_loopback: bool,
    /// 4 or 6.
    pub version: u8,
}

const PRIVATE_V4: &[([u8; 4], u32)] = &[
    ([0, 0, 0, 0], 8),
    ([10, 0, 0, 0], 8),
    ([127, 0, 0, 0], 8),
    ([169, 254, 0, 0], 16),
    ([172, 16, 0, 0], 12),
    ([192, 0, 0, 0], 29),
    ([192, 0, 0, 170], 31),
    ([192, 0, 2, 0], 24),
    ([192, 168, 0, 0], 16),
    ([198, 18, 0, 0], 15),
    ([198, 51, 100, 0], 24),
    ([203, 0, 113, 0], 24),
    ([240, 0, 0, 0], 4),
    ([255, 255, 255, 255], 32),
];

const PRIVATE_V6: &[([u16; 8], u32)] = &[
    ([0, 0, 0, 0, 0, 0, 0, 1], 128),
    ([0, 0, 0, 0, 0, 0, 0, 0], 128),
    ([0, 0, 0, 0, 0, 0xffff, 0, 0], 96),
    ([0x100, 0, 0, 0, 0, 0, 0, 0], 64),
    ([0x2001, 0, 0, 0, 0, 0, 0, 0], 23),
    ([0x2001, 0x2, 0, 0, 0, 0, 0, 0], 48),
    ([0x2001, 0xdb8, 0, 0, 0, 0, 0, 0], 32),
    ([0x2001, 0x10, 0, 0, 0, 0, 0, 0], 28),
    ([0xfc00, 0, 0, 0, 0, 0, 0, 0], 7),
    ([0xfe80, 0, 0, 0, 0, 0, 0, 0], 10),
];

fn v4_in(addr: Ipv4Addr, network: [u8; 4], prefix: u32) -> bool {
    let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
    u32::from(addr) & mask == u32::from(Ipv4Addr::from(network)) & mask
}

fn v6_in(addr: Ipv6Addr, network: [u16; 8], prefix: u32) -> bool {
    let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
    u128::from(addr) & mask == u128::from(Ipv6Addr::from(network)) & mask
}

fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => PRIVATE_V4.iter().any(|(net, prefix)| v4_in(v4, *net, *prefix)),
        IpAddr::V6(v6) => PRIVATE_V6.iter().any(|(net, prefix)| v6_in(v6, *net, *prefix)),
    }
}

fn ip_cache() -> &'static BoundedCache<String, IpInfo> {
    static CACHE: OnceLock<BoundedCache<String, IpInfo>> = OnceLock::new();
    CACHE.get_or_init(|| BoundedCache::new(IP_INFO_CACHE_CAPACITY))
}

/// Parses an address, memoized in a bounded process-wide cache.
pub fn ip_info(address: &str) -> Result<IpInfo, String> {
    ip_cache().get_or_try_insert(address.to_string(), || {
        let ip: IpAddr = address
            .parse()
            .map_err(|_| format!("'{address}' does not appear to be an IPv4 or IPv6 address"))?;
        Ok(IpInfo {
            normalized: ip.to_string().to_lowercase(),
            is_private: is_private(ip),
            is_loopback: ip.is_loopback(),
            version: if ip.is_ipv4() { 4 } else { 6 },
        })
    })
}

fn expect_str<'a>(value: &'a Value, what: &str) -> Result<&'a str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("{what} must be a string, got {}", value.type_name()))
}

/// Canonicalizes an IP address string.
pub fn normalize_ip(value: &Value) -> Result<Value, String> {
    let address = expect_str(value, "IP address")?;
    ip_info(address).map(|info| Value::String(info.normalized))
}

/// Chooses `PrivateIPAddress` or `PublicIPAddress` from the `address` field.
#[must_use]
pub fn classify_ip(attributes: &Attributes) -> Option<String> {
    let address = attributes.get("address")?.as_str()?;
    let info = ip_info(address).ok()?;
    let class_name = if info.is_private {
        "PrivateIPAddress"
    } else {
        "PublicIPAddress"
    };
    Some(class_name.to_string())
}

/// Adds `IPv4Address` or `IPv6Address` depending on the address version.
#[must_use]
pub fn ip_version_labels(attributes: &Attributes) -> Vec<String> {
    let Some(info) = attributes
        .get("address")
        .and_then(Value::as_str)
        .and_then(|address| ip_info(address).ok())
    else {
        return Vec::new();
    };
    match info.version {
        4 => vec!["IPv4Address".to_string()],
        _ => vec!["IPv6Address".to_string()],
    }
}

/// A domain needs at least one dot.
#[must_use]
pub fn validate_domain(value: &Value) -> bool {
    value.as_str().is_some_and(|domain| domain.contains('.'))
}

/// An email address needs an `@` and at least one dot.
#[must_use]
pub fn validate_email_address(value: &Value) -> bool {
    value
        .as_str()
        .is_some_and(|address| address.contains('@') && address.contains('.'))
}

/// Lowercases and trims a string value.
pub fn normalize_lowercase(value: &Value) -> Result<Value, String> {
    let text = expect_str(value, "value")?;
    Ok(Value::String(text.trim().to_lowercase()))
}

/// Labels mail and web servers by their host prefix.
#[must_use]
pub fn enrich_domain_labels(attributes: &Attributes) -> Vec<String> {
    let Some(address) = attributes.get("address").and_then(Value::as_str) else {
        return Vec::new();
    };
    let address = address.to_lowercase();
    let mut labels = Vec::new();
    if address.starts_with("mx.") {
        labels.push("MailServer".to_string());
    }
    if address.starts_with("www.") {
        labels.push("WebServer".to_string());
    }
    labels
}

/// Canonicalizes IP address text.
pub const NORMALIZE_IP: Normalizer = Normalizer {
    name: "normalize_ip",
    func: normalize_ip,
};

/// Trims and lowercases strings.
pub const NORMALIZE_LOWERCASE: Normalizer = Normalizer {
    name: "normalize_lowercase",
    func: normalize_lowercase,
};

/// Accepts names containing a dot.
pub const VALIDATE_DOMAIN: Validator = Validator {
    name: "validate_domain",
    func: validate_domain,
};

/// Accepts strings containing `@` and a dot.
pub const VALIDATE_EMAIL_ADDRESS: Validator = Validator {
    name: "validate_email_address",
    func: validate_email_address,
};

/// Chooses `PrivateIPAddress` or `PublicIPAddress`.
pub const CLASSIFY_IP: Classifier = Classifier {
    name: "classify_ip",
    func: classify_ip,
};

/// Adds `IPv4Address` or `IPv6Address`.
pub const IP_VERSION_LABELS: LabelEnricher = LabelEnricher {
    name: "ip_version_labels",
    func: ip_version_labels,
};

/// Adds `MailServer` for `mx.` hosts and `WebServer` for `www.` hosts.
pub const ENRICH_DOMAIN_LABELS: LabelEnricher = LabelEnricher {
    name: "enrich_domain_labels",
    func: enrich_domain_labels,
};
