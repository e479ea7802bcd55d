use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use ipnet::IpNet;

/// Coarse-geography resolver over a MaxMind country database.
///
/// The reader is loaded once at startup and shared read-only across
/// requests. A configured path that cannot be opened is a configuration
/// failure and fatal to the service; per-request lookups never fail — any
/// miss is `None`.
#[derive(Clone)]
pub struct GeoResolver {
    reader: Option<Arc<maxminddb::Reader<Vec<u8>>>>,
}

impl GeoResolver {
    /// Open the database at `path`. Errors here should abort startup.
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let reader = maxminddb::Reader::open_readfile(path)
            .with_context(|| format!("failed to open GeoIP database at {path}"))?;
        Ok(Self {
            reader: Some(Arc::new(reader)),
        })
    }

    /// A resolver with no database: every lookup returns `None`.
    pub fn disabled() -> Self {
        Self { reader: None }
    }

    pub fn from_config(geoip_path: Option<&str>) -> anyhow::Result<Self> {
        match geoip_path {
            Some(path) => Self::open(path),
            None => Ok(Self::disabled()),
        }
    }

    /// Map a client IP to a 2-letter country code.
    ///
    /// Loopback and private-range addresses, unparseable input, and
    /// addresses absent from the database all return `None` — expected
    /// outcomes, not errors.
    pub fn lookup(&self, ip: &str) -> Option<String> {
        let reader = self.reader.as_ref()?;
        let addr = IpAddr::from_str(ip).ok()?;
        if is_non_public(addr) {
            return None;
        }

        let record: maxminddb::geoip2::Country = reader.lookup(addr).ok()?.decode().ok()??;
        record
            .country
            .iso_code
            .map(|s| s.to_string())
    }
}

/// Ranges that can never resolve to a country.
const NON_PUBLIC_RANGES: &[&str] = &[
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "100.64.0.0/10",
    "fc00::/7",
    "fe80::/10",
    "::1/128",
];

fn is_non_public(addr: IpAddr) -> bool {
    if addr.is_loopback() || addr.is_unspecified() {
        return true;
    }
    NON_PUBLIC_RANGES
        .iter()
        .filter_map(|cidr| IpNet::from_str(cidr).ok())
        .any(|net| net.contains(&addr))
}
