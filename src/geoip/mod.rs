//! Client address enrichment.

pub mod maxmind;

use std::net::IpAddr;
use thiserror::Error;
use tracing::debug;

pub use crate::report::Enrichment;
pub use maxmind::MaxMindEnricher;

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("invalid client address '{0}'")]
    InvalidAddress(String),

    #[error("failed to open GeoIP database '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: maxminddb::MaxMindDBError,
    },

    #[error("GeoIP lookup failed: {0}")]
    Lookup(#[from] maxminddb::MaxMindDBError),
}

/// Maps a client address to network and location metadata
pub trait Enricher: Send + Sync {
    fn lookup(&self, ip: IpAddr) -> Result<Enrichment, EnrichmentError>;
}

/// Used when no GeoIP databases are configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEnrichment;

impl Enricher for NoEnrichment {
    fn lookup(&self, _ip: IpAddr) -> Result<Enrichment, EnrichmentError> {
        Ok(Enrichment::none())
    }
}

/// Enriches from a raw header value. Never fails: an unparsable address or a
/// failed lookup yields no enrichment.
pub fn enrich_from_header(enricher: &dyn Enricher, raw: &str) -> Enrichment {
    let result = parse_client_ip(raw).and_then(|ip| enricher.lookup(ip));
    match result {
        Ok(enrichment) => enrichment,
        Err(e) => {
            debug!(error = %e, "Client address enrichment skipped");
            Enrichment::none()
        }
    }
}

/// Proxies may append a chain (`client, proxy1, proxy2`); the first entry is
/// the client.
fn parse_client_ip(raw: &str) -> Result<IpAddr, EnrichmentError> {
    let first = raw.split(',').next().unwrap_or_default().trim();
    first
        .parse()
        .map_err(|_| EnrichmentError::InvalidAddress(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Network;

    struct FixedEnricher;

    impl Enricher for FixedEnricher {
        fn lookup(&self, ip: IpAddr) -> Result<Enrichment, EnrichmentError> {
            if ip.is_loopback() {
                return Err(EnrichmentError::InvalidAddress(ip.to_string()));
            }
            Ok(Enrichment {
                network: Some(Network {
                    asn: 64512,
                    organization: "Test Net".to_string(),
                }),
                geo: None,
            })
        }
    }

    #[test]
    fn test_first_address_in_chain_used() {
        assert_eq!(
            parse_client_ip("203.0.113.9, 10.0.0.1").unwrap(),
            "203.0.113.9".parse::<IpAddr>().unwrap()
        );
        assert!(parse_client_ip(" 2001:db8::1 ").unwrap().is_ipv6());
    }

    #[test]
    fn test_garbage_header_yields_no_enrichment() {
        assert!(enrich_from_header(&FixedEnricher, "not-an-ip").is_empty());
        assert!(enrich_from_header(&FixedEnricher, "").is_empty());
    }

    #[test]
    fn test_lookup_failure_yields_no_enrichment() {
        assert!(enrich_from_header(&FixedEnricher, "127.0.0.1").is_empty());
    }

    #[test]
    fn test_successful_lookup_passed_through() {
        let enrichment = enrich_from_header(&FixedEnricher, "198.51.100.4");
        assert_eq!(enrichment.network.map(|n| n.asn), Some(64512));
        assert!(enrichment.geo.is_none());
    }
}
