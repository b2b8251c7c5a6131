use serde::{Deserialize, Serialize};

/// Autonomous system the client address belongs to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub asn: i32,
    pub organization: String,
}

/// City-level location of the client address. Ids are GeoNames ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geo {
    pub city_id: i32,
    pub city_name: String,
    pub continent_id: i32,
    pub continent_code: String,
    pub continent_name: String,
    pub country_id: i32,
    pub country_iso: String,
    pub country_name: String,
    pub subdivision_id: i32,
    pub subdivision_iso: String,
    pub subdivision_name: String,
    pub is_in_european_union: bool,
    pub is_anonymous_proxy: bool,
    pub is_satellite_provider: bool,
}

/// Result of an address lookup. Either half may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub network: Option<Network>,
    pub geo: Option<Geo>,
}

impl Enrichment {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.network.is_none() && self.geo.is_none()
    }
}
