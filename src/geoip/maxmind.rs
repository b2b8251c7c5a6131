use super::{Enricher, EnrichmentError};
use crate::config::types::GeoIpConfig;
use crate::report::{Enrichment, Geo, Network};
use maxminddb::{MaxMindDBError, Reader};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::Path;
use tracing::info;

/// GeoLite2 ASN and City databases loaded into memory
pub struct MaxMindEnricher {
    asns: Reader<Vec<u8>>,
    cities: Reader<Vec<u8>>,
}

impl MaxMindEnricher {
    pub fn open(config: &GeoIpConfig) -> Result<Self, EnrichmentError> {
        let asns = open_reader(&config.asn_db_path)?;
        let cities = open_reader(&config.city_db_path)?;

        info!(
            asn_db = %config.asn_db_path.display(),
            asn_build = asns.metadata.build_epoch,
            city_db = %config.city_db_path.display(),
            city_build = cities.metadata.build_epoch,
            "Loaded GeoIP databases"
        );

        Ok(Self { asns, cities })
    }
}

fn open_reader(path: &Path) -> Result<Reader<Vec<u8>>, EnrichmentError> {
    Reader::open_readfile(path).map_err(|source| EnrichmentError::Open {
        path: path.display().to_string(),
        source,
    })
}

/// Treats "address not in database" as an absent record
fn lookup_optional<T>(reader: &Reader<Vec<u8>>, ip: IpAddr) -> Result<Option<T>, EnrichmentError>
where
    T: for<'de> Deserialize<'de>,
{
    match reader.lookup::<T>(ip) {
        Ok(record) => Ok(Some(record)),
        Err(MaxMindDBError::AddressNotFoundError(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Enricher for MaxMindEnricher {
    fn lookup(&self, ip: IpAddr) -> Result<Enrichment, EnrichmentError> {
        let asn: Option<AsnRecord> = lookup_optional(&self.asns, ip)?;
        let city: Option<CityRecord> = lookup_optional(&self.cities, ip)?;

        Ok(Enrichment {
            network: asn.and_then(AsnRecord::into_network),
            geo: city.and_then(CityRecord::into_geo),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AsnRecord {
    autonomous_system_number: i32,
    autonomous_system_organization: String,
}

impl AsnRecord {
    /// ASN 0 is reserved and marks an empty record
    fn into_network(self) -> Option<Network> {
        if self.autonomous_system_number == 0 {
            return None;
        }
        Some(Network {
            asn: self.autonomous_system_number,
            organization: self.autonomous_system_organization,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Names {
    en: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NamedPlace {
    geoname_id: i32,
    code: String,
    iso_code: String,
    names: Names,
    is_in_european_union: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Traits {
    is_anonymous_proxy: bool,
    is_satellite_provider: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CityRecord {
    city: NamedPlace,
    continent: NamedPlace,
    country: NamedPlace,
    subdivisions: Vec<NamedPlace>,
    traits: Traits,
}

impl CityRecord {
    /// Records without a country carry no usable location
    fn into_geo(self) -> Option<Geo> {
        if self.country.geoname_id == 0 {
            return None;
        }

        let subdivision = self.subdivisions.into_iter().next().unwrap_or_default();

        Some(Geo {
            city_id: self.city.geoname_id,
            city_name: self.city.names.en,
            continent_id: self.continent.geoname_id,
            continent_code: self.continent.code,
            continent_name: self.continent.names.en,
            country_id: self.country.geoname_id,
            country_iso: self.country.iso_code,
            country_name: self.country.names.en,
            subdivision_id: subdivision.geoname_id,
            subdivision_iso: subdivision.iso_code,
            subdivision_name: subdivision.names.en,
            is_in_european_union: self.country.is_in_european_union,
            is_anonymous_proxy: self.traits.is_anonymous_proxy,
            is_satellite_provider: self.traits.is_satellite_provider,
        })
    }
}
