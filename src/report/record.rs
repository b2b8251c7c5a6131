use super::enrichment::{Geo, Network};
use super::event::{BufferTime, Header, ResourceTime};
use crate::avro::binary::{write_bool, write_double, write_int, write_long, write_string};
use crate::avro::{BinaryReader, Decode, DecodeError, Encode, EncodeError};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Play,
    Stalled,
    Waiting,
    Resource,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Play,
        EventKind::Stalled,
        EventKind::Waiting,
        EventKind::Resource,
    ];

    /// Position of the symbol in the schema's enum
    fn index(self) -> i32 {
        match self {
            EventKind::Play => 0,
            EventKind::Stalled => 1,
            EventKind::Waiting => 2,
            EventKind::Resource => 3,
        }
    }

    fn from_index(index: i32) -> Option<Self> {
        Self::ALL.get(usize::try_from(index).ok()?).copied()
    }

    pub fn is_buffer(self) -> bool {
        !matches!(self, EventKind::Resource)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Play => "play",
            EventKind::Stalled => "stalled",
            EventKind::Waiting => "waiting",
            EventKind::Resource => "resource",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Timing {
    #[serde(rename = "buffer_time")]
    Buffer(BufferTime),
    #[serde(rename = "resource_time")]
    Resource(ResourceTime),
}

/// One row of the warehouse table: a single sub-event plus the report's
/// shared receipt time and enrichment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub date: i32,
    pub time: i64,
    pub kind: EventKind,
    pub header: Header,
    #[serde(flatten)]
    pub timing: Timing,
    pub network: Option<Network>,
    pub geo: Option<Geo>,
}

impl Encode for EventRecord {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        match (&self.timing, self.kind.is_buffer()) {
            (Timing::Buffer(_), true) | (Timing::Resource(_), false) => {}
            _ => {
                return Err(EncodeError::Schema(format!(
                    "{} event carries the wrong timing payload",
                    self.kind
                )))
            }
        }

        write_int(buf, self.date);
        write_long(buf, self.time);
        write_int(buf, self.kind.index());
        encode_header(buf, &self.header);

        match &self.timing {
            Timing::Buffer(t) => {
                write_long(buf, 1);
                encode_buffer_time(buf, t);
                write_long(buf, 0);
            }
            Timing::Resource(t) => {
                write_long(buf, 0);
                write_long(buf, 1);
                encode_resource_time(buf, t);
            }
        }

        match &self.network {
            Some(n) => {
                write_long(buf, 1);
                write_int(buf, n.asn);
                write_string(buf, &n.organization);
            }
            None => write_long(buf, 0),
        }

        match &self.geo {
            Some(g) => {
                write_long(buf, 1);
                encode_geo(buf, g);
            }
            None => write_long(buf, 0),
        }

        Ok(())
    }
}

fn encode_header(buf: &mut Vec<u8>, h: &Header) {
    write_string(buf, &h.client_id);
    write_string(buf, &h.session_id);
    write_long(buf, h.sequence);
    write_string(buf, &h.url);
    write_long(buf, h.timestamp);
}

fn encode_buffer_time(buf: &mut Vec<u8>, t: &BufferTime) {
    write_double(buf, t.start);
    write_double(buf, t.duration);
    write_double(buf, t.position);
    write_int(buf, t.ready_state);
}

fn encode_resource_time(buf: &mut Vec<u8>, t: &ResourceTime) {
    write_string(buf, &t.name);
    write_string(buf, &t.initiator_type);
    write_double(buf, t.start_time);
    write_double(buf, t.duration);
    write_double(buf, t.fetch_start);
    write_double(buf, t.response_end);
    write_long(buf, t.transfer_size);
    write_long(buf, t.encoded_body_size);
    write_long(buf, t.decoded_body_size);
    write_string(buf, &t.next_hop_protocol);
}

fn encode_geo(buf: &mut Vec<u8>, g: &Geo) {
    write_int(buf, g.city_id);
    write_string(buf, &g.city_name);
    write_int(buf, g.continent_id);
    write_string(buf, &g.continent_code);
    write_string(buf, &g.continent_name);
    write_int(buf, g.country_id);
    write_string(buf, &g.country_iso);
    write_string(buf, &g.country_name);
    write_int(buf, g.subdivision_id);
    write_string(buf, &g.subdivision_iso);
    write_string(buf, &g.subdivision_name);
    write_bool(buf, g.is_in_european_union);
    write_bool(buf, g.is_anonymous_proxy);
    write_bool(buf, g.is_satellite_provider);
}

impl Decode for EventRecord {
    fn decode(r: &mut BinaryReader<'_>) -> Result<Self, DecodeError> {
        let date = r.read_int()?;
        let time = r.read_long()?;

        let offset = r.position();
        let symbol = r.read_int()?;
        let kind = EventKind::from_index(symbol).ok_or(DecodeError::InvalidValue {
            offset,
            message: format!("unknown event kind symbol {}", symbol),
        })?;

        let header = decode_header(r)?;

        let buffer_time = match r.read_union_index(2)? {
            1 => Some(decode_buffer_time(r)?),
            _ => None,
        };
        let resource_time = match r.read_union_index(2)? {
            1 => Some(decode_resource_time(r)?),
            _ => None,
        };

        let offset = r.position();
        let timing = match (buffer_time, resource_time) {
            (Some(t), None) => Timing::Buffer(t),
            (None, Some(t)) => Timing::Resource(t),
            _ => {
                return Err(DecodeError::InvalidValue {
                    offset,
                    message: "event must carry exactly one timing payload".to_string(),
                })
            }
        };

        let network = match r.read_union_index(2)? {
            1 => Some(Network {
                asn: r.read_int()?,
                organization: r.read_string()?,
            }),
            _ => None,
        };
        let geo = match r.read_union_index(2)? {
            1 => Some(decode_geo(r)?),
            _ => None,
        };

        Ok(EventRecord {
            date,
            time,
            kind,
            header,
            timing,
            network,
            geo,
        })
    }
}

fn decode_header(r: &mut BinaryReader<'_>) -> Result<Header, DecodeError> {
    Ok(Header {
        client_id: r.read_string()?,
        session_id: r.read_string()?,
        sequence: r.read_long()?,
        url: r.read_string()?,
        timestamp: r.read_long()?,
    })
}

fn decode_buffer_time(r: &mut BinaryReader<'_>) -> Result<BufferTime, DecodeError> {
    Ok(BufferTime {
        start: r.read_double()?,
        duration: r.read_double()?,
        position: r.read_double()?,
        ready_state: r.read_int()?,
    })
}

fn decode_resource_time(r: &mut BinaryReader<'_>) -> Result<ResourceTime, DecodeError> {
    Ok(ResourceTime {
        name: r.read_string()?,
        initiator_type: r.read_string()?,
        start_time: r.read_double()?,
        duration: r.read_double()?,
        fetch_start: r.read_double()?,
        response_end: r.read_double()?,
        transfer_size: r.read_long()?,
        encoded_body_size: r.read_long()?,
        decoded_body_size: r.read_long()?,
        next_hop_protocol: r.read_string()?,
    })
}

fn decode_geo(r: &mut BinaryReader<'_>) -> Result<Geo, DecodeError> {
    Ok(Geo {
        city_id: r.read_int()?,
        city_name: r.read_string()?,
        continent_id: r.read_int()?,
        continent_code: r.read_string()?,
        continent_name: r.read_string()?,
        country_id: r.read_int()?,
        country_iso: r.read_string()?,
        country_name: r.read_string()?,
        subdivision_id: r.read_int()?,
        subdivision_iso: r.read_string()?,
        subdivision_name: r.read_string()?,
        is_in_european_union: r.read_bool()?,
        is_anonymous_proxy: r.read_bool()?,
        is_satellite_provider: r.read_bool()?,
    })
}
