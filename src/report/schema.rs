use serde_json::{json, Value};

const NAMESPACE: &str = "atmon";

/// Writer schema embedded in every batch container.
///
/// Field order here is the order [`EventRecord`](super::EventRecord) encodes
/// in, and the column order of the warehouse table.
pub fn event_schema() -> Value {
    json!({
        "type": "record",
        "name": "Event",
        "namespace": NAMESPACE,
        "fields": [
            {"name": "date", "type": {"type": "int", "logicalType": "date"}},
            {"name": "time", "type": "long"},
            {"name": "kind", "type": {
                "type": "enum",
                "name": "EventKind",
                "symbols": ["PLAY", "STALLED", "WAITING", "RESOURCE"]
            }},
            {"name": "header", "type": header_schema()},
            {"name": "buffer_time", "type": ["null", buffer_time_schema()], "default": null},
            {"name": "resource_time", "type": ["null", resource_time_schema()], "default": null},
            {"name": "network", "type": ["null", network_schema()], "default": null},
            {"name": "geo", "type": ["null", geo_schema()], "default": null}
        ]
    })
}

fn header_schema() -> Value {
    json!({
        "type": "record",
        "name": "Header",
        "fields": [
            {"name": "client_id", "type": "string"},
            {"name": "session_id", "type": "string"},
            {"name": "sequence", "type": "long"},
            {"name": "url", "type": "string"},
            {"name": "timestamp", "type": "long"}
        ]
    })
}

fn buffer_time_schema() -> Value {
    json!({
        "type": "record",
        "name": "BufferTime",
        "fields": [
            {"name": "start", "type": "double"},
            {"name": "duration", "type": "double"},
            {"name": "position", "type": "double"},
            {"name": "ready_state", "type": "int"}
        ]
    })
}

fn resource_time_schema() -> Value {
    json!({
        "type": "record",
        "name": "ResourceTime",
        "fields": [
            {"name": "name", "type": "string"},
            {"name": "initiator_type", "type": "string"},
            {"name": "start_time", "type": "double"},
            {"name": "duration", "type": "double"},
            {"name": "fetch_start", "type": "double"},
            {"name": "response_end", "type": "double"},
            {"name": "transfer_size", "type": "long"},
            {"name": "encoded_body_size", "type": "long"},
            {"name": "decoded_body_size", "type": "long"},
            {"name": "next_hop_protocol", "type": "string"}
        ]
    })
}

fn network_schema() -> Value {
    json!({
        "type": "record",
        "name": "Network",
        "fields": [
            {"name": "asn", "type": "int"},
            {"name": "organization", "type": "string"}
        ]
    })
}

fn geo_schema() -> Value {
    json!({
        "type": "record",
        "name": "Geo",
        "fields": [
            {"name": "city_id", "type": "int"},
            {"name": "city_name", "type": "string"},
            {"name": "continent_id", "type": "int"},
            {"name": "continent_code", "type": "string"},
            {"name": "continent_name", "type": "string"},
            {"name": "country_id", "type": "int"},
            {"name": "country_iso", "type": "string"},
            {"name": "country_name", "type": "string"},
            {"name": "subdivision_id", "type": "int"},
            {"name": "subdivision_iso", "type": "string"},
            {"name": "subdivision_name", "type": "string"},
            {"name": "is_in_european_union", "type": "boolean"},
            {"name": "is_anonymous_proxy", "type": "boolean"},
            {"name": "is_satellite_provider", "type": "boolean"}
        ]
    })
}
