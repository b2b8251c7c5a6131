//! Report data model.
//!
//! A [`Report`] is one accepted request: the client's event lists plus the
//! receipt time and address enrichment shared by all of them. It fans out
//! into one [`EventRecord`] per sub-event, which is what batches contain.

pub mod enrichment;
pub mod event;
pub mod record;
pub mod schema;

use chrono::{DateTime, Utc};

pub use enrichment::{Enrichment, Geo, Network};
pub use event::{BufferEvent, BufferTime, ClientReport, Header, ResourceEvent, ResourceTime};
pub use record::{EventKind, EventRecord, Timing};
pub use schema::event_schema;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    date: i32,
    time: i64,
    network: Option<Network>,
    geo: Option<Geo>,
    events: ClientReport,
}

impl Report {
    pub fn new(events: ClientReport, enrichment: Enrichment, received_at: DateTime<Utc>) -> Self {
        let time = received_at.timestamp();
        Self {
            date: time.div_euclid(SECONDS_PER_DAY) as i32,
            time,
            network: enrichment.network,
            geo: enrichment.geo,
            events,
        }
    }

    /// Days since the Unix epoch at receipt
    pub fn date(&self) -> i32 {
        self.date
    }

    /// Unix seconds at receipt
    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn network(&self) -> Option<&Network> {
        self.network.as_ref()
    }

    pub fn geo(&self) -> Option<&Geo> {
        self.geo.as_ref()
    }

    pub fn event_count(&self) -> usize {
        self.events.event_count()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::Play => self.events.play.len(),
            EventKind::Stalled => self.events.stalled.len(),
            EventKind::Waiting => self.events.waiting.len(),
            EventKind::Resource => self.events.resource.len(),
        }
    }

    /// Fans the report out into records: play, then stalled, then waiting,
    /// then resource events, each in received order.
    pub fn records(&self) -> impl Iterator<Item = EventRecord> + '_ {
        let buffers = [
            (EventKind::Play, &self.events.play),
            (EventKind::Stalled, &self.events.stalled),
            (EventKind::Waiting, &self.events.waiting),
        ]
        .into_iter()
        .flat_map(move |(kind, events)| {
            events
                .iter()
                .map(move |e| self.record(kind, &e.header, Timing::Buffer(e.timing.clone())))
        });

        let resources = self.events.resource.iter().map(move |e| {
            self.record(
                EventKind::Resource,
                &e.header,
                Timing::Resource(e.timing.clone()),
            )
        });

        buffers.chain(resources)
    }

    fn record(&self, kind: EventKind, header: &Header, timing: Timing) -> EventRecord {
        EventRecord {
            date: self.date,
            time: self.time,
            kind,
            header: header.clone(),
            timing,
            network: self.network.clone(),
            geo: self.geo.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn buffer_event(sequence: i64) -> BufferEvent {
        BufferEvent {
            header: Header {
                client_id: "c1".to_string(),
                sequence,
                ..Header::default()
            },
            timing: BufferTime {
                duration: 250.0,
                ..BufferTime::default()
            },
        }
    }

    fn resource_event(sequence: i64) -> ResourceEvent {
        ResourceEvent {
            header: Header {
                client_id: "c1".to_string(),
                sequence,
                ..Header::default()
            },
            timing: ResourceTime {
                name: "https://cdn.example/seg.ts".to_string(),
                ..ResourceTime::default()
            },
        }
    }

    fn received_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 4, 14, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_fan_out_order_and_kinds() {
        let events = ClientReport {
            play: vec![buffer_event(1)],
            stalled: vec![],
            waiting: vec![buffer_event(2)],
            resource: vec![resource_event(3)],
        };
        let report = Report::new(events, Enrichment::none(), received_at());

        let records: Vec<EventRecord> = report.records().collect();

        assert_eq!(records.len(), 3);
        let kinds: Vec<EventKind> = records.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Play, EventKind::Waiting, EventKind::Resource]
        );
        let sequences: Vec<i64> = records.iter().map(|r| r.header.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);

        assert!(matches!(records[0].timing, Timing::Buffer(_)));
        assert!(matches!(records[1].timing, Timing::Buffer(_)));
        assert!(matches!(records[2].timing, Timing::Resource(_)));

        for record in &records {
            assert_eq!(record.date, report.date());
            assert_eq!(record.time, report.time());
        }
    }

    #[test]
    fn test_receipt_date_in_days() {
        let report = Report::new(ClientReport::default(), Enrichment::none(), received_at());
        assert_eq!(report.time(), 1_555_245_000);
        assert_eq!(report.date(), 18_000);
    }

    #[test]
    fn test_absent_enrichment_stays_absent() {
        let events = ClientReport {
            play: vec![buffer_event(1)],
            ..ClientReport::default()
        };
        let report = Report::new(events, Enrichment::none(), received_at());
        let record = report.records().next().unwrap();

        assert!(record.network.is_none());
        assert!(record.geo.is_none());
    }

    #[test]
    fn test_enrichment_shared_by_all_records() {
        let events = ClientReport {
            stalled: vec![buffer_event(1), buffer_event(2)],
            ..ClientReport::default()
        };
        let enrichment = Enrichment {
            network: Some(Network {
                asn: 15169,
                organization: "Google".to_string(),
            }),
            geo: None,
        };
        let report = Report::new(events, enrichment, received_at());

        for record in report.records() {
            assert_eq!(record.network.as_ref().map(|n| n.asn), Some(15169));
            assert!(record.geo.is_none());
        }
        assert_eq!(report.count(EventKind::Stalled), 2);
    }
}
