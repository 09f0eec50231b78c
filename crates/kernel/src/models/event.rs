//! Demo event records.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::record::{Base, Record, namespaced_id};

/// Partition holding all events.
pub const EVENT_PARTITION: &str = "event";

/// Events expire this long after they start.
pub const EVENT_RETENTION: TimeDelta = TimeDelta::days(180);

/// A scheduled event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(flatten)]
    pub base: Base,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Validated input for creating or editing an event.
#[derive(Debug, Clone, Deserialize)]
pub struct EventInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Event {
    pub fn new(input: EventInput) -> Self {
        let base = Base::new(EVENT_PARTITION, namespaced_id(EVENT_PARTITION))
            .with_ttl(input.start_time + EVENT_RETENTION);
        Self {
            base,
            name: input.name,
            description: input.description,
            kind: input.kind,
            start_time: input.start_time,
            end_time: input.end_time,
        }
    }

    /// The id part of the sort key, used in URLs.
    pub fn id(&self) -> &str {
        self.base
            .sk
            .split_once(':')
            .map_or(self.base.sk.as_str(), |(_, id)| id)
    }

    /// Sort key for an id taken from a URL.
    pub fn sort_key(id: &str) -> String {
        format!("{EVENT_PARTITION}:{id}")
    }

    /// Apply edited fields, keeping identity and bookkeeping.
    pub fn apply(&mut self, input: EventInput) {
        self.name = input.name;
        self.description = input.description;
        self.kind = input.kind;
        self.start_time = input.start_time;
        self.end_time = input.end_time;
        self.base.ttl = Some(input.start_time + EVENT_RETENTION);
    }

    /// Shift start and end by `by`, keeping the duration.
    pub fn postpone(&mut self, by: TimeDelta) {
        self.start_time += by;
        self.end_time = self.end_time.map(|end| end + by);
        self.base.ttl = Some(self.start_time + EVENT_RETENTION);
    }
}

impl Record for Event {
    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }
}

// Tests are allowed to use unwrap/expect freely.
#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn input() -> EventInput {
        serde_json::from_value(serde_json::json!({
            "name": "Launch",
            "kind": "meetup",
            "start_time": "2030-05-01T15:00:00+00:00",
            "end_time": null,
        }))
        .unwrap()
    }

    #[test]
    fn new_event_keys_and_ttl() {
        let event = Event::new(input());
        assert_eq!(event.base.pk, EVENT_PARTITION);
        assert_eq!(Event::sort_key(event.id()), event.base.sk);
        assert_eq!(
            event.base.ttl,
            Some(Utc.with_ymd_and_hms(2030, 10, 28, 15, 0, 0).unwrap())
        );
        assert_eq!(event.description, "");
        assert_eq!(event.end_time, None);
    }

    #[test]
    fn apply_moves_ttl() {
        let mut event = Event::new(input());
        let mut changed = input();
        changed.start_time = Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap();
        changed.name = "Relaunch".into();
        event.apply(changed);
        assert_eq!(event.name, "Relaunch");
        assert_eq!(
            event.base.ttl,
            Some(Utc.with_ymd_and_hms(2031, 6, 30, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn postpone_keeps_duration() {
        let mut with_end = input();
        with_end.end_time = Some(Utc.with_ymd_and_hms(2030, 5, 1, 17, 0, 0).unwrap());
        let mut event = Event::new(with_end);
        event.postpone(TimeDelta::minutes(90));
        assert_eq!(
            event.start_time,
            Utc.with_ymd_and_hms(2030, 5, 1, 16, 30, 0).unwrap()
        );
        assert_eq!(
            event.end_time,
            Some(Utc.with_ymd_and_hms(2030, 5, 1, 18, 30, 0).unwrap())
        );
        assert_eq!(event.base.ttl, Some(event.start_time + EVENT_RETENTION));

        let mut open_ended = Event::new(input());
        open_ended.postpone(TimeDelta::hours(1));
        assert_eq!(open_ended.end_time, None);
    }
}
