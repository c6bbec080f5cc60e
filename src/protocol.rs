// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp layout used as the first field of every record line.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Longest error message stored in a record; longer messages are truncated.
pub const MAX_ERROR_MESSAGE_LEN: usize = 480;

const FIELD_SEPARATOR: char = ';';
const READING_FIELDS: usize = 10;

/// Kind of record a stream carries, which decides its line and wire format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Errors,
    Readings,
}

/// Remote channel a payload is sent on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Live snapshots, best effort
    Push,
    /// API endpoint for error batches
    Errors,
    /// API endpoint for reading batches
    Readings,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Push => "push",
            Channel::Errors => "errors",
            Channel::Readings => "readings",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An independently checkpointed record log.
///
/// Index 0 is the error stream; index `n` is the readings stream of the n-th
/// configured probe. The index selects the checkpoint slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Stream {
    index: usize,
    kind: StreamKind,
    name: String,
    probe_id: Option<u8>,
}

impl Stream {
    pub fn errors() -> Self {
        Self {
            index: 0,
            kind: StreamKind::Errors,
            name: "error".to_string(),
            probe_id: None,
        }
    }

    /// Readings stream for the probe at 1-based position `probe_no`.
    pub fn readings(probe_no: usize, probe_id: u8) -> Self {
        Self {
            index: probe_no,
            kind: StreamKind::Readings,
            name: format!("probe{}", probe_no),
            probe_id: Some(probe_id),
        }
    }

    /// Error stream followed by one readings stream per probe id.
    pub fn all(probe_ids: &[u8]) -> Vec<Stream> {
        std::iter::once(Stream::errors())
            .chain(
                probe_ids
                    .iter()
                    .enumerate()
                    .map(|(i, id)| Stream::readings(i + 1, *id)),
            )
            .collect()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn probe_id(&self) -> Option<u8> {
        self.probe_id
    }

    pub fn file_name(&self) -> String {
        format!("{}.csv", self.name)
    }

    pub fn channel(&self) -> Channel {
        match self.kind {
            StreamKind::Errors => Channel::Errors,
            StreamKind::Readings => Channel::Readings,
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Leading timestamp field of a record line, used as the resume marker.
pub fn timestamp_prefix(line: &str) -> &str {
    line.split_once(FIELD_SEPARATOR)
        .map_or(line, |(timestamp, _)| timestamp)
}

/// Last known position fix
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub altitude: f64,
}

/// The five register values sampled from one probe
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeReading {
    pub volume: f64,
    pub ullage: f64,
    pub temperature: f64,
    pub product: f64,
    pub water: f64,
}

/// Line of the error stream: `timestamp;message`
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub timestamp: String,
    pub message: String,
}

impl ErrorRecord {
    /// Build a record that the line validator will accept: control characters
    /// become spaces, anything else outside printable ASCII becomes `?`, and
    /// overlong messages are cut to [`MAX_ERROR_MESSAGE_LEN`] bytes.
    pub fn new(timestamp: impl Into<String>, message: &str) -> Self {
        let mut clean: String = message
            .chars()
            .map(|c| match c {
                ' '..='~' => c,
                c if c.is_control() => ' ',
                _ => '?',
            })
            .collect();
        truncate_on_char_boundary(&mut clean, MAX_ERROR_MESSAGE_LEN);
        Self {
            timestamp: timestamp.into(),
            message: clean,
        }
    }

    pub fn to_line(&self) -> String {
        format!("{}{}{}", self.timestamp, FIELD_SEPARATOR, self.message)
    }

    pub fn parse(line: &str) -> Option<Self> {
        let (timestamp, message) = line.split_once(FIELD_SEPARATOR)?;
        if timestamp.is_empty() {
            return None;
        }
        Some(Self {
            timestamp: timestamp.to_string(),
            message: message.to_string(),
        })
    }
}

/// Line of a readings stream: `timestamp;lat;lon;speed;altitude;v1;v2;v3;v4;v5`
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingRecord {
    pub timestamp: String,
    pub location: Location,
    pub reading: ProbeReading,
}

impl ReadingRecord {
    pub fn to_line(&self) -> String {
        let l = &self.location;
        let r = &self.reading;
        format!(
            "{};{:.6};{:.6};{:.1};{:.1};{:.1};{:.1};{:.1};{:.1};{:.1}",
            self.timestamp,
            l.latitude,
            l.longitude,
            l.speed,
            l.altitude,
            r.volume,
            r.ullage,
            r.temperature,
            r.product,
            r.water
        )
    }

    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        if fields.len() != READING_FIELDS || fields[0].is_empty() {
            return None;
        }
        let mut values = [0f64; READING_FIELDS - 1];
        for (slot, field) in values.iter_mut().zip(&fields[1..]) {
            *slot = field.trim().parse().ok()?;
        }
        Some(Self {
            timestamp: fields[0].to_string(),
            location: Location {
                latitude: values[0],
                longitude: values[1],
                speed: values[2],
                altitude: values[3],
            },
            reading: ProbeReading {
                volume: values[4],
                ullage: values[5],
                temperature: values[6],
                product: values[7],
                water: values[8],
            },
        })
    }
}

/// A validated line decoded according to its stream kind
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Error(ErrorRecord),
    Reading(ReadingRecord),
}

impl Record {
    pub fn decode(kind: StreamKind, line: &str) -> Option<Self> {
        match kind {
            StreamKind::Errors => ErrorRecord::parse(line).map(Record::Error),
            StreamKind::Readings => ReadingRecord::parse(line).map(Record::Reading),
        }
    }

    pub fn timestamp(&self) -> &str {
        match self {
            Record::Error(r) => &r.timestamp,
            Record::Reading(r) => &r.timestamp,
        }
    }
}

/// One entry of an error batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorEntry {
    pub timestamp: String,
    pub message: String,
}

/// Wire document for a batch of error records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub device: String,
    pub errors: Vec<ErrorEntry>,
}

/// One probe measurement inside a readings document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeasureEntry {
    pub id: u8,
    pub volume: f64,
    pub ullage: f64,
    pub temperature: f64,
    pub product: f64,
    pub water: f64,
}

impl MeasureEntry {
    pub fn new(id: u8, reading: &ProbeReading) -> Self {
        Self {
            id,
            volume: reading.volume,
            ullage: reading.ullage,
            temperature: reading.temperature,
            product: reading.product,
            water: reading.water,
        }
    }
}

/// Wire document for readings. Device, time and position appear once per
/// document; measures carry only probe values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingsPayload {
    pub device: String,
    pub time: String,
    pub position: Location,
    pub measures: Vec<MeasureEntry>,
}

/// Serialize a batch into its stream's wire document.
///
/// Readings documents take time and position from the last record of the
/// batch. Records of the other kind are ignored.
pub fn encode_batch(device: &str, stream: &Stream, batch: &[Record]) -> serde_json::Result<Vec<u8>> {
    match stream.kind() {
        StreamKind::Errors => {
            let errors = batch
                .iter()
                .filter_map(|record| match record {
                    Record::Error(e) => Some(ErrorEntry {
                        timestamp: e.timestamp.clone(),
                        message: e.message.clone(),
                    }),
                    Record::Reading(_) => None,
                })
                .collect();
            serde_json::to_vec(&ErrorPayload {
                device: device.to_string(),
                errors,
            })
        }
        StreamKind::Readings => {
            let readings: Vec<&ReadingRecord> = batch
                .iter()
                .filter_map(|record| match record {
                    Record::Reading(r) => Some(r),
                    Record::Error(_) => None,
                })
                .collect();
            let id = stream.probe_id().unwrap_or_default();
            let (time, position) = readings
                .last()
                .map(|r| (r.timestamp.clone(), r.location))
                .unwrap_or_default();
            serde_json::to_vec(&ReadingsPayload {
                device: device.to_string(),
                time,
                position,
                measures: readings
                    .iter()
                    .map(|r| MeasureEntry::new(id, &r.reading))
                    .collect(),
            })
        }
    }
}

fn truncate_on_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_prefix() {
        assert_eq!(
            timestamp_prefix("2024-01-01T00:00:00;1.0;2.0"),
            "2024-01-01T00:00:00"
        );
        assert_eq!(timestamp_prefix("no separator"), "no separator");
    }

    #[test]
    fn test_overlong_error_message_is_truncated() {
        let long = "x".repeat(MAX_ERROR_MESSAGE_LEN + 20);
        let record = ErrorRecord::new("2024-01-01T00:00:00", &long);
        assert_eq!(record.message.len(), MAX_ERROR_MESSAGE_LEN);
    }

    #[test]
    fn test_error_message_non_ascii_replaced() {
        let record = ErrorRecord::new("t", "Temperature error in probe 1: capteur déconnecté");
        assert_eq!(record.message, "Temperature error in probe 1: capteur d?connect?");
    }

    #[test]
    fn test_error_message_control_chars_flattened() {
        let record = ErrorRecord::new("t", "line one\nline two");
        assert_eq!(record.message, "line one line two");
        assert_eq!(record.to_line(), "t;line one line two");
    }

    #[test]
    fn test_reading_line_parse() {
        let line = "2024-01-01T00:00:05;-1.292100;36.821900;0.0;1650.0;1200.5;300.0;24.1;1500.2;3.4";
        let record = ReadingRecord::parse(line).unwrap();
        assert_eq!(record.timestamp, "2024-01-01T00:00:05");
        assert_eq!(record.location.altitude, 1650.0);
        assert_eq!(record.reading.water, 3.4);
        assert_eq!(record.to_line(), line);
    }

    #[test]
    fn test_reading_line_rejects_wrong_field_count() {
        assert!(ReadingRecord::parse("2024-01-01T00:00:05;1;2;3").is_none());
        assert!(ReadingRecord::parse("2024-01-01T00:00:05;a;2;3;4;5;6;7;8;9").is_none());
    }

    #[test]
    fn test_streams_are_indexed_by_position() {
        let streams = Stream::all(&[7, 9]);
        assert_eq!(streams.len(), 3);
        assert_eq!(streams[0].kind(), StreamKind::Errors);
        assert_eq!(streams[0].file_name(), "error.csv");
        assert_eq!(streams[2].index(), 2);
        assert_eq!(streams[2].probe_id(), Some(9));
        assert_eq!(streams[2].file_name(), "probe2.csv");
        assert_eq!(streams[2].channel(), Channel::Readings);
    }

    #[test]
    fn test_readings_payload_shares_position_once() {
        let stream = Stream::readings(1, 3);
        let make = |ts: &str, volume: f64| {
            Record::Reading(ReadingRecord {
                timestamp: ts.to_string(),
                location: Location {
                    latitude: 1.5,
                    ..Location::default()
                },
                reading: ProbeReading {
                    volume,
                    ..ProbeReading::default()
                },
            })
        };
        let batch = vec![make("t1", 10.0), make("t2", 20.0)];
        let bytes = encode_batch("dev-1", &stream, &batch).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["device"], "dev-1");
        assert_eq!(json["time"], "t2");
        assert_eq!(json["position"]["latitude"], 1.5);
        assert_eq!(json["measures"].as_array().unwrap().len(), 2);
        assert_eq!(json["measures"][1]["id"], 3);
        assert_eq!(json["measures"][1]["volume"], 20.0);
        assert!(json["measures"][0].get("latitude").is_none());
    }
}
