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

use telemetry_relay::protocol::*;
use telemetry_relay::validator;

fn reading(timestamp: &str, volume: f64) -> Record {
    Record::Reading(ReadingRecord {
        timestamp: timestamp.to_string(),
        location: Location {
            latitude: -1.2921,
            longitude: 36.8219,
            speed: 3.0,
            altitude: 1650.0,
        },
        reading: ProbeReading {
            volume,
            ullage: 300.0,
            temperature: 24.1,
            product: 1500.2,
            water: 3.4,
        },
    })
}

#[test]
fn test_stream_layout() {
    let streams = Stream::all(&[12, 30]);

    assert_eq!(streams.len(), 3);
    assert_eq!(streams[0].file_name(), "error.csv");
    assert_eq!(streams[0].channel(), Channel::Errors);
    assert_eq!(streams[1].file_name(), "probe1.csv");
    assert_eq!(streams[1].probe_id(), Some(12));
    assert_eq!(streams[2].index(), 2);
    assert_eq!(streams[2].channel(), Channel::Readings);
}

#[test]
fn test_channel_names() {
    assert_eq!(Channel::Push.to_string(), "push");
    assert_eq!(Channel::Errors.as_str(), "errors");
    assert_eq!(Channel::Readings.as_str(), "readings");
}

#[test]
fn test_reading_line_format() {
    let Record::Reading(record) = reading("2024-01-01T00:00:05", 1200.5) else {
        unreachable!()
    };

    assert_eq!(
        record.to_line(),
        "2024-01-01T00:00:05;-1.292100;36.821900;3.0;1650.0;1200.5;300.0;24.1;1500.2;3.4"
    );
}

#[test]
fn test_error_line_decodes_by_stream_kind() {
    let line = "2024-01-01T00:00:00;Clock time invalid";

    match Record::decode(StreamKind::Errors, line) {
        Some(Record::Error(e)) => assert_eq!(e.message, "Clock time invalid"),
        other => panic!("unexpected decode: {:?}", other),
    }
    assert!(Record::decode(StreamKind::Readings, line).is_none());
}

#[test]
fn test_error_message_keeps_separator_text() {
    let record = ErrorRecord::parse("t;Volume error in probe 1: timeout; retry later").unwrap();
    assert_eq!(record.message, "Volume error in probe 1: timeout; retry later");
}

#[test]
fn test_error_batch_document() {
    let batch = vec![
        Record::Error(ErrorRecord::new("2024-01-01T00:00:00", "No position response")),
        Record::Error(ErrorRecord::new("2024-01-01T00:00:05", "Clock time invalid")),
    ];

    let body = encode_batch("relay-001", &Stream::errors(), &batch).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["device"], "relay-001");
    assert_eq!(json["errors"].as_array().unwrap().len(), 2);
    assert_eq!(json["errors"][1]["timestamp"], "2024-01-01T00:00:05");
    assert_eq!(json["errors"][1]["message"], "Clock time invalid");
}

#[test]
fn test_readings_batch_document() {
    let batch = vec![
        reading("2024-01-01T00:00:00", 1000.0),
        reading("2024-01-01T00:00:05", 1001.0),
    ];

    let body = encode_batch("relay-001", &Stream::readings(1, 12), &batch).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["time"], "2024-01-01T00:00:05");
    assert_eq!(json["position"]["altitude"], 1650.0);
    let measures = json["measures"].as_array().unwrap();
    assert_eq!(measures.len(), 2);
    assert_eq!(measures[0]["id"], 12);
    assert_eq!(measures[1]["volume"], 1001.0);
    assert!(measures[0].get("time").is_none());
}

#[test]
fn test_logged_lines_pass_validation() {
    let Record::Reading(record) = reading("2024-01-01T00:00:05", 1.0) else {
        unreachable!()
    };
    let error = ErrorRecord::new("2024-01-01T00:00:05", "tab\there");

    assert!(validator::accept(&record.to_line()).is_some());
    assert!(validator::accept(&error.to_line()).is_some());
    assert!(validator::accept("2024-01-01T00:00:05;\u{7}").is_none());
}

#[test]
fn test_non_ascii_error_event_survives_validation() {
    let record = ErrorRecord::new(
        "2024-01-01T00:00:05",
        "Temperature error in probe 1: capteur déconnecté",
    );
    let line = record.to_line();

    let accepted = validator::accept(&line).unwrap();
    match Record::decode(StreamKind::Errors, accepted) {
        Some(Record::Error(e)) => assert!(e.message.starts_with("Temperature error in probe 1")),
        other => panic!("unexpected decode: {:?}", other),
    }
}
