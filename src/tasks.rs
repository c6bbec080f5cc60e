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

//! Periodic tasks of the device
//!
//! Producers (position, registers, clock) refresh the shared snapshots and
//! raise error events. Consumers (live push, local log, sweep) act on those
//! snapshots. Every task runs one cycle at a time under the coordinator.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use crossbeam::queue::ArrayQueue;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::RegisterMap;
use crate::protocol::{
    Channel, ErrorRecord, Location, MeasureEntry, ProbeReading, ReadingRecord, ReadingsPayload,
    Stream,
};
use crate::sensors::{rows, Clock, PositionSource, PositionStatus, RegisterSource, StatusSink};
use crate::storage::RecordStore;
use crate::transport::Transport;
use crate::uploader::BatchUploader;

/// Latest reading per configured probe; `None` when the last poll failed
pub type ProbeSnapshot = Vec<Option<ProbeReading>>;

/// One cycle of a task scheduled by the coordinator
#[async_trait]
pub trait PeriodicTask: Send {
    fn name(&self) -> &'static str;

    async fn run_cycle(&mut self) -> Result<()>;
}

/// Bounded hand-off of error events to the local log writer.
///
/// Any task may report; only the local log task drains, so the error stream
/// keeps a single writer.
#[derive(Clone)]
pub struct ErrorLog {
    queue: Arc<ArrayQueue<ErrorRecord>>,
    clock: Arc<dyn Clock>,
}

impl ErrorLog {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity.max(1))),
            clock,
        }
    }

    pub fn report(&self, message: &str) {
        warn!("{}", message);
        let record = ErrorRecord::new(self.clock.timestamp(), message);
        if self.queue.push(record).is_err() {
            warn!("Error queue full, dropping event: {}", message);
        }
    }

    /// Put back an event that could not be logged yet.
    pub fn requeue(&self, record: ErrorRecord) {
        if let Err(record) = self.queue.push(record) {
            warn!("Error queue full, dropping event: {}", record.message);
        }
    }

    pub fn drain(&self) -> Vec<ErrorRecord> {
        std::iter::from_fn(|| self.queue.pop()).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Publishing side of the shared snapshots
pub struct SnapshotFeed {
    pub location: watch::Sender<Location>,
    pub probes: watch::Sender<ProbeSnapshot>,
    pub timestamp: watch::Sender<Option<String>>,
}

/// Read side of the shared snapshots
#[derive(Clone)]
pub struct Snapshots {
    pub location: watch::Receiver<Location>,
    pub probes: watch::Receiver<ProbeSnapshot>,
    pub timestamp: watch::Receiver<Option<String>>,
}

impl SnapshotFeed {
    pub fn new(probe_count: usize) -> Self {
        Self {
            location: watch::channel(Location::default()).0,
            probes: watch::channel(vec![None; probe_count]).0,
            timestamp: watch::channel(None).0,
        }
    }

    pub fn subscribe(&self) -> Snapshots {
        Snapshots {
            location: self.location.subscribe(),
            probes: self.probes.subscribe(),
            timestamp: self.timestamp.subscribe(),
        }
    }
}

/// Bring the link up if it is down. Returns whether it is usable.
async fn ensure_link(transport: &dyn Transport, status: &dyn StatusSink, errors: &ErrorLog) -> bool {
    if transport.connected().await {
        return true;
    }

    match transport.connect().await {
        Ok(()) => {
            info!("Connected via {} transport", transport.transport_type());
            status.print(rows::NETWORK, "Network connected");
            true
        }
        Err(e) => {
            debug!("Connect failed: {:#}", e);
            status.print(rows::NETWORK, "Network failed");
            errors.report("Network connection failed");
            false
        }
    }
}

pub struct PositionTask {
    source: Box<dyn PositionSource>,
    errors: ErrorLog,
    location: watch::Sender<Location>,
}

impl PositionTask {
    pub fn new(
        source: Box<dyn PositionSource>,
        errors: ErrorLog,
        location: watch::Sender<Location>,
    ) -> Self {
        Self {
            source,
            errors,
            location,
        }
    }
}

#[async_trait]
impl PeriodicTask for PositionTask {
    fn name(&self) -> &'static str {
        "position"
    }

    async fn run_cycle(&mut self) -> Result<()> {
        match self.source.update().await {
            PositionStatus::Updated => {
                let location = self.source.location();
                debug!(
                    latitude = location.latitude,
                    longitude = location.longitude,
                    "Position updated"
                );
                self.location.send_replace(location);
            }
            PositionStatus::NoResponse => self.errors.report("No position response"),
            PositionStatus::Invalid => self.errors.report("Invalid position data"),
        }
        Ok(())
    }
}

pub struct RegisterTask {
    source: Box<dyn RegisterSource>,
    probe_ids: Vec<u8>,
    registers: RegisterMap,
    errors: ErrorLog,
    readings: watch::Sender<ProbeSnapshot>,
}

impl RegisterTask {
    pub fn new(
        source: Box<dyn RegisterSource>,
        probe_ids: Vec<u8>,
        registers: RegisterMap,
        errors: ErrorLog,
        readings: watch::Sender<ProbeSnapshot>,
    ) -> Self {
        Self {
            source,
            probe_ids,
            registers,
            errors,
            readings,
        }
    }

    async fn poll_probe(&mut self, probe_id: u8) -> std::result::Result<ProbeReading, String> {
        let fields = [
            ("Volume", self.registers.volume),
            ("Ullage", self.registers.ullage),
            ("Temperature", self.registers.temperature),
            ("Product", self.registers.product),
            ("Water", self.registers.water),
        ];

        let mut values = [0.0f64; 5];
        let mut failures = Vec::new();
        for (value, (label, register)) in values.iter_mut().zip(fields) {
            match self.source.read(probe_id, register).await {
                Ok(v) if v >= 0.0 => *value = v,
                Ok(v) => failures.push(format!("{} error in probe {}: negative value {}", label, probe_id, v)),
                Err(e) => failures.push(format!("{} error in probe {}: {}", label, probe_id, e)),
            }
        }

        if !failures.is_empty() {
            return Err(failures.join(", "));
        }

        let [volume, ullage, temperature, product, water] = values;
        Ok(ProbeReading {
            volume,
            ullage,
            temperature,
            product,
            water,
        })
    }
}

#[async_trait]
impl PeriodicTask for RegisterTask {
    fn name(&self) -> &'static str {
        "registers"
    }

    async fn run_cycle(&mut self) -> Result<()> {
        let mut snapshot = Vec::with_capacity(self.probe_ids.len());
        for probe_id in self.probe_ids.clone() {
            match self.poll_probe(probe_id).await {
                Ok(reading) => snapshot.push(Some(reading)),
                Err(message) => {
                    self.errors.report(&message);
                    snapshot.push(None);
                }
            }
        }
        self.readings.send_replace(snapshot);
        Ok(())
    }
}

pub struct ClockTask {
    clock: Arc<dyn Clock>,
    errors: ErrorLog,
    status: Arc<dyn StatusSink>,
    timestamp: watch::Sender<Option<String>>,
}

impl ClockTask {
    pub fn new(
        clock: Arc<dyn Clock>,
        errors: ErrorLog,
        status: Arc<dyn StatusSink>,
        timestamp: watch::Sender<Option<String>>,
    ) -> Self {
        Self {
            clock,
            errors,
            status,
            timestamp,
        }
    }
}

#[async_trait]
impl PeriodicTask for ClockTask {
    fn name(&self) -> &'static str {
        "clock"
    }

    async fn run_cycle(&mut self) -> Result<()> {
        if !self.clock.is_valid() {
            self.status.print(rows::CLOCK, "Clock invalid");
            self.errors.report("Clock time invalid");
            return Ok(());
        }

        let now = self.clock.timestamp();
        self.status.print(rows::CLOCK, &now);
        self.timestamp.send_replace(Some(now));
        Ok(())
    }
}

/// Best-effort snapshot of all probes on the live channel, one attempt per
/// cycle.
pub struct PushTask {
    transport: Arc<dyn Transport>,
    device_id: String,
    probe_ids: Vec<u8>,
    snapshots: Snapshots,
    status: Arc<dyn StatusSink>,
    errors: ErrorLog,
}

impl PushTask {
    pub fn new(
        transport: Arc<dyn Transport>,
        device_id: String,
        probe_ids: Vec<u8>,
        snapshots: Snapshots,
        status: Arc<dyn StatusSink>,
        errors: ErrorLog,
    ) -> Self {
        Self {
            transport,
            device_id,
            probe_ids,
            snapshots,
            status,
            errors,
        }
    }

    fn payload(&self) -> Option<ReadingsPayload> {
        let time = self.snapshots.timestamp.borrow().clone()?;
        let position = *self.snapshots.location.borrow();
        let measures = self
            .snapshots
            .probes
            .borrow()
            .iter()
            .zip(&self.probe_ids)
            .filter_map(|(reading, id)| reading.as_ref().map(|r| MeasureEntry::new(*id, r)))
            .collect();

        Some(ReadingsPayload {
            device: self.device_id.clone(),
            time,
            position,
            measures,
        })
    }
}

#[async_trait]
impl PeriodicTask for PushTask {
    fn name(&self) -> &'static str {
        "push"
    }

    async fn run_cycle(&mut self) -> Result<()> {
        if !ensure_link(self.transport.as_ref(), self.status.as_ref(), &self.errors).await {
            self.status.print(rows::PUSH, "Push skipped");
            return Ok(());
        }

        let Some(payload) = self.payload() else {
            debug!("No valid time yet, skipping live push");
            return Ok(());
        };
        let body = Bytes::from(serde_json::to_vec(&payload)?);

        match self.transport.send(body, Channel::Push).await {
            Ok(()) => {
                debug!(measures = payload.measures.len(), "Live snapshot pushed");
                self.status.print(rows::PUSH, "Push sent");
            }
            Err(e) => {
                warn!("Live push failed: {:#}", e);
                self.status.print(rows::PUSH, "Push failed");
            }
        }
        Ok(())
    }
}

/// Sole writer of every record log.
///
/// Appends queued error events, then one readings line per probe with a
/// fresh reading. Each cycle's append count goes to the sweep task.
pub struct LocalLogTask {
    records: Arc<RecordStore>,
    error_stream: Stream,
    probe_streams: Vec<Stream>,
    errors: ErrorLog,
    snapshots: Snapshots,
    appended: mpsc::UnboundedSender<usize>,
    last_logged: Option<String>,
}

impl LocalLogTask {
    pub fn new(
        records: Arc<RecordStore>,
        streams: &[Stream],
        errors: ErrorLog,
        snapshots: Snapshots,
        appended: mpsc::UnboundedSender<usize>,
    ) -> Self {
        let (error_streams, probe_streams): (Vec<Stream>, Vec<Stream>) = streams
            .iter()
            .cloned()
            .partition(|stream| stream.probe_id().is_none());
        let error_stream = error_streams.into_iter().next().unwrap_or_else(Stream::errors);

        Self {
            records,
            error_stream,
            probe_streams,
            errors,
            snapshots,
            appended,
            last_logged: None,
        }
    }
}

#[async_trait]
impl PeriodicTask for LocalLogTask {
    fn name(&self) -> &'static str {
        "local-log"
    }

    async fn run_cycle(&mut self) -> Result<()> {
        let mut appended = 0;

        for record in self.errors.drain() {
            match self.records.append(&self.error_stream, &record.to_line()).await {
                Ok(()) => appended += 1,
                Err(e) => {
                    warn!("Error event not logged, retrying next cycle: {}", e);
                    self.errors.requeue(record);
                }
            }
        }

        let timestamp = self.snapshots.timestamp.borrow().clone();
        let location = *self.snapshots.location.borrow();
        let readings = self.snapshots.probes.borrow().clone();

        // A timestamp already logged would only duplicate the previous lines
        if let Some(timestamp) = timestamp.filter(|t| self.last_logged.as_ref() != Some(t)) {
            for (stream, reading) in self.probe_streams.iter().zip(readings) {
                let Some(reading) = reading else {
                    continue;
                };
                let line = ReadingRecord {
                    timestamp: timestamp.clone(),
                    location,
                    reading,
                }
                .to_line();

                match self.records.append(stream, &line).await {
                    Ok(()) => appended += 1,
                    Err(e) => self.errors.report(&format!("Failed to log {}: {}", stream, e)),
                }
            }
            self.last_logged = Some(timestamp);
        }

        if appended > 0 {
            debug!(appended, "Records appended");
            let _ = self.appended.send(appended);
        }
        Ok(())
    }
}

/// Uploads every stream once enough new records have piled up, and once
/// unconditionally on the first cycle after start.
pub struct SweepTask {
    uploader: BatchUploader,
    transport: Arc<dyn Transport>,
    streams: Vec<Stream>,
    status: Arc<dyn StatusSink>,
    errors: ErrorLog,
    appended: mpsc::UnboundedReceiver<usize>,
    pending: usize,
    threshold: usize,
    swept_once: bool,
}

impl SweepTask {
    pub fn new(
        uploader: BatchUploader,
        transport: Arc<dyn Transport>,
        streams: Vec<Stream>,
        status: Arc<dyn StatusSink>,
        errors: ErrorLog,
        appended: mpsc::UnboundedReceiver<usize>,
        threshold: usize,
    ) -> Self {
        Self {
            uploader,
            transport,
            streams,
            status,
            errors,
            appended,
            pending: 0,
            threshold: threshold.max(1),
            swept_once: false,
        }
    }

    /// Records appended since the last fully successful sweep
    pub fn pending(&self) -> usize {
        self.pending
    }
}

#[async_trait]
impl PeriodicTask for SweepTask {
    fn name(&self) -> &'static str {
        "sweep"
    }

    async fn run_cycle(&mut self) -> Result<()> {
        while let Ok(count) = self.appended.try_recv() {
            self.pending += count;
        }

        if self.swept_once && self.pending < self.threshold {
            return Ok(());
        }

        if !ensure_link(self.transport.as_ref(), self.status.as_ref(), &self.errors).await {
            self.status.print(rows::API, "API unreachable");
            return Ok(());
        }

        let mut clean = true;
        let mut delivered = 0;
        for stream in &self.streams {
            match self.uploader.upload_stream(stream).await {
                Ok(report) => delivered += report.records,
                Err(e) => {
                    clean = false;
                    warn!(stream = %stream, "Upload aborted: {}", e);
                }
            }
        }

        self.swept_once = true;
        if clean {
            self.pending = 0;
            self.status.print(rows::API, "API synced");
        } else {
            self.status.print(rows::API, "API failed");
        }
        debug!(delivered, pending = self.pending, "Sweep finished");
        Ok(())
    }
}
