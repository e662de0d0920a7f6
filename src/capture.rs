//! Bounded producer/writer capture pipeline (spec.md §4.2).
//!
//! The callback side (`enqueue`) never blocks and never allocates beyond a
//! fixed-size copy; the writer side (`drain_into`) is driven by whatever task
//! the firmware gives a 500 ms timer to, exactly as `callbacks.c`'s PCAP
//! writer task does with its `xQueueReceive` timeout. Keeping both halves as
//! plain functions over a `heapless::spsc::Queue` (rather than owning a task)
//! keeps this host-testable without an executor.

use heapless::spsc::Queue;
use heapless::Vec as HVec;

use crate::error::{AirhoundError, Result};
use crate::pcap::{self, PcapSink};

/// Maximum frame size a single capture item can hold (spec.md §3,
/// `PromiscuousFrame.raw`).
pub const MAX_FRAME_LEN: usize = 2346;

/// Queue depth named by spec.md §4.2 ("queue depth = 64").
pub const QUEUE_DEPTH: usize = 64;

/// Number of records between forced flushes (spec.md §4.2).
pub const FLUSH_EVERY: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureType {
    Wifi,
    Bluetooth,
    Ieee802_15_4,
}

/// WiFi promiscuous-mode packet classification, as the driver reports it
/// ahead of the actual frame parse (spec.md §4.2 step 1). Non-WiFi capture
/// paths (BLE, 802.15.4) have no equivalent classification and pass `Data`,
/// since the `Misc` drop rule below is WiFi-specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiPktType {
    Mgmt,
    Ctrl,
    Data,
    Misc,
}

impl CaptureType {
    pub fn linktype(self) -> u32 {
        match self {
            Self::Wifi => pcap::LINKTYPE_IEEE802_11,
            Self::Bluetooth => pcap::LINKTYPE_BLUETOOTH_HCI_H4,
            Self::Ieee802_15_4 => pcap::LINKTYPE_IEEE802_15_4_NOFCS,
        }
    }
}

pub struct CaptureItem {
    pub buffer: HVec<u8, MAX_FRAME_LEN>,
    pub capture_type: CaptureType,
    pub timestamp_us: u64,
}

impl CaptureItem {
    pub fn new(bytes: &[u8], capture_type: CaptureType, timestamp_us: u64) -> Option<Self> {
        let mut buffer = HVec::new();
        buffer.extend_from_slice(bytes).ok()?;
        Some(Self { buffer, capture_type, timestamp_us })
    }

    pub fn length(&self) -> u16 {
        self.buffer.len() as u16
    }
}

/// heapless spsc queues have `N - 1` usable slots; `N` is sized one above
/// `QUEUE_DEPTH` so the queue actually holds 64 items, matching spec.md's
/// "queue depth = 64" literally rather than one short of it.
pub type RawQueue = Queue<CaptureItem, { QUEUE_DEPTH + 1 }>;

/// Early-filtering + enqueue counters, per spec.md §4.2. Plain (not atomic):
/// spec explicitly calls these "race-tolerant; exact accuracy not required".
#[derive(Debug, Default, Clone, Copy)]
pub struct CaptureStats {
    pub total_received: u32,
    pub packets_filtered_out: u32,
    pub packets_processed: u32,
    pub dropped: u32,
}

/// The producer side of the pipeline: owns the SPSC queue producer handle
/// and the early-filter counters. Lives in callback context.
pub struct CaptureProducer<'q> {
    producer: heapless::spsc::Producer<'q, CaptureItem>,
    pub stats: CaptureStats,
}

impl<'q> CaptureProducer<'q> {
    pub fn new(producer: heapless::spsc::Producer<'q, CaptureItem>) -> Self {
        Self { producer, stats: CaptureStats::default() }
    }

    /// Early filter per spec.md §4.2 step 1: drop `Misc`-typed WiFi packets,
    /// frames shorter than 24 bytes, or frames weaker than -90 dBm. Returns
    /// `true` if the frame survives.
    pub fn early_filter(&mut self, frame_type: WifiPktType, length: usize, rssi: i8) -> bool {
        self.stats.total_received += 1;
        if frame_type == WifiPktType::Misc || length < 24 || rssi < -90 {
            self.stats.packets_filtered_out += 1;
            return false;
        }
        self.stats.packets_processed += 1;
        true
    }

    /// Copies `bytes` into an owned buffer and posts it. On a full queue the
    /// copy is dropped and the drop counter incremented — no stall, per
    /// spec.md §4.2 step 3.
    pub fn enqueue(&mut self, bytes: &[u8], capture_type: CaptureType, timestamp_us: u64) -> Result<()> {
        let item = CaptureItem::new(bytes, capture_type, timestamp_us).ok_or(AirhoundError::ParseTruncated)?;
        match self.producer.enqueue(item) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.stats.dropped += 1;
                Err(AirhoundError::QueueFull)
            }
        }
    }
}

/// The writer side: drains whatever is currently available and writes PCAP
/// records through `sink`. The caller supplies the per-link-type global
/// header exactly once, before the first call, via `write_global_header`.
/// Returns the number of records written, for the `FLUSH_EVERY` cadence.
pub struct CaptureWriter<'q> {
    consumer: heapless::spsc::Consumer<'q, CaptureItem>,
    records_since_flush: u32,
}

impl<'q> CaptureWriter<'q> {
    pub fn new(consumer: heapless::spsc::Consumer<'q, CaptureItem>) -> Self {
        Self { consumer, records_since_flush: 0 }
    }

    pub fn write_global_header(&self, sink: &mut dyn PcapSink, capture_type: CaptureType) {
        sink.write(&pcap::global_header(capture_type.linktype()));
    }

    /// Drains every item currently queued, writing a PCAP record for each.
    /// Flushes every `FLUSH_EVERY` records and once more at the end, per
    /// spec.md §4.2 ("every 32 records ... every timeout cycle it flushes").
    pub fn drain_into(&mut self, sink: &mut dyn PcapSink) -> u32 {
        let mut written = 0;
        while let Some(item) = self.consumer.dequeue() {
            let (ts_sec, ts_usec) = pcap::split_timestamp_us(item.timestamp_us);
            let len = item.length() as u32;
            sink.write(&pcap::record_header(ts_sec, ts_usec, len, len));
            sink.write(&item.buffer);
            written += 1;
            self.records_since_flush += 1;
            if self.records_since_flush >= FLUSH_EVERY {
                sink.flush();
                self.records_since_flush = 0;
            }
        }
        if written > 0 {
            sink.flush();
            self.records_since_flush = 0;
        }
        written
    }

    /// Drains remaining items without writing them, for the `stop` path
    /// (spec.md §4.2 Cancellation: "drain queue and free remaining
    /// buffers").
    pub fn drain_and_discard(&mut self) -> u32 {
        let mut n = 0;
        while self.consumer.dequeue().is_some() {
            n += 1;
        }
        n
    }
}

/// Session summary per spec.md §4.2 Cancellation step (d).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSummary {
    pub captured: u32,
    pub filtered: u32,
}

impl CaptureSummary {
    pub fn total(&self) -> u32 {
        self.captured + self.filtered
    }
}

impl From<CaptureStats> for CaptureSummary {
    fn from(stats: CaptureStats) -> Self {
        Self { captured: stats.packets_processed, filtered: stats.packets_filtered_out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec as StdVec;

    struct MemSink {
        bytes: StdVec<u8>,
        flushes: u32,
    }

    impl PcapSink for MemSink {
        fn write(&mut self, bytes: &[u8]) {
            self.bytes.extend_from_slice(bytes);
        }
        fn flush(&mut self) {
            self.flushes += 1;
        }
    }

    #[test]
    fn early_filter_drops_short_and_weak_frames() {
        let mut q: RawQueue = Queue::new();
        let (p, _c) = q.split();
        let mut prod = CaptureProducer::new(p);
        assert!(!prod.early_filter(WifiPktType::Data, 10, -50));
        assert!(!prod.early_filter(WifiPktType::Data, 100, -95));
        assert!(prod.early_filter(WifiPktType::Data, 100, -50));
        assert_eq!(prod.stats.total_received, 3);
        assert_eq!(prod.stats.packets_filtered_out, 2);
        assert_eq!(prod.stats.packets_processed, 1);
    }

    #[test]
    fn early_filter_drops_misc_frame_type_regardless_of_length_and_rssi() {
        let mut q: RawQueue = Queue::new();
        let (p, _c) = q.split();
        let mut prod = CaptureProducer::new(p);
        assert!(!prod.early_filter(WifiPktType::Misc, 100, -50));
        assert_eq!(prod.stats.packets_filtered_out, 1);
        assert_eq!(prod.stats.packets_processed, 0);
    }

    #[test]
    fn enqueue_drops_on_full_without_blocking() {
        let mut q: RawQueue = Queue::new();
        let (p, c) = q.split();
        let mut prod = CaptureProducer::new(p);
        for i in 0..QUEUE_DEPTH {
            assert!(prod.enqueue(&[i as u8; 30], CaptureType::Wifi, 0).is_ok());
        }
        let err = prod.enqueue(&[0; 30], CaptureType::Wifi, 0);
        assert_eq!(err, Err(AirhoundError::QueueFull));
        assert_eq!(prod.stats.dropped, 1);
        drop(c);
    }

    #[test]
    fn writer_drains_in_order_and_flushes_every_32() {
        let mut q: RawQueue = Queue::new();
        let (p, c) = q.split();
        let mut prod = CaptureProducer::new(p);
        let mut writer = CaptureWriter::new(c);
        for i in 0..40u8 {
            prod.enqueue(&[i], CaptureType::Wifi, i as u64).unwrap();
        }
        let mut sink = MemSink { bytes: StdVec::new(), flushes: 0 };
        let written = writer.drain_into(&mut sink);
        assert_eq!(written, 40);
        // One flush at 32, one final flush for the remaining 8.
        assert_eq!(sink.flushes, 2);
        // First record's payload byte should be 0 (enqueue order preserved).
        assert_eq!(sink.bytes[16], 0);
    }

    #[test]
    fn drain_and_discard_counts_without_writing() {
        let mut q: RawQueue = Queue::new();
        let (p, c) = q.split();
        let mut prod = CaptureProducer::new(p);
        let mut writer = CaptureWriter::new(c);
        prod.enqueue(&[1, 2, 3], CaptureType::Bluetooth, 0).unwrap();
        prod.enqueue(&[4, 5, 6], CaptureType::Bluetooth, 0).unwrap();
        assert_eq!(writer.drain_and_discard(), 2);
    }

    #[test]
    fn summary_from_stats() {
        let stats = CaptureStats { total_received: 10, packets_filtered_out: 3, packets_processed: 7, dropped: 1 };
        let summary: CaptureSummary = stats.into();
        assert_eq!(summary.captured, 7);
        assert_eq!(summary.filtered, 3);
        assert_eq!(summary.total(), 10);
    }
}
