//! Global timestamp ordering of tokenized packets.
//!
//! Importers push packets here during tokenization; once the whole trace has
//! been read the sorter hands them back in timestamp order for parsing. Packets
//! with equal timestamps come back in the order they were pushed.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Identifies the packet sequence (and which incremental-state generation of it)
/// a packet came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SequenceHandle {
    pub sequence_id: u32,
    pub generation: u32,
}

/// A packet waiting in, or delivered by, the sorter.
#[derive(Debug, Clone)]
pub struct TimestampedPacket {
    pub ts: i64,
    pub sequence: SequenceHandle,
    pub blob: Vec<u8>,
    order: u64,
}

impl PartialEq for TimestampedPacket {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimestampedPacket {}

impl PartialOrd for TimestampedPacket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimestampedPacket {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ts
            .cmp(&other.ts)
            .then_with(|| self.order.cmp(&other.order))
    }
}

#[derive(Debug, Default)]
pub struct TraceSorter {
    queue: BinaryHeap<Reverse<TimestampedPacket>>,
    next_order: u64,
}

impl TraceSorter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_trace_packet(&mut self, ts: i64, sequence: SequenceHandle, blob: Vec<u8>) {
        let order = self.next_order;
        self.next_order += 1;
        self.queue.push(Reverse(TimestampedPacket {
            ts,
            sequence,
            blob,
            order,
        }));
    }

    /// Pop the packet with the lowest timestamp.
    pub fn extract_next(&mut self) -> Option<TimestampedPacket> {
        self.queue.pop().map(|Reverse(packet)| packet)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_by_timestamp_then_push_order() {
        let mut sorter = TraceSorter::new();
        let seq = SequenceHandle::default();
        sorter.push_trace_packet(30, seq, vec![1]);
        sorter.push_trace_packet(10, seq, vec![2]);
        sorter.push_trace_packet(30, seq, vec![3]);
        sorter.push_trace_packet(20, seq, vec![4]);
        assert_eq!(sorter.len(), 4);

        let order: Vec<u8> = std::iter::from_fn(|| sorter.extract_next())
            .map(|p| p.blob[0])
            .collect();
        assert_eq!(order, vec![2, 4, 1, 3]);
        assert!(sorter.is_empty());
    }
}
