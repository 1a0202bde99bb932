//! Dirty node ranges waiting to be copied to the device
//!
//! Ranges are in node units. They are merged on drain so that a frame's worth
//! of scattered writes becomes as few buffer copies as possible.

use std::ops::Range;

#[derive(Debug, Default)]
pub struct PendingUploads {
    ranges: Vec<Range<u32>>,
}

impl PendingUploads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `count` nodes starting at `start` as dirty
    pub fn push(&mut self, start: u32, count: u32) {
        if count > 0 {
            self.ranges.push(start..start + count);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Take every pending range, sorted and with overlapping or touching
    /// ranges merged
    pub fn drain_coalesced(&mut self) -> Vec<Range<u32>> {
        let mut ranges = std::mem::take(&mut self.ranges);
        ranges.sort_by_key(|r| r.start);

        let mut merged: Vec<Range<u32>> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
                _ => merged.push(range),
            }
        }
        merged
    }
}
