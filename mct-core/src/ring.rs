//! The framed byte ring.
//!
//! The ring stores whole messages as framed blocks: a 12-byte block head
//! carrying the pattern `"SHM\0"`, a status byte, and the block length,
//! followed by the block bytes. It backs two different deployments with one
//! implementation: the client library's overflow buffer, which grows in
//! steps up to a maximum, and the daemon's per-client buffer, which has a
//! fixed footprint.
//!
//! Accounting uses a head triple `{write, read, count}` that occupies the
//! first 12 bytes of the configured footprint; the data region is the
//! remainder, so a ring created with a minimum of `n` bytes holds `n - 12`
//! bytes of block data.
//!
//! A block head that fails validation means the ring's content can no
//! longer be trusted. The ring resets itself (all offsets zeroed, data
//! cleared) and reports [`Error::InvalidContent`]; this is the only place
//! in the pipeline where data loss is silent about *which* messages were
//! lost.

use crate::{Error, Result};

/// The pattern opening every block head: `"SHM\0"`.
pub const BLOCK_PATTERN: [u8; 4] = *b"SHM\0";

/// Size in bytes of an encoded block head.
pub const BLOCK_HEAD_SIZE: usize = 12;

/// Size in bytes of the ring's own accounting head.
pub const RING_HEAD_SIZE: usize = 12;

const BLOCK_STATUS: u8 = 2;

/// A byte ring storing framed blocks.
#[derive(Debug)]
pub struct Ring {
    mem: Vec<u8>,
    write: usize,
    read: usize,
    count: usize,
    min_size: usize,
    max_size: usize,
    step_size: usize,
    growable: bool,
}

impl Ring {
    /// Creates a growable ring.
    ///
    /// The ring starts at `min_size` total bytes and grows in `step_size`
    /// increments whenever a push does not fit, up to `max_size`. All three
    /// must be non-zero, `min_size` must not exceed `max_size`, `step_size`
    /// must not exceed `max_size`, and `min_size` must cover at least the
    /// accounting head.
    pub fn dynamic(min_size: u32, max_size: u32, step_size: u32) -> Result<Ring> {
        if min_size == 0 || max_size == 0 || step_size == 0 {
            return Err(Error::WrongParameter);
        }
        if min_size > max_size || step_size > max_size {
            return Err(Error::WrongParameter);
        }
        let min_size = min_size as usize;
        if min_size < RING_HEAD_SIZE + BLOCK_HEAD_SIZE {
            return Err(Error::WrongParameter);
        }
        Ok(Ring {
            mem: vec![0; min_size - RING_HEAD_SIZE],
            write: 0,
            read: 0,
            count: 0,
            min_size,
            max_size: max_size as usize,
            step_size: step_size as usize,
            growable: true,
        })
    }

    /// Creates a fixed-footprint ring of `size` total bytes.
    ///
    /// Used where the backing storage is provisioned by the surrounding
    /// system and must never be reallocated.
    pub fn fixed(size: u32) -> Result<Ring> {
        let size = size as usize;
        if size < RING_HEAD_SIZE + BLOCK_HEAD_SIZE {
            return Err(Error::WrongParameter);
        }
        Ok(Ring {
            mem: vec![0; size - RING_HEAD_SIZE],
            write: 0,
            read: 0,
            count: 0,
            min_size: size,
            max_size: size,
            step_size: 0,
            growable: false,
        })
    }

    /// The number of framed blocks currently stored.
    pub fn message_count(&self) -> usize {
        self.count
    }

    /// The total footprint, accounting head included.
    pub fn total_size(&self) -> usize {
        self.mem.len() + RING_HEAD_SIZE
    }

    /// The number of data bytes currently occupied by blocks.
    pub fn used_size(&self) -> usize {
        if self.write > self.read {
            self.write - self.read
        } else if self.write < self.read {
            self.mem.len() - self.read + self.write
        } else if self.count > 0 {
            self.mem.len()
        } else {
            0
        }
    }

    fn free_size(&self) -> usize {
        if self.read > self.write {
            self.read - self.write
        } else if self.count > 0 && self.write == self.read {
            0
        } else {
            self.mem.len() - self.write + self.read
        }
    }

    /// Returns `true` if a block of `needed` bytes fits below the maximum
    /// footprint without draining. Used to decide between blocking and
    /// attempting the push directly; deliberately conservative near the
    /// maximum.
    pub fn fits_within_max(&self, needed: usize) -> bool {
        self.mem.len() + RING_HEAD_SIZE + needed <= self.max_size
    }

    /// Zeroes all offsets and clears the data region.
    pub fn reset(&mut self) {
        self.write = 0;
        self.read = 0;
        self.count = 0;
        self.mem.fill(0);
    }

    /// Copies `data` into the ring at `at`, splitting at the wrap point.
    fn copy_in(&mut self, at: usize, data: &[u8]) -> usize {
        let size = self.mem.len();
        let first = usize::min(size - at, data.len());
        self.mem[at..at + first].copy_from_slice(&data[..first]);
        self.mem[..data.len() - first].copy_from_slice(&data[first..]);
        (at + data.len()) % size
    }

    /// Copies `out.len()` bytes out of the ring from `at`.
    fn copy_out(&self, at: usize, out: &mut [u8]) -> usize {
        let size = self.mem.len();
        let first = usize::min(size - at, out.len());
        out[..first].copy_from_slice(&self.mem[at..at + first]);
        let rest = out.len() - first;
        out[first..].copy_from_slice(&self.mem[..rest]);
        (at + out.len()) % size
    }

    fn grow(&mut self) -> Result<()> {
        if !self.growable || self.step_size == 0 {
            return Err(Error::BufferFull);
        }
        if self.mem.len() + RING_HEAD_SIZE + self.step_size > self.max_size {
            return Err(Error::BufferFull);
        }
        let used = self.used_size();
        let mut grown = vec![0; self.mem.len() + self.step_size];
        // compact the used span to the front so both offsets restart
        let first = usize::min(self.mem.len() - self.read, used);
        grown[..first].copy_from_slice(&self.mem[self.read..self.read + first]);
        grown[first..used].copy_from_slice(&self.mem[..used - first]);
        self.mem = grown;
        self.read = 0;
        self.write = used;
        Ok(())
    }

    fn shrink(&mut self) {
        if !self.growable || self.total_size() == self.min_size {
            return;
        }
        self.mem = vec![0; self.min_size - RING_HEAD_SIZE];
        self.write = 0;
        self.read = 0;
    }

    /// Appends one framed block containing `data`.
    pub fn push(&mut self, data: &[u8]) -> Result<()> {
        self.push3(data, &[], &[])
    }

    /// Appends one framed block containing the concatenation of three
    /// slices, growing the ring if allowed and necessary.
    ///
    /// The scatter-gather shape matches the send path, which stages a
    /// message as user header, wire header, and payload without first
    /// gluing them together.
    pub fn push3(&mut self, data1: &[u8], data2: &[u8], data3: &[u8]) -> Result<()> {
        let total = data1.len() + data2.len() + data3.len();
        if total > i32::MAX as usize {
            return Err(Error::WrongParameter);
        }
        while self.free_size() < BLOCK_HEAD_SIZE + total {
            self.grow()?;
        }

        let mut head = [0u8; BLOCK_HEAD_SIZE];
        head[..4].copy_from_slice(&BLOCK_PATTERN);
        head[4] = BLOCK_STATUS;
        head[8..].copy_from_slice(&(total as i32).to_ne_bytes());

        let mut write = self.write;
        write = self.copy_in(write, &head);
        for data in [data1, data2, data3] {
            if !data.is_empty() {
                write = self.copy_in(write, data);
            }
        }
        self.write = write;
        self.count += 1;
        Ok(())
    }

    fn front(&mut self, out: Option<&mut [u8]>, delete: bool) -> Result<Option<usize>> {
        if self.count == 0 {
            if self.write != self.read {
                self.reset();
                return Err(Error::InvalidContent);
            }
            return Ok(None);
        }

        let used = self.used_size();
        if used < BLOCK_HEAD_SIZE {
            self.reset();
            return Err(Error::InvalidContent);
        }

        let mut head = [0u8; BLOCK_HEAD_SIZE];
        let after_head = self.copy_out(self.read, &mut head);
        if head[..4] != BLOCK_PATTERN || head[4] != BLOCK_STATUS {
            self.reset();
            return Err(Error::InvalidContent);
        }
        let block_len = i32::from_ne_bytes([head[8], head[9], head[10], head[11]]);
        if block_len < 0 || used < BLOCK_HEAD_SIZE + block_len as usize {
            self.reset();
            return Err(Error::InvalidContent);
        }
        let block_len = block_len as usize;

        let next_read = match out {
            Some(out) => {
                if out.len() < block_len {
                    return Err(Error::WrongParameter);
                }
                self.copy_out(after_head, &mut out[..block_len])
            }
            None => (after_head + block_len) % self.mem.len(),
        };

        if delete {
            self.read = next_read;
            self.count -= 1;
            if self.count == 0 {
                self.shrink();
            }
        }
        Ok(Some(block_len))
    }

    /// Returns the size of the next block without copying or removing
    /// it, or `None` when the ring is empty.
    pub fn peek_size(&mut self) -> Result<Option<usize>> {
        self.front(None, false)
    }

    /// Copies the next block into `out` and removes it from the ring.
    ///
    /// Returns the block size, or `None` when the ring is empty. `out`
    /// smaller than the block is a [`Error::WrongParameter`] and leaves the
    /// ring untouched.
    pub fn pull(&mut self, out: &mut [u8]) -> Result<Option<usize>> {
        self.front(Some(out), true)
    }

    /// Copies the next block into `out` without removing it.
    pub fn copy(&mut self, out: &mut [u8]) -> Result<Option<usize>> {
        self.front(Some(out), false)
    }

    /// Removes the next block without copying it out.
    pub fn remove(&mut self) -> Result<Option<usize>> {
        self.front(None, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(ring: &mut Ring) -> Vec<Vec<u8>> {
        let mut blocks = Vec::new();
        let mut out = vec![0u8; ring.total_size()];
        while let Some(len) = ring.pull(&mut out).unwrap() {
            blocks.push(out[..len].to_vec());
        }
        blocks
    }

    #[test]
    fn rejects_bad_geometry() {
        assert!(Ring::dynamic(0, 100, 10).is_err());
        assert!(Ring::dynamic(200, 100, 10).is_err());
        assert!(Ring::dynamic(100, 200, 300).is_err());
        assert!(Ring::dynamic(8, 100, 10).is_err());
    }

    #[test]
    fn push3_concatenates_segments() {
        let mut ring = Ring::dynamic(256, 256, 256).unwrap();
        ring.push3(b"ab", b"cd", b"ef").unwrap();
        assert_eq!(ring.message_count(), 1);

        let mut out = [0u8; 16];
        let len = ring.copy(&mut out).unwrap().unwrap();
        assert_eq!(&out[..len], b"abcdef");
        // copy does not consume
        assert_eq!(ring.message_count(), 1);
        assert_eq!(ring.remove().unwrap(), Some(6));
        assert_eq!(ring.message_count(), 0);
        assert_eq!(ring.pull(&mut out).unwrap(), None);
    }

    #[test]
    fn count_tracks_blocks() {
        let mut ring = Ring::dynamic(4096, 4096, 4096).unwrap();
        for i in 0..10u8 {
            ring.push(&[i; 100]).unwrap();
            assert_eq!(ring.message_count(), i as usize + 1);
        }
        let blocks = drain(&mut ring);
        assert_eq!(blocks.len(), 10);
        for (i, block) in blocks.iter().enumerate() {
            assert_eq!(block, &vec![i as u8; 100]);
        }
    }

    #[test]
    fn full_ring_reports_buffer_full_until_drained() {
        // data region is 1088 bytes; two framed 512-byte blocks fit, a
        // third does not
        let mut ring = Ring::fixed(1100).unwrap();
        ring.push(&[1; 512]).unwrap();
        ring.push(&[2; 512]).unwrap();
        assert_eq!(ring.push(&[3; 512]), Err(Error::BufferFull));
        assert_eq!(ring.message_count(), 2);

        let mut out = [0u8; 512];
        assert_eq!(ring.pull(&mut out).unwrap(), Some(512));
        ring.push(&[3; 512]).unwrap();

        let blocks = drain(&mut ring);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], vec![2; 512]);
        assert_eq!(blocks[1], vec![3; 512]);
    }

    #[test]
    fn blocks_wrap_across_the_end() {
        let mut ring = Ring::fixed(268).unwrap();
        // 256 data bytes; cycle enough that reads and writes straddle the
        // wrap point repeatedly
        for round in 0..20u8 {
            ring.push(&[round; 60]).unwrap();
            if round >= 2 {
                let mut out = [0u8; 60];
                assert_eq!(ring.pull(&mut out).unwrap(), Some(60));
                assert_eq!(out, [round - 2; 60]);
            }
        }
    }

    #[test]
    fn grows_in_steps_and_shrinks_when_empty() {
        let mut ring = Ring::dynamic(128, 512, 128).unwrap();
        assert_eq!(ring.total_size(), 128);
        // 116 data bytes: the second 60-byte block forces a growth step
        ring.push(&[1; 60]).unwrap();
        ring.push(&[2; 60]).unwrap();
        assert_eq!(ring.total_size(), 256);

        let blocks = drain(&mut ring);
        assert_eq!(blocks[0], vec![1; 60]);
        assert_eq!(blocks[1], vec![2; 60]);
        assert_eq!(ring.total_size(), 128);
    }

    #[test]
    fn growth_preserves_order_across_wrap() {
        let mut ring = Ring::dynamic(128, 1024, 128).unwrap();
        ring.push(&[1; 50]).unwrap();
        let mut out = [0u8; 50];
        ring.pull(&mut out).unwrap();
        // write cursor now sits mid-region; these wrap, then force growth
        ring.push(&[2; 50]).unwrap();
        ring.push(&[3; 50]).unwrap();
        ring.push(&[4; 50]).unwrap();
        let blocks = drain(&mut ring);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], vec![2; 50]);
        assert_eq!(blocks[1], vec![3; 50]);
        assert_eq!(blocks[2], vec![4; 50]);
    }

    #[test]
    fn growth_stops_at_max() {
        let mut ring = Ring::dynamic(128, 256, 128).unwrap();
        ring.push(&[1; 100]).unwrap();
        ring.push(&[2; 100]).unwrap();
        assert_eq!(ring.push(&[3; 100]), Err(Error::BufferFull));
        assert_eq!(ring.message_count(), 2);
    }

    #[test]
    fn fixed_ring_never_grows() {
        let mut ring = Ring::fixed(128).unwrap();
        ring.push(&[1; 50]).unwrap();
        assert_eq!(ring.push(&[2; 100]), Err(Error::BufferFull));
    }

    #[test]
    fn corrupted_head_resets_the_ring() {
        let mut ring = Ring::fixed(256).unwrap();
        ring.push(b"hello").unwrap();
        ring.mem[0] ^= 0xff;
        let mut out = [0u8; 16];
        assert_eq!(ring.pull(&mut out), Err(Error::InvalidContent));
        assert_eq!(ring.message_count(), 0);
        assert_eq!(ring.used_size(), 0);
        // usable again after the reset
        ring.push(b"world").unwrap();
        assert_eq!(ring.pull(&mut out).unwrap(), Some(5));
        assert_eq!(&out[..5], b"world");
    }

    #[test]
    fn undersized_out_buffer_is_rejected_without_advancing() {
        let mut ring = Ring::fixed(256).unwrap();
        ring.push(&[7; 64]).unwrap();
        let mut small = [0u8; 10];
        assert_eq!(ring.pull(&mut small), Err(Error::WrongParameter));
        assert_eq!(ring.message_count(), 1);
        let mut out = [0u8; 64];
        assert_eq!(ring.pull(&mut out).unwrap(), Some(64));
    }

    #[test]
    fn exact_fill_is_accepted() {
        let mut ring = Ring::fixed(RING_HEAD_SIZE as u32 + 100).unwrap();
        ring.push(&[9; 100 - BLOCK_HEAD_SIZE]).unwrap();
        assert_eq!(ring.free_size(), 0);
        assert_eq!(ring.push(&[]), Err(Error::BufferFull));
        let mut out = [0u8; 128];
        assert_eq!(ring.pull(&mut out).unwrap(), Some(100 - BLOCK_HEAD_SIZE));
    }
}
