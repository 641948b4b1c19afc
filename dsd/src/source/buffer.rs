//! Sliding windows and block staging shared by the container readers.

use std::collections::VecDeque;

use anyhow::{Result, ensure};

use crate::utils::errors::ConfigError;

/// Default sliding window length per channel, in bytes.
pub const DEFAULT_BUFFER_LENGTH: usize = 5000;

/// One fixed-capacity ring per channel, newest byte at index 0.
#[derive(Debug, Clone)]
pub struct SlidingBuffer {
    rings: Vec<VecDeque<u8>>,
    capacity: usize,
}

impl SlidingBuffer {
    pub fn new(channels: usize, capacity: usize, idle: u8) -> Result<Self> {
        ensure!(capacity > 0, ConfigError::ZeroBufferLength);
        let mut buffer = Self {
            rings: vec![VecDeque::with_capacity(capacity); channels],
            capacity,
        };
        buffer.fill(idle);
        Ok(buffer)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.rings.len()
    }

    /// History of one channel, newest first.
    #[inline]
    pub fn channel(&self, ch: usize) -> &VecDeque<u8> {
        &self.rings[ch]
    }

    #[inline]
    pub fn get(&self, ch: usize, age: usize) -> u8 {
        self.rings[ch][age]
    }

    /// Pushes `byte` as the newest entry of `ch`, evicting the oldest.
    #[inline]
    pub fn push(&mut self, ch: usize, byte: u8) {
        let ring = &mut self.rings[ch];
        if ring.len() == self.capacity {
            ring.pop_back();
        }
        ring.push_front(byte);
    }

    /// Clears every ring and fills it with `idle`.
    pub fn fill(&mut self, idle: u8) {
        for ring in &mut self.rings {
            ring.clear();
            ring.resize(self.capacity, idle);
        }
    }

    pub fn resize(&mut self, capacity: usize, idle: u8) -> Result<()> {
        ensure!(capacity > 0, ConfigError::ZeroBufferLength);
        self.capacity = capacity;
        self.rings
            .iter_mut()
            .for_each(|ring| *ring = VecDeque::with_capacity(capacity));
        self.fill(idle);
        Ok(())
    }
}

/// Byte order of a staged block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLayout {
    /// `bytes_per_channel` bytes of channel 0, then channel 1, ...
    Planar,
    /// One byte per channel in turn.
    Interleaved,
}

/// Outcome of staging the next block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    Ready,
    /// The block could not be produced; it is idle-filled and the stream goes on.
    Damaged,
    /// No further data can be read.
    Ended,
}

/// One block of raw DSD bytes read from the container.
#[derive(Debug, Clone)]
pub struct BlockBuffer {
    data: Vec<u8>,
    channels: usize,
    bytes_per_channel: usize,
    layout: BlockLayout,
    marker: usize,
    valid: bool,
}

impl BlockBuffer {
    pub fn new(channels: usize, bytes_per_channel: usize, layout: BlockLayout) -> Self {
        Self {
            data: vec![0; channels * bytes_per_channel],
            channels,
            bytes_per_channel,
            layout,
            marker: bytes_per_channel,
            valid: false,
        }
    }

    #[inline]
    pub fn bytes_per_channel(&self) -> usize {
        self.bytes_per_channel
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn exhausted(&self) -> bool {
        self.marker >= self.bytes_per_channel
    }

    /// Marks the block as consumed so the next step loads a fresh one.
    pub fn invalidate(&mut self) {
        self.marker = self.bytes_per_channel;
        self.valid = false;
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn fill(&mut self, idle: u8) {
        self.data.fill(idle);
    }

    #[inline]
    fn byte(&self, ch: usize) -> u8 {
        match self.layout {
            BlockLayout::Planar => self.data[ch * self.bytes_per_channel + self.marker],
            BlockLayout::Interleaved => self.data[self.marker * self.channels + ch],
        }
    }
}

/// Position bookkeeping common to every reader.
///
/// `pos` counts bytes per channel and sits at -1 after a rewind so that the
/// first successful step lands on byte 0.
#[derive(Debug, Clone)]
pub struct Playhead {
    pub buffer: SlidingBuffer,
    pub block: BlockBuffer,
    pos: i64,
    ended: bool,
    idle: u8,
}

impl Playhead {
    pub fn new(buffer: SlidingBuffer, block: BlockBuffer, idle: u8) -> Self {
        Self {
            buffer,
            block,
            pos: -1,
            ended: false,
            idle,
        }
    }

    /// Byte index of the newest byte in the window.
    #[inline]
    pub fn byte_position(&self) -> i64 {
        self.pos
    }

    #[inline]
    pub fn ended(&self) -> bool {
        self.ended
    }

    pub fn reset(&mut self) {
        self.pos = -1;
        self.ended = false;
        self.block.invalidate();
        self.buffer.fill(self.idle);
    }

    /// Advances one byte per channel. `load` stages the next block when the
    /// current one is used up. Returns whether real data was pushed.
    pub fn step<F>(&mut self, total_bytes: u64, load: F) -> bool
    where
        F: FnOnce(&mut BlockBuffer) -> BlockStatus,
    {
        let mut ok = !self.ended && self.pos + 1 < total_bytes as i64;

        if ok && self.block.exhausted() {
            self.block.marker = 0;
            match load(&mut self.block) {
                BlockStatus::Ready => self.block.valid = true,
                BlockStatus::Damaged => {
                    self.block.fill(self.idle);
                    self.block.valid = false;
                }
                BlockStatus::Ended => {
                    self.block.fill(self.idle);
                    self.block.valid = false;
                    self.ended = true;
                    ok = false;
                }
            }
        }

        if ok {
            for ch in 0..self.buffer.channel_count() {
                let byte = self.block.byte(ch);
                self.buffer.push(ch, byte);
            }
            self.block.marker += 1;
            ok = self.block.valid;
        } else {
            for ch in 0..self.buffer.channel_count() {
                self.buffer.push(ch, self.idle);
            }
        }

        self.pos += 1;
        ok
    }
}
