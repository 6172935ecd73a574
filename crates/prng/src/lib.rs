//! Stateless Threefry-2x32 stream keys.
//!
//! A [`StreamKey`] never advances. Independent substreams are derived with
//! [`StreamKey::fold_in`], so a sampling run can hand trial `i` the stream
//! `key.fold_in(i)` without sharing a generator between trials.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use rand::RngCore;

/// Rotation constants for the two alternating groups of four rounds.
const ROTATIONS: [[u32; 4]; 2] = [[13, 15, 26, 6], [17, 29, 16, 24]];

/// Parity constant of the Threefry key schedule.
const KEY_PARITY: u32 = 0x1BD1_1BDA;

/// A Threefry key (two u32 words) identifying a random stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StreamKey {
    /// High key word.
    pub hi: u32,
    /// Low key word.
    pub lo: u32,
}

impl StreamKey {
    /// Create a key from a 64-bit seed.
    pub fn new(seed: u64) -> Self {
        let (hi, lo) = split_u64(seed);
        Self { hi, lo }
    }

    /// Create a key directly from raw words.
    pub fn from_words(hi: u32, lo: u32) -> Self {
        Self { hi, lo }
    }

    /// Deterministically derive a subkey from additional data.
    pub fn fold_in(self, data: u64) -> Self {
        let (d_hi, d_lo) = split_u64(data);
        let (hi, lo) = threefry2x32(self, d_hi, d_lo);
        Self { hi, lo }
    }

    /// Key of the substream reserved for sampling trial `index`.
    pub fn for_trial(self, index: usize) -> Self {
        self.fold_in(index as u64)
    }

    /// Open a counter-mode RNG over this key.
    pub fn to_rng(self) -> StreamRng {
        StreamRng::new(self)
    }
}

impl Default for StreamKey {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Counter-mode RNG producing the stream identified by a [`StreamKey`].
#[derive(Clone, Debug)]
pub struct StreamRng {
    key: StreamKey,
    counter: u64,
    block: [u32; 2],
    pos: usize,
}

impl StreamRng {
    /// Start the stream for `key` at counter zero.
    pub fn new(key: StreamKey) -> Self {
        Self {
            key,
            counter: 0,
            block: [0; 2],
            pos: 2,
        }
    }

    /// Key this stream was opened with.
    pub fn key(&self) -> StreamKey {
        self.key
    }

    fn next_block(&mut self) {
        let (y0, y1) = threefry2x32(
            self.key,
            self.counter as u32,
            self.counter.wrapping_add(1) as u32,
        );
        self.block = [y0, y1];
        self.pos = 0;
        self.counter = self.counter.wrapping_add(2);
    }
}

impl RngCore for StreamRng {
    fn next_u32(&mut self) -> u32 {
        if self.pos >= 2 {
            self.next_block();
        }
        let out = self.block[self.pos];
        self.pos += 1;
        out
    }

    fn next_u64(&mut self) -> u64 {
        let lo = u64::from(self.next_u32());
        let hi = u64::from(self.next_u32());
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

fn split_u64(value: u64) -> (u32, u32) {
    ((value >> 32) as u32, value as u32)
}

/// Threefry-2x32 with 20 rounds, injecting the key schedule every 4 rounds.
fn threefry2x32(key: StreamKey, x0: u32, x1: u32) -> (u32, u32) {
    let schedule = [key.hi, key.lo, key.hi ^ key.lo ^ KEY_PARITY];

    let mut x0 = x0.wrapping_add(schedule[0]);
    let mut x1 = x1.wrapping_add(schedule[1]);

    for injection in 1..=5u32 {
        let rotations = &ROTATIONS[((injection - 1) % 2) as usize];
        for &rot in rotations {
            x0 = x0.wrapping_add(x1);
            x1 = x1.rotate_left(rot) ^ x0;
        }
        let s = injection as usize;
        x0 = x0.wrapping_add(schedule[s % 3]);
        x1 = x1.wrapping_add(schedule[(s + 1) % 3]).wrapping_add(injection);
    }

    (x0, x1)
}

/// Common imports for stream keys.
pub mod prelude {
    pub use crate::{StreamKey, StreamRng};
}
