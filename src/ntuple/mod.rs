//! N-tuple value function: pattern features with shared weight tables.
//!
//! Every feature ("tuple") maps a board (and, for hinted tuples, the next-tile
//! hint) to one or more integer indices into its own dense weight table. The
//! positional shapes are read at all eight symmetric placements of the board,
//! so a single update trains every rotation and reflection of a position at
//! once. An update touches each distinct index exactly once even when several
//! placements alias to the same entry.
//!
//! ```
//! use ai_threes::engine::{self, Board};
//! use ai_threes::ntuple::{NTupleNetwork, NetworkPreset};
//!
//! engine::new();
//! let mut net = NTupleNetwork::from_preset(NetworkPreset::Compact);
//! let board = Board::with_hint(0x0000_0000_0300_0021, 2);
//! assert_eq!(net.value(&board), 0.0);
//! net.update(&board, 0.5);
//! assert!(net.value(&board) > 0.0);
//! ```

mod counting;
mod network;
mod positional;

use std::io::{self, Read, Write};

use crate::engine::Board;

pub use counting::{CountKind, CountTuple};
pub use network::{NTupleNetwork, NetworkPreset, WeightsError};
pub use positional::{PatternTuple, Shape};

/// Value stored in a weight table.
pub type Weight = f32;

/// Number of distinct hint buckets folded into hinted indices.
pub const HINT_BUCKETS: u32 = 4;

const IO_CHUNK: usize = 1 << 16;

/// Bucket for a hint rank: 1, 2 and 3 get their own bucket, every bonus rank shares the last.
#[inline]
pub fn hint_bucket(hint: u8) -> u32 {
    hint.clamp(1, HINT_BUCKETS as u8) as u32 - 1
}

/// The table entries a board activates in one tuple, one per placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indices {
    slots: [u32; 8],
    len: usize,
}

impl Indices {
    /// A single placement.
    pub fn one(index: u32) -> Self {
        Indices { slots: [index; 8], len: 1 }
    }

    /// One placement per symmetric image of `board`.
    pub fn symmetric(board: &Board, index_of: impl Fn(&Board) -> u32) -> Self {
        let mut slots = [0; 8];
        for (slot, image) in slots.iter_mut().zip(board.symmetries()) {
            *slot = index_of(&image);
        }
        Indices { slots, len: 8 }
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.slots[..self.len]
    }

    /// The same indices with repeats removed, first occurrence kept.
    pub fn unique(&self) -> Indices {
        let mut out = Indices { slots: [0; 8], len: 0 };
        for &index in self.as_slice() {
            if !out.as_slice().contains(&index) {
                out.slots[out.len] = index;
                out.len += 1;
            }
        }
        out
    }
}

/// A pattern feature that owns one weight table.
pub trait Tuple: Send + Sync {
    /// Short description, used in logs and load errors.
    fn describe(&self) -> String;

    /// Table entries activated by `board`.
    fn indices(&self, board: &Board) -> Indices;

    fn weights(&self) -> &[Weight];

    fn weights_mut(&mut self) -> &mut [Weight];

    /// Sum of the weights at every placement.
    fn value(&self, board: &Board) -> f32 {
        let weights = self.weights();
        self.indices(board).as_slice().iter().map(|&i| weights[i as usize]).sum()
    }

    /// Add `delta` once to every distinct entry `board` activates.
    fn update(&mut self, board: &Board, delta: f32) {
        let unique = self.indices(board).unique();
        let weights = self.weights_mut();
        for &i in unique.as_slice() {
            weights[i as usize] += delta;
        }
    }

    /// Write the table length followed by every weight, little-endian.
    fn save(&self, out: &mut dyn Write) -> io::Result<()> {
        let weights = self.weights();
        out.write_all(&(weights.len() as u64).to_le_bytes())?;
        let mut buf = Vec::with_capacity(IO_CHUNK * 4);
        for chunk in weights.chunks(IO_CHUNK) {
            buf.clear();
            for w in chunk {
                buf.extend_from_slice(&w.to_le_bytes());
            }
            out.write_all(&buf)?;
        }
        Ok(())
    }

    /// Read a table written by [`Tuple::save`]; the stored length must equal ours.
    fn load(&mut self, input: &mut dyn Read) -> Result<(), WeightsError> {
        let mut len = [0u8; 8];
        input.read_exact(&mut len)?;
        let found = u64::from_le_bytes(len);
        let expected = self.weights().len() as u64;
        if found != expected {
            return Err(WeightsError::SizeMismatch { tuple: self.describe(), expected, found });
        }
        let mut buf = vec![0u8; IO_CHUNK * 4];
        for chunk in self.weights_mut().chunks_mut(IO_CHUNK) {
            let bytes = &mut buf[..chunk.len() * 4];
            input.read_exact(bytes)?;
            for (w, raw) in chunk.iter_mut().zip(bytes.chunks_exact(4)) {
                *w = Weight::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            }
        }
        Ok(())
    }
}

pub(crate) fn zeroed_table(len: usize) -> Box<[Weight]> {
    vec![0.0; len].into_boxed_slice()
}
