use std::fmt;
use std::fs;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;

use log::info;
use serde::{Deserialize, Serialize};

use crate::engine::Board;

use super::{CountKind, CountTuple, PatternTuple, Shape, Tuple};

const MAGIC: &[u8; 4] = b"THN1";

#[derive(thiserror::Error, Debug)]
pub enum WeightsError {
    #[error("io error: {0}")]
    Io(io::Error),
    #[error("not a weight file")]
    Magic,
    #[error("file holds {found} tuples, network has {expected}")]
    TupleCount { expected: u32, found: u32 },
    #[error("tuple {tuple}: file holds {found} weights, network has {expected}")]
    SizeMismatch { tuple: String, expected: u64, found: u64 },
    #[error("file too short")]
    Truncated,
    #[error("checksum mismatch")]
    Checksum,
    #[error("unexpected bytes after the checksum")]
    TrailingBytes,
}

impl From<io::Error> for WeightsError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            WeightsError::Truncated
        } else {
            WeightsError::Io(err)
        }
    }
}

/// Named tuple sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkPreset {
    /// Hinted axe and rectangle tuples on the outer and inner columns plus counts.
    /// Each hinted six-cell table holds 2^26 weights, so a network is about 1 GiB.
    Standard,
    /// Unhinted rectangles and hinted lines plus counts; the late-game tables.
    Coarse,
    /// Hinted lines plus counts. Small enough for tests and quick runs.
    Compact,
}

impl NetworkPreset {
    /// The preset used once a game reaches a later stage.
    pub fn late_game(self) -> NetworkPreset {
        match self {
            NetworkPreset::Standard | NetworkPreset::Coarse => NetworkPreset::Coarse,
            NetworkPreset::Compact => NetworkPreset::Compact,
        }
    }

    fn layout(self) -> Vec<Slot> {
        use Shape::*;
        let mut slots = match self {
            NetworkPreset::Standard => vec![
                Slot::Pattern(Axe, 0, true),
                Slot::Pattern(Axe, 1, true),
                Slot::Pattern(Rectangle, 0, true),
                Slot::Pattern(Rectangle, 1, true),
            ],
            NetworkPreset::Coarse => vec![
                Slot::Pattern(Rectangle, 0, false),
                Slot::Pattern(Rectangle, 1, false),
                Slot::Pattern(Line, 0, true),
                Slot::Pattern(Line, 1, true),
            ],
            NetworkPreset::Compact => vec![Slot::Pattern(Line, 0, true), Slot::Pattern(Line, 1, true)],
        };
        slots.extend([
            Slot::Count(CountKind::Empty, true),
            Slot::Count(CountKind::DistinctRanks, false),
            Slot::Count(CountKind::Mergeable, true),
            Slot::Count(CountKind::LargeTiles, false),
            Slot::Count(CountKind::NeighborRanks, false),
        ]);
        slots
    }

    fn tuples(self) -> Vec<Box<dyn Tuple>> {
        self.layout()
            .into_iter()
            .map(|slot| -> Box<dyn Tuple> {
                match slot {
                    Slot::Pattern(shape, column, hinted) => Box::new(PatternTuple::new(shape, column, hinted)),
                    Slot::Count(kind, hinted) => Box::new(CountTuple::new(kind, hinted)),
                }
            })
            .collect()
    }

    /// Weights one network of this preset allocates, at four bytes each.
    ///
    /// Standard is 268,472,513 weights (about 1 GiB), Coarse about 130 MiB and
    /// Compact about 2 MiB; every stage past the first holds a late-game network.
    pub fn total_weights(self) -> usize {
        self.layout()
            .into_iter()
            .map(|slot| match slot {
                Slot::Pattern(shape, _, hinted) => PatternTuple::table_len(shape, hinted),
                Slot::Count(kind, hinted) => CountTuple::table_len(kind, hinted),
            })
            .sum()
    }
}

/// One tuple of a preset, described without allocating its table.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Pattern(Shape, usize, bool),
    Count(CountKind, bool),
}

impl fmt::Display for NetworkPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NetworkPreset::Standard => "standard",
            NetworkPreset::Coarse => "coarse",
            NetworkPreset::Compact => "compact",
        })
    }
}

impl FromStr for NetworkPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(NetworkPreset::Standard),
            "coarse" => Ok(NetworkPreset::Coarse),
            "compact" => Ok(NetworkPreset::Compact),
            other => Err(format!("unknown network preset: {other}")),
        }
    }
}

/// A value function: the sum of its tuples' values.
#[derive(Default)]
pub struct NTupleNetwork {
    tuples: Vec<Box<dyn Tuple>>,
}

impl NTupleNetwork {
    pub fn new() -> Self { Self::default() }

    pub fn with_tuples(tuples: Vec<Box<dyn Tuple>>) -> Self { NTupleNetwork { tuples } }

    pub fn from_preset(preset: NetworkPreset) -> Self { Self::with_tuples(preset.tuples()) }

    pub fn push(&mut self, tuple: impl Tuple + 'static) { self.tuples.push(Box::new(tuple)); }

    pub fn len(&self) -> usize { self.tuples.len() }

    pub fn is_empty(&self) -> bool { self.tuples.is_empty() }

    /// Total number of weights across all tables.
    pub fn total_weights(&self) -> usize { self.tuples.iter().map(|t| t.weights().len()).sum() }

    pub fn value(&self, board: &Board) -> f32 {
        self.tuples.iter().map(|t| t.value(board)).sum()
    }

    /// Apply the same `delta` to every tuple.
    pub fn update(&mut self, board: &Board, delta: f32) {
        for tuple in &mut self.tuples {
            tuple.update(board, delta);
        }
    }

    pub fn write_to<W: Write>(&self, out: W) -> Result<(), WeightsError> {
        let mut out = ChecksumWriter::new(out);
        out.write_all(MAGIC)?;
        out.write_all(&(self.tuples.len() as u32).to_le_bytes())?;
        for tuple in &self.tuples {
            tuple.save(&mut out)?;
        }
        let (mut inner, crc) = out.finish();
        inner.write_all(&crc.to_le_bytes())?;
        inner.flush()?;
        Ok(())
    }

    /// Replace every table with the one stored in `input`.
    ///
    /// Tables already read stay overwritten when a later check fails; a failed
    /// load leaves the network unusable.
    pub fn read_from<R: Read>(&mut self, input: R) -> Result<(), WeightsError> {
        let mut input = ChecksumReader::new(input);
        let mut magic = [0u8; 4];
        input.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(WeightsError::Magic);
        }
        let mut count = [0u8; 4];
        input.read_exact(&mut count)?;
        let found = u32::from_le_bytes(count);
        let expected = self.tuples.len() as u32;
        if found != expected {
            return Err(WeightsError::TupleCount { expected, found });
        }
        for tuple in &mut self.tuples {
            tuple.load(&mut input)?;
        }
        let (mut inner, crc) = input.finish();
        let mut trailer = [0u8; 4];
        inner.read_exact(&mut trailer)?;
        if u32::from_le_bytes(trailer) != crc {
            return Err(WeightsError::Checksum);
        }
        if inner.read(&mut [0u8; 1])? != 0 {
            return Err(WeightsError::TrailingBytes);
        }
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), WeightsError> {
        let path = path.as_ref();
        self.write_to(BufWriter::new(fs::File::create(path)?))?;
        info!("saved {} tuples ({} weights) to {}", self.len(), self.total_weights(), path.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), WeightsError> {
        let path = path.as_ref();
        self.read_from(BufReader::new(fs::File::open(path)?))?;
        info!("loaded {} tuples from {}", self.len(), path.display());
        Ok(())
    }
}

impl fmt::Debug for NTupleNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tuples.iter().map(|t| t.describe())).finish()
    }
}

/// CRC32C of every byte written through it.
struct ChecksumWriter<W> {
    inner: W,
    crc: u32,
}

impl<W: Write> ChecksumWriter<W> {
    fn new(inner: W) -> Self { ChecksumWriter { inner, crc: 0 } }

    fn finish(self) -> (W, u32) { (self.inner, self.crc) }
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.crc = crc32c::crc32c_append(self.crc, &buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> { self.inner.flush() }
}

/// CRC32C of every byte read through it.
struct ChecksumReader<R> {
    inner: R,
    crc: u32,
}

impl<R: Read> ChecksumReader<R> {
    fn new(inner: R) -> Self { ChecksumReader { inner, crc: 0 } }

    fn finish(self) -> (R, u32) { (self.inner, self.crc) }
}

impl<R: Read> Read for ChecksumReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.crc = crc32c::crc32c_append(self.crc, &buf[..n]);
        Ok(n)
    }
}
