//! Packed Threes board, line tables and the slide/place engine.
//!
//! A board is 16 four-bit ranks in one `u64`, row-major with cell 0 in the low
//! nibble. Rank 0 is empty, ranks 1 and 2 are the small tiles and rank `r >= 3`
//! displays as `3 * 2^(r-3)`. Every slide is four table lookups XORed into the
//! board, so the tables must exist before the first move; [`new`] builds them
//! and every accessor that needs them will build them on first use as well.

mod heuristic;
mod tables;

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use tables::Stores;

/// Score and reward unit.
pub type Reward = f32;

type BoardRaw = u64;

const ROW_MASK: BoardRaw = 0xFFFF;

/// Highest rank a cell can hold.
pub const MAX_RANK: u8 = 15;

/// A slide direction. Discriminants match the wire code of a slide action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Move {
    Up = 0,
    Right = 1,
    Down = 2,
    Left = 3,
}

impl Move {
    pub const ALL: [Move; 4] = [Move::Up, Move::Right, Move::Down, Move::Left];

    #[inline]
    pub fn index(self) -> usize { self as usize }

    /// Decode a direction from the low two bits of `code`.
    #[inline]
    pub fn from_code(code: u8) -> Move { Move::ALL[(code & 0b11) as usize] }

    /// Cells through which the environment feeds a new tile after this slide:
    /// the edge opposite the direction of travel.
    pub fn entry_edge(self) -> [usize; 4] {
        match self {
            Move::Up => [12, 13, 14, 15],
            Move::Right => [0, 4, 8, 12],
            Move::Down => [0, 1, 2, 3],
            Move::Left => [3, 7, 11, 15],
        }
    }

    pub fn as_char(self) -> char { ['U', 'R', 'D', 'L'][self.index()] }
}

/// Packed 4x4 Threes board plus the hint for the next tile.
///
/// Equality, ordering and hashing look only at the packed cells: sliding never
/// touches the hint, so "shifted board == board" is exactly the no-op test.
#[derive(Clone, Copy, Default)]
pub struct Board {
    raw: BoardRaw,
    hint: u8,
}

impl Board {
    /// A constant empty board with no hint.
    pub const EMPTY: Board = Board { raw: 0, hint: 0 };

    #[inline]
    pub fn from_raw(raw: BoardRaw) -> Self { Board { raw, hint: 0 } }

    #[inline]
    pub fn with_hint(raw: BoardRaw, hint: u8) -> Self { Board { raw, hint } }

    #[inline]
    pub fn raw(&self) -> BoardRaw { self.raw }

    /// Rank of the tile the environment will place next.
    #[inline]
    pub fn hint(&self) -> u8 { self.hint }

    #[inline]
    pub fn set_hint(&mut self, hint: u8) { self.hint = hint; }

    /// Rank at 1-D index `idx` (row `idx / 4`, column `idx % 4`).
    #[inline]
    pub fn get(&self, idx: usize) -> u8 {
        debug_assert!(idx < 16);
        ((self.raw >> (idx * 4)) & 0xf) as u8
    }

    /// Overwrite the rank at `idx`. Ranks are masked to four bits.
    #[inline]
    pub fn set(&mut self, idx: usize, rank: u8) {
        debug_assert!(idx < 16);
        let shift = idx * 4;
        self.raw = (self.raw & !(0xf << shift)) | (((rank & 0xf) as BoardRaw) << shift);
    }

    /// Row `r` as a 16-bit line, cell `(r, 0)` in the low nibble.
    #[inline]
    pub fn row(&self, r: usize) -> u16 { ((self.raw >> (16 * r)) & ROW_MASK) as u16 }

    /// Column `c` as a 16-bit line, cell `(0, c)` in the low nibble.
    #[inline]
    pub fn column(&self, c: usize) -> u16 { ((transpose(self.raw) >> (16 * c)) & ROW_MASK) as u16 }

    /// Highest rank on the board.
    pub fn max_rank(&self) -> u8 {
        let s = stores();
        (0..4).fold(0, |acc, r| acc.max(line_entry(&s.row_max, self.row(r))))
    }

    /// Number of empty cells.
    pub fn count_empty(&self) -> u32 {
        let mut x = self.raw;
        x |= x >> 2;
        x |= x >> 1;
        16 - (x & 0x1111_1111_1111_1111).count_ones()
    }

    /// Total board score: `3^(rank-2)` summed over every cell of rank 3 or more.
    pub fn score(&self) -> Reward {
        let s = stores();
        (0..4).fold(0.0, |acc, r| acc + line_entry(&s.score, self.row(r)))
    }

    /// Tabulated hand-written heuristic over all rows and columns.
    pub fn heuristic_score(&self) -> f32 {
        let s = stores();
        let t = Board::from_raw(transpose(self.raw));
        (0..4).fold(0.0, |acc, i| acc + line_entry(&s.heuristic, self.row(i)) + line_entry(&s.heuristic, t.row(i)))
    }

    /// Return the board after sliding in `dir`, leaving `self` untouched.
    ///
    /// ```
    /// use ai_threes::engine::{self, Board, Move};
    /// engine::new();
    /// let b = Board::from_raw(0x0021); // [1, 2, 0, 0] on the first row
    /// assert_eq!(b.shift(Move::Left).raw(), 0x0003);
    /// ```
    #[inline]
    pub fn shift(self, dir: Move) -> Self {
        let mut moved = self;
        moved.slide(dir);
        moved
    }

    /// Slide in `dir` and return the score of every cell a merge produced.
    ///
    /// A slide that changes nothing leaves the board as it was and returns 0;
    /// callers detect that by comparing with the board before the slide.
    pub fn slide(&mut self, dir: Move) -> Reward {
        let s = stores();
        let (raw, reward) = match dir {
            Move::Left => slide_rows(self.raw, &s.row_left, &s.merge_left),
            Move::Right => slide_rows(self.raw, &s.row_right, &s.merge_right),
            Move::Up => slide_cols(self.raw, &s.col_up, &s.merge_left),
            Move::Down => slide_cols(self.raw, &s.col_down, &s.merge_right),
        };
        self.raw = raw;
        reward
    }

    /// Place a tile of `rank` on the empty cell `position`.
    ///
    /// Returns the board score after the write, or `None` when the position is
    /// off the board, the cell is occupied or the rank is out of range.
    pub fn place(&mut self, position: usize, rank: u8) -> Option<Reward> {
        if position >= 16 || rank == 0 || rank > MAX_RANK || self.get(position) != 0 {
            return None;
        }
        self.set(position, rank);
        Some(self.score())
    }

    /// True if no direction changes the board.
    pub fn is_terminal(&self) -> bool {
        Move::ALL.iter().all(|&dir| self.shift(dir) == *self)
    }

    /// Directions that change the board, paired with the resulting board and merge reward.
    pub fn legal_moves(&self) -> impl Iterator<Item = (Move, Board, Reward)> + '_ {
        Move::ALL.into_iter().filter_map(move |dir| {
            let mut after = *self;
            let reward = after.slide(dir);
            (after != *self).then_some((dir, after, reward))
        })
    }

    /// Mirror across the main diagonal.
    #[inline]
    pub fn transpose(self) -> Self { Board { raw: transpose(self.raw), hint: self.hint } }

    /// Rotate 90 degrees clockwise.
    #[inline]
    pub fn rotate_right(self) -> Self { self.transpose().reflect_horizontal() }

    /// Swap the left and right halves.
    #[inline]
    pub fn reflect_horizontal(self) -> Self {
        let x = self.raw;
        let raw = ((x & 0x000F_000F_000F_000F) << 12)
            | ((x & 0x00F0_00F0_00F0_00F0) << 4)
            | ((x & 0x0F00_0F00_0F00_0F00) >> 4)
            | ((x & 0xF000_F000_F000_F000) >> 12);
        Board { raw, hint: self.hint }
    }

    /// Swap the top and bottom halves.
    #[inline]
    pub fn reflect_vertical(self) -> Self {
        let x = self.raw;
        let raw = (x << 48) | ((x & 0xFFFF_0000) << 16) | ((x >> 16) & 0xFFFF_0000) | (x >> 48);
        Board { raw, hint: self.hint }
    }

    /// The eight images of this board under rotation and vertical reflection:
    /// four rotations of the board followed by four rotations of its mirror.
    pub fn symmetries(self) -> [Board; 8] {
        let mut out = [self; 8];
        let mut b = self;
        for slot in out.iter_mut().take(4) {
            *slot = b;
            b = b.rotate_right();
        }
        let mut b = self.reflect_vertical();
        for slot in out.iter_mut().skip(4) {
            *slot = b;
            b = b.rotate_right();
        }
        out
    }
}

impl PartialEq for Board {
    fn eq(&self, other: &Self) -> bool { self.raw == other.raw }
}

impl Eq for Board {}

impl PartialOrd for Board {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for Board {
    fn cmp(&self, other: &Self) -> Ordering { self.raw.cmp(&other.raw) }
}

impl Hash for Board {
    fn hash<H: Hasher>(&self, state: &mut H) { self.raw.hash(state); }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Board({:#018x}, hint={})", self.raw, self.hint)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "+------------------------+")?;
        for r in 0..4 {
            write!(f, "|")?;
            for c in 0..4 {
                match self.get(r * 4 + c) {
                    0 => write!(f, "{:>6}", "")?,
                    rank => write!(f, "{:>6}", tile_value(rank))?,
                }
            }
            writeln!(f, "|")?;
        }
        writeln!(f, "+------------------------+")?;
        write!(f, "next: {}", tile_value(self.hint))
    }
}

impl From<BoardRaw> for Board { fn from(v: BoardRaw) -> Self { Board::from_raw(v) } }
impl From<Board> for BoardRaw { fn from(b: Board) -> Self { b.raw } }

/// Displayed face value for a rank: 1 and 2 as-is, `3 * 2^(rank-3)` above.
pub fn tile_value(rank: u8) -> u32 {
    if rank < 3 { rank as u32 } else { 3 << (rank - 3) }
}

/// Score contributed by one cell of `rank`.
pub fn rank_score(rank: u8) -> Reward { tables::rank_score(rank) }

/// Build the line tables. Safe to call multiple times; only the first call does work.
pub fn new() {
    let _ = stores();
}

static STORES: OnceLock<Stores> = OnceLock::new();

#[inline(always)]
fn stores() -> &'static Stores {
    STORES.get_or_init(tables::create_stores)
}

#[inline(always)]
fn line_entry<T: Copy>(table: &[T], line: u16) -> T {
    debug_assert_eq!(table.len(), tables::LINE_TABLE_SIZE);
    // Every table holds one entry per possible 16-bit line.
    unsafe { *table.get_unchecked(line as usize) }
}

fn slide_rows(raw: BoardRaw, table: &[u16], merge: &[Reward]) -> (BoardRaw, Reward) {
    (0..4).fold((raw, 0.0), |(board, reward), r| {
        let line = ((raw >> (16 * r)) & ROW_MASK) as u16;
        (board ^ ((line_entry(table, line) as BoardRaw) << (16 * r)), reward + line_entry(merge, line))
    })
}

fn slide_cols(raw: BoardRaw, table: &[u64], merge: &[Reward]) -> (BoardRaw, Reward) {
    let t = transpose(raw);
    (0..4).fold((raw, 0.0), |(board, reward), c| {
        let line = ((t >> (16 * c)) & ROW_MASK) as u16;
        (board ^ (line_entry(table, line) << (4 * c)), reward + line_entry(merge, line))
    })
}

// Credit to Nneonneo
pub(crate) fn transpose(x: BoardRaw) -> BoardRaw {
    let a1 = x & 0xF0F00F0FF0F00F0F;
    let a2 = x & 0x0000F0F00000F0F0;
    let a3 = x & 0x0F0F00000F0F0000;
    let a = a1 | (a2 << 12) | (a3 >> 12);
    let b1 = a & 0xFF00FF0000FF00FF;
    let b2 = a & 0x00FF00FF00000000;
    let b3 = a & 0x00000000FF00FF00;
    b1 | (b2 >> 24) | (b3 << 24)
}
