use super::heuristic;
use super::Reward;

pub(crate) const LINE_TABLE_SIZE: usize = 0x1_0000; // 65,536 possible 16-bit lines

const COL_MASK: u64 = 0x000F_000F_000F_000F;

/// Lookup tables indexed by a 16-bit line (4 nibble ranks, cell 0 in the low nibble).
///
/// Slide tables store the XOR difference between a line and its slid result so a
/// whole board moves with four lookups and four XORs.
pub(crate) struct Stores {
    pub(crate) row_left: Box<[u16]>,
    pub(crate) row_right: Box<[u16]>,
    pub(crate) col_up: Box<[u64]>,
    pub(crate) col_down: Box<[u64]>,
    pub(crate) merge_left: Box<[Reward]>,
    pub(crate) merge_right: Box<[Reward]>,
    pub(crate) score: Box<[Reward]>,
    pub(crate) heuristic: Box<[f32]>,
    pub(crate) row_max: Box<[u8]>,
}

pub(crate) fn create_stores() -> Stores {
    // Allocate on the heap to avoid large stack frames
    let mut row_left = vec![0u16; LINE_TABLE_SIZE];
    let mut row_right = vec![0u16; LINE_TABLE_SIZE];
    let mut col_up = vec![0u64; LINE_TABLE_SIZE];
    let mut col_down = vec![0u64; LINE_TABLE_SIZE];
    let mut merge_left = vec![0.0; LINE_TABLE_SIZE];
    let mut merge_right = vec![0.0; LINE_TABLE_SIZE];
    let mut score = vec![0.0; LINE_TABLE_SIZE];
    let mut heuristic = vec![0.0f32; LINE_TABLE_SIZE];
    let mut row_max = vec![0u8; LINE_TABLE_SIZE];

    for val in 0..LINE_TABLE_SIZE {
        let line = val as u16;
        let ranks = line_to_ranks(line);

        score[val] = ranks.iter().map(|&rank| rank_score(rank)).sum();
        row_max[val] = ranks.iter().copied().fold(0, u8::max);
        heuristic[val] = heuristic::line_score(&ranks);

        let Some((slid, reward)) = slide_line_left(ranks) else { continue };
        let result = ranks_to_line(slid);
        let rev_line = reverse_line(line);
        let rev_result = reverse_line(result);

        row_left[line as usize] = line ^ result;
        row_right[rev_line as usize] = rev_line ^ rev_result;
        col_up[line as usize] = unpack_col(line) ^ unpack_col(result);
        col_down[rev_line as usize] = unpack_col(rev_line) ^ unpack_col(rev_result);
        merge_left[line as usize] = reward;
        merge_right[rev_line as usize] = reward;
    }

    Stores {
        row_left: row_left.into_boxed_slice(),
        row_right: row_right.into_boxed_slice(),
        col_up: col_up.into_boxed_slice(),
        col_down: col_down.into_boxed_slice(),
        merge_left: merge_left.into_boxed_slice(),
        merge_right: merge_right.into_boxed_slice(),
        score: score.into_boxed_slice(),
        heuristic: heuristic.into_boxed_slice(),
        row_max: row_max.into_boxed_slice(),
    }
}

/// Score of a single cell: `3^(rank-2)` for ranks 3 and above, nothing for 0, 1 and 2.
pub(crate) fn rank_score(rank: u8) -> Reward {
    if rank >= 3 { (3.0 as Reward).powi(rank as i32 - 2) } else { 0.0 }
}

pub(crate) fn line_to_ranks(line: u16) -> [u8; 4] {
    [
        (line & 0xf) as u8,
        ((line >> 4) & 0xf) as u8,
        ((line >> 8) & 0xf) as u8,
        ((line >> 12) & 0xf) as u8,
    ]
}

pub(crate) fn ranks_to_line(ranks: [u8; 4]) -> u16 {
    ranks[0] as u16 | (ranks[1] as u16) << 4 | (ranks[2] as u16) << 8 | (ranks[3] as u16) << 12
}

pub(crate) fn reverse_line(line: u16) -> u16 {
    (line >> 12) | ((line >> 4) & 0x00F0) | ((line << 4) & 0x0F00) | (line << 12)
}

/// Spread the four nibbles of a line down column 0 of a board.
fn unpack_col(line: u16) -> u64 {
    let tmp = line as u64;
    (tmp | (tmp << 12) | (tmp << 24) | (tmp << 36)) & COL_MASK
}

/// Slide one line towards cell 0.
///
/// Only the first position where a rule applies acts: an empty cell pulls the
/// remainder of the line one step, `1+2` becomes 3, equal ranks of 3 or more
/// become one rank higher (15 stays 15). Returns the new ranks and the score of
/// the merged cell, or `None` if no rule applies anywhere.
pub(crate) fn slide_line_left(ranks: [u8; 4]) -> Option<([u8; 4], Reward)> {
    let mut line = ranks;
    let mut reward = 0.0;
    let mut hit = None;
    for i in 0..3 {
        let (a, b) = (line[i], line[i + 1]);
        if a == 0 {
            line[i] = b;
        } else if (a == 1 && b == 2) || (a == 2 && b == 1) {
            line[i] = 3;
            reward = rank_score(3);
        } else if a == b && a >= 3 {
            if a != 15 {
                line[i] = a + 1;
            }
            reward = rank_score(line[i]);
        } else {
            continue;
        }
        hit = Some(i);
        break;
    }
    let i = hit?;
    for j in i + 1..3 {
        line[j] = line[j + 1];
    }
    line[3] = 0;
    Some((line, reward))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_slide_line_left() {
        assert_eq!(slide_line_left([1, 2, 0, 0]), Some(([3, 0, 0, 0], 3.0)));
        assert_eq!(slide_line_left([3, 3, 5, 0]), Some(([4, 5, 0, 0], 9.0)));
        assert_eq!(slide_line_left([0, 0, 0, 5]), Some(([0, 0, 5, 0], 0.0)));
        assert_eq!(slide_line_left([2, 2, 1, 0]), Some(([2, 3, 0, 0], 3.0)));
        assert_eq!(slide_line_left([1, 1, 2, 2]), Some(([1, 3, 2, 0], 3.0)));
        assert_eq!(slide_line_left([15, 15, 0, 0]), Some(([15, 0, 0, 0], rank_score(15))));
        assert_eq!(slide_line_left([5, 0, 0, 0]), Some(([5, 0, 0, 0], 0.0)));
        assert_eq!(slide_line_left([1, 1, 1, 1]), None);
        assert_eq!(slide_line_left([3, 4, 3, 4]), None);
    }

    #[test]
    fn it_reverse_line() {
        assert_eq!(reverse_line(0x1234), 0x4321);
        assert_eq!(reverse_line(reverse_line(0xabcd)), 0xabcd);
    }

    #[test]
    fn it_rank_score() {
        assert_eq!(rank_score(0), 0.0);
        assert_eq!(rank_score(2), 0.0);
        assert_eq!(rank_score(3), 3.0);
        assert_eq!(rank_score(4), 9.0);
        assert_eq!(rank_score(6), 81.0);
    }

    #[test]
    fn tables_are_total_and_consistent() {
        let s = create_stores();
        for tbl_len in [
            s.row_left.len(),
            s.row_right.len(),
            s.col_up.len(),
            s.col_down.len(),
            s.merge_left.len(),
            s.merge_right.len(),
            s.score.len(),
            s.heuristic.len(),
            s.row_max.len(),
        ] {
            assert_eq!(tbl_len, LINE_TABLE_SIZE);
        }
        for val in 0..LINE_TABLE_SIZE {
            let line = val as u16;
            let expected = slide_line_left(line_to_ranks(line))
                .map(|(r, _)| ranks_to_line(r))
                .unwrap_or(line);
            assert_eq!(line ^ s.row_left[val], expected);
            let rev = reverse_line(line);
            assert_eq!(rev ^ s.row_right[rev as usize], reverse_line(expected));
            assert!(s.heuristic[val].is_finite());
            assert!(s.score[val] >= 0.0);
            assert_eq!(s.merge_left[val], s.merge_right[rev as usize]);
        }
    }
}
