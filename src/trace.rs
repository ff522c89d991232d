use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::engine::Board;
use crate::episode::{Action, Episode};

const MAGIC: &[u8; 4] = b"T3R1"; // ASCII magic
const VERSION: u8 = 1;
const ENDIAN_LE: u8 = 0; // 0 = little-endian

// 4 magic + 1 version + 1 endian + 4 steps + 8 start + 4 elapsed + 4 score + 1 max_rank + 2 player_len
const HEADER_LEN: usize = 4 + 1 + 1 + 4 + 8 + 4 + 4 + 1 + 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub steps: u32,
    pub start_unix_s: u64,
    pub elapsed_s: f32,
    pub score: f32,
    pub max_rank: u8,
    pub player: Option<String>,
}

/// A recorded game: the board before and after every action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub meta: Meta,
    pub states: Vec<u64>, // length = steps + 1
    pub hints: Vec<u8>,   // length = steps + 1
    pub actions: Vec<u32>, // length = steps
}

#[derive(thiserror::Error, Debug)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid magic or version")]
    MagicOrVersion,
    #[error("unsupported endianness")]
    Endianness,
    #[error("file too short or malformed")]
    Malformed,
    #[error("checksum mismatch")]
    Checksum,
    #[error("player name longer than {} bytes", u16::MAX)]
    PlayerName,
}

impl Run {
    /// Capture a finished episode.
    pub fn from_episode(episode: &Episode, player: Option<&str>, start_unix_s: u64) -> Self {
        let mut states = Vec::with_capacity(episode.steps().len() + 1);
        let mut hints = Vec::with_capacity(episode.steps().len() + 1);
        states.push(episode.initial().raw());
        hints.push(episode.initial().hint());
        for step in episode.steps() {
            states.push(step.after.raw());
            hints.push(step.after.hint());
        }
        let meta = Meta {
            steps: episode.steps().len() as u32,
            start_unix_s,
            elapsed_s: episode.elapsed().as_secs_f32(),
            score: episode.score(),
            max_rank: episode.max_rank(),
            player: player.map(str::to_string),
        };
        let actions = episode.steps().iter().map(|s| s.action.code()).collect();
        Run { meta, states, hints, actions }
    }

    /// Replay the actions from the first state.
    ///
    /// Returns `None` if an action code is unknown, an action does not apply
    /// or a recorded state disagrees with the replay.
    pub fn replay(&self) -> Option<Episode> {
        let initial = Board::with_hint(*self.states.first()?, *self.hints.first()?);
        let mut episode = Episode::from_board(initial);
        for (i, &code) in self.actions.iter().enumerate() {
            episode.apply(Action::from_code(code)?)?;
            let board = episode.board();
            if board.raw() != *self.states.get(i + 1)? || board.hint() != *self.hints.get(i + 1)? {
                return None;
            }
        }
        episode.close();
        Some(episode)
    }
}

#[inline]
fn read_u16_le(bytes: &[u8]) -> Option<u16> {
    if bytes.len() < 2 { return None; }
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[inline]
fn read_u32_le(bytes: &[u8]) -> Option<u32> {
    if bytes.len() < 4 { return None; }
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
fn read_u64_le(bytes: &[u8]) -> Option<u64> {
    if bytes.len() < 8 { return None; }
    Some(u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]))
}

#[inline]
fn read_f32_le(bytes: &[u8]) -> Option<f32> {
    read_u32_le(bytes).map(f32::from_bits)
}

pub fn encode_run(run: &Run) -> Result<Vec<u8>, TraceError> {
    let meta = &run.meta;
    let steps = meta.steps as usize;
    if run.states.len() != steps + 1 || run.hints.len() != steps + 1 || run.actions.len() != steps {
        return Err(TraceError::Malformed);
    }
    let player_bytes = meta.player.as_ref().map(|s| s.as_bytes()).unwrap_or(&[]);
    let player_len: u16 = player_bytes.len().try_into().map_err(|_| TraceError::PlayerName)?;

    let payload_len = player_bytes.len() + run.states.len() * 8 + run.hints.len() + run.actions.len() * 4;
    let mut buf = Vec::with_capacity(HEADER_LEN + payload_len + 4);

    // Header
    buf.extend_from_slice(MAGIC);
    buf.push(VERSION);
    buf.push(ENDIAN_LE);
    buf.extend_from_slice(&meta.steps.to_le_bytes());
    buf.extend_from_slice(&meta.start_unix_s.to_le_bytes());
    buf.extend_from_slice(&meta.elapsed_s.to_bits().to_le_bytes());
    buf.extend_from_slice(&meta.score.to_bits().to_le_bytes());
    buf.push(meta.max_rank);
    buf.extend_from_slice(&player_len.to_le_bytes());
    buf.extend_from_slice(player_bytes);

    // Payload: states LE u64, hints u8, actions LE u32
    for &v in &run.states { buf.extend_from_slice(&v.to_le_bytes()); }
    buf.extend_from_slice(&run.hints);
    for &a in &run.actions { buf.extend_from_slice(&a.to_le_bytes()); }

    // Trailer: CRC32C of all preceding bytes
    let checksum = crc32c::crc32c(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    Ok(buf)
}

pub fn write_run_to_path<P: AsRef<Path>>(path: P, run: &Run) -> Result<(), TraceError> {
    let data = encode_run(run)?;
    let mut f = fs::File::create(path)?;
    f.write_all(&data)?;
    Ok(())
}

pub fn parse_run_bytes(bytes: &[u8]) -> Result<Run, TraceError> {
    if bytes.len() < HEADER_LEN + 4 {
        return Err(TraceError::Malformed);
    }

    // Validate checksum first to avoid panics while reading fields
    let (content, trailer) = bytes.split_at(bytes.len() - 4);
    let file_crc = read_u32_le(trailer).ok_or(TraceError::Malformed)?;
    if file_crc != crc32c::crc32c(content) { return Err(TraceError::Checksum); }

    if &content[..4] != MAGIC || content[4] != VERSION { return Err(TraceError::MagicOrVersion); }
    if content[5] != ENDIAN_LE { return Err(TraceError::Endianness); }

    let mut off = 6;
    let steps = read_u32_le(&content[off..]).ok_or(TraceError::Malformed)?; off += 4;
    let start_unix_s = read_u64_le(&content[off..]).ok_or(TraceError::Malformed)?; off += 8;
    let elapsed_s = read_f32_le(&content[off..]).ok_or(TraceError::Malformed)?; off += 4;
    let score = read_f32_le(&content[off..]).ok_or(TraceError::Malformed)?; off += 4;
    let max_rank = content[off]; off += 1;
    let player_len = read_u16_le(&content[off..]).ok_or(TraceError::Malformed)? as usize; off += 2;

    if content.len() < off + player_len { return Err(TraceError::Malformed); }
    let player = match player_len {
        0 => None,
        _ => std::str::from_utf8(&content[off..off + player_len]).ok().map(str::to_string),
    };
    off += player_len;

    let count = steps as usize + 1;
    let states_len = count.checked_mul(8).ok_or(TraceError::Malformed)?;
    let actions_len = (steps as usize).checked_mul(4).ok_or(TraceError::Malformed)?;
    if content.len() != off + states_len + count + actions_len {
        return Err(TraceError::Malformed);
    }

    let states = content[off..off + states_len]
        .chunks_exact(8)
        .map(|c| read_u64_le(c).ok_or(TraceError::Malformed))
        .collect::<Result<Vec<_>, _>>()?;
    off += states_len;
    let hints = content[off..off + count].to_vec();
    off += count;
    let actions = content[off..off + actions_len]
        .chunks_exact(4)
        .map(|c| read_u32_le(c).ok_or(TraceError::Malformed))
        .collect::<Result<Vec<_>, _>>()?;

    let meta = Meta { steps, start_unix_s, elapsed_s, score, max_rank, player };
    Ok(Run { meta, states, hints, actions })
}

pub fn parse_run_file<P: AsRef<Path>>(path: P) -> Result<Run, TraceError> {
    let data = fs::read(path)?;
    parse_run_bytes(&data)
}

pub fn now_unix_seconds() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
