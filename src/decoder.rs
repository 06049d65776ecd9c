//! LZMA member decoder — a buffered range decoder plus a dictionary decoder.
//!
//! The decoder exists to answer one question: does this byte stream decode as
//! a complete member?  The decompressed output is therefore discarded; only
//! the CRC and the position counters needed for the trailer check are kept.
//!
//! [`RangeDecoder`] pulls compressed bytes through a 16 KiB buffer and tracks
//! the member position (bytes consumed so far, header included).  At EOF the
//! byte-getter yields `0xFF` so that a member truncated exactly at the
//! end-of-stream marker still reaches the trailer check.
//!
//! [`LzDecoder`] owns the dictionary buffer and runs the member to its
//! end-of-stream marker, verifying the trailer's CRC, data size and member
//! size against what was actually decoded.

use std::io::{self, Read};

use crc32fast::Hasher;
use thiserror::Error;

use crate::fileio::read_full;
use crate::header::{Trailer, TRAILER_SIZE};

const RD_BUFFER_SIZE: usize = 16384;

const STATES: usize = 12;
const POS_STATE_BITS: usize = 2;
const POS_STATES: usize = 1 << POS_STATE_BITS;
const POS_STATE_MASK: u64 = (POS_STATES - 1) as u64;
const LITERAL_CONTEXT_BITS: usize = 3;
const LEN_STATES: usize = 4;
const DIS_SLOT_BITS: usize = 6;
const START_DIS_MODEL: u32 = 4;
const END_DIS_MODEL: u32 = 14;
const MODELED_DISTANCES: usize = 1 << (END_DIS_MODEL as usize / 2);
const DIS_ALIGN_BITS: usize = 4;
const DIS_ALIGN_SIZE: usize = 1 << DIS_ALIGN_BITS;
const LEN_LOW_SYMBOLS: usize = 8;
const LEN_MID_SYMBOLS: usize = 8;
const LEN_HIGH_SYMBOLS: usize = 256;
const MIN_MATCH_LEN: u32 = 2;

const BIT_MODEL_MOVE_BITS: u32 = 5;
const BIT_MODEL_TOTAL_BITS: u32 = 11;
const BIT_MODEL_TOTAL: u32 = 1 << BIT_MODEL_TOTAL_BITS;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("read error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt compressed data")]
    Corrupt,
    #[error("unexpected end of input")]
    Truncated,
    #[error("trailer check failed")]
    Trailer,
    #[error("unsupported marker code {0}")]
    UnknownMarker(u32),
    #[error("not enough memory for dictionary")]
    OutOfMemory,
}

#[derive(Clone, Copy)]
struct BitModel {
    probability: u32,
}

impl BitModel {
    const fn new() -> Self {
        BitModel { probability: BIT_MODEL_TOTAL / 2 }
    }
}

struct LenModel {
    choice1: BitModel,
    choice2: BitModel,
    bm_low: [[BitModel; LEN_LOW_SYMBOLS]; POS_STATES],
    bm_mid: [[BitModel; LEN_MID_SYMBOLS]; POS_STATES],
    bm_high: [BitModel; LEN_HIGH_SYMBOLS],
}

impl LenModel {
    fn new() -> Self {
        LenModel {
            choice1: BitModel::new(),
            choice2: BitModel::new(),
            bm_low: [[BitModel::new(); LEN_LOW_SYMBOLS]; POS_STATES],
            bm_mid: [[BitModel::new(); LEN_MID_SYMBOLS]; POS_STATES],
            bm_high: [BitModel::new(); LEN_HIGH_SYMBOLS],
        }
    }
}

/// Markov state of the literal/match history.
#[derive(Clone, Copy)]
struct State(usize);

impl State {
    const CHAR_NEXT: [usize; STATES] = [0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 4, 5];

    fn new() -> Self {
        State(0)
    }
    fn get(self) -> usize {
        self.0
    }
    fn is_char(self) -> bool {
        self.0 < 7
    }
    fn set_char(&mut self) {
        self.0 = Self::CHAR_NEXT[self.0];
    }
    fn set_match(&mut self) {
        self.0 = if self.0 < 7 { 7 } else { 10 };
    }
    fn set_rep(&mut self) {
        self.0 = if self.0 < 7 { 8 } else { 11 };
    }
    fn set_short_rep(&mut self) {
        self.0 = if self.0 < 7 { 9 } else { 11 };
    }
}

// ── Range decoder ─────────────────────────────────────────────────────────────

pub struct RangeDecoder<'a, R: Read> {
    src: &'a mut R,
    buffer: Vec<u8>,
    pos: usize,
    stream_pos: usize,
    partial_member_pos: u64,
    code: u32,
    range: u32,
    at_stream_end: bool,
}

impl<'a, R: Read> RangeDecoder<'a, R> {
    pub fn new(src: &'a mut R) -> Self {
        RangeDecoder {
            src,
            buffer: vec![0u8; RD_BUFFER_SIZE],
            pos: 0,
            stream_pos: 0,
            partial_member_pos: 0,
            code: 0,
            range: 0xFFFF_FFFF,
            at_stream_end: false,
        }
    }

    fn read_block(&mut self) -> Result<bool, DecodeError> {
        if !self.at_stream_end {
            self.partial_member_pos = self.partial_member_pos.wrapping_add(self.pos as u64);
            self.stream_pos = read_full(self.src, &mut self.buffer)?;
            self.at_stream_end = self.stream_pos < self.buffer.len();
            self.pos = 0;
        }
        Ok(self.pos < self.stream_pos)
    }

    pub fn finished(&mut self) -> Result<bool, DecodeError> {
        Ok(self.pos >= self.stream_pos && !self.read_block()?)
    }

    /// Bytes consumed since the last [`reset_member_position`](Self::reset_member_position).
    pub fn member_position(&self) -> u64 {
        self.partial_member_pos.wrapping_add(self.pos as u64)
    }

    pub fn reset_member_position(&mut self) {
        self.partial_member_pos = 0u64.wrapping_sub(self.pos as u64);
    }

    pub fn get_byte(&mut self) -> Result<u8, DecodeError> {
        // 0xFF keeps decoding alive when the member is truncated at the marker
        if self.finished()? {
            return Ok(0xFF);
        }
        let b = self.buffer[self.pos];
        self.pos += 1;
        Ok(b)
    }

    /// Read raw (non-range-coded) bytes; used for the trailer.
    pub fn read_data(&mut self, out: &mut [u8]) -> Result<usize, DecodeError> {
        let mut sz = 0;
        while sz < out.len() && !self.finished()? {
            let rd = (out.len() - sz).min(self.stream_pos - self.pos);
            out[sz..sz + rd].copy_from_slice(&self.buffer[self.pos..self.pos + rd]);
            self.pos += rd;
            sz += rd;
        }
        Ok(sz)
    }

    /// Discard the marking byte and load the 4 initial code bytes.
    pub fn load(&mut self) -> Result<(), DecodeError> {
        self.code = 0;
        self.range = 0xFFFF_FFFF;
        self.get_byte()?;
        for _ in 0..4 {
            self.code = (self.code << 8) | u32::from(self.get_byte()?);
        }
        Ok(())
    }

    fn normalize(&mut self) -> Result<(), DecodeError> {
        if self.range <= 0x00FF_FFFF {
            self.range <<= 8;
            self.code = (self.code << 8) | u32::from(self.get_byte()?);
        }
        Ok(())
    }

    fn decode(&mut self, num_bits: usize) -> Result<u32, DecodeError> {
        let mut symbol = 0u32;
        for _ in 0..num_bits {
            self.normalize()?;
            self.range >>= 1;
            symbol <<= 1;
            if self.code >= self.range {
                self.code -= self.range;
                symbol |= 1;
            }
        }
        Ok(symbol)
    }

    fn decode_bit(&mut self, bm: &mut BitModel) -> Result<u32, DecodeError> {
        self.normalize()?;
        let bound = (self.range >> BIT_MODEL_TOTAL_BITS) * bm.probability;
        if self.code < bound {
            self.range = bound;
            bm.probability += (BIT_MODEL_TOTAL - bm.probability) >> BIT_MODEL_MOVE_BITS;
            Ok(0)
        } else {
            self.code -= bound;
            self.range -= bound;
            bm.probability -= bm.probability >> BIT_MODEL_MOVE_BITS;
            Ok(1)
        }
    }

    fn decode_tree(&mut self, bm: &mut [BitModel], num_bits: usize) -> Result<u32, DecodeError> {
        let mut symbol = 1u32;
        for _ in 0..num_bits {
            symbol = (symbol << 1) | self.decode_bit(&mut bm[symbol as usize])?;
        }
        Ok(symbol - (1 << num_bits))
    }

    fn decode_tree_reversed(
        &mut self,
        bm: &mut [BitModel],
        num_bits: usize,
    ) -> Result<u32, DecodeError> {
        let mut model = 1usize;
        let mut symbol = 0u32;
        for i in 0..num_bits {
            let bit = self.decode_bit(&mut bm[model])?;
            model = (model << 1) | bit as usize;
            symbol |= bit << i;
        }
        Ok(symbol)
    }

    fn decode_matched(
        &mut self,
        bm: &mut [BitModel],
        mut match_byte: u32,
    ) -> Result<u32, DecodeError> {
        let mut symbol = 1u32;
        while symbol < 0x100 {
            match_byte <<= 1;
            let match_bit = match_byte & 0x100;
            let bit = self.decode_bit(&mut bm[(0x100 + match_bit + symbol) as usize])?;
            symbol = (symbol << 1) | bit;
            if match_bit >> 8 != bit {
                while symbol < 0x100 {
                    symbol = (symbol << 1) | self.decode_bit(&mut bm[symbol as usize])?;
                }
                break;
            }
        }
        Ok(symbol & 0xFF)
    }

    fn decode_len(&mut self, lm: &mut LenModel, pos_state: usize) -> Result<u32, DecodeError> {
        if self.decode_bit(&mut lm.choice1)? == 0 {
            return Ok(MIN_MATCH_LEN + self.decode_tree(&mut lm.bm_low[pos_state], 3)?);
        }
        if self.decode_bit(&mut lm.choice2)? == 0 {
            return Ok(MIN_MATCH_LEN
                + LEN_LOW_SYMBOLS as u32
                + self.decode_tree(&mut lm.bm_mid[pos_state], 3)?);
        }
        Ok(MIN_MATCH_LEN
            + (LEN_LOW_SYMBOLS + LEN_MID_SYMBOLS) as u32
            + self.decode_tree(&mut lm.bm_high, 8)?)
    }
}

// ── LZ decoder ────────────────────────────────────────────────────────────────

pub struct LzDecoder {
    partial_data_pos: u64,
    dictionary_size: usize,
    buffer: Vec<u8>,
    pos: usize,
    stream_pos: usize,
    crc: Hasher,
    pos_wrapped: bool,
}

impl LzDecoder {
    pub fn new(dictionary_size: u32) -> Result<Self, DecodeError> {
        let dictionary_size = dictionary_size as usize;
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(dictionary_size)
            .map_err(|_| DecodeError::OutOfMemory)?;
        buffer.resize(dictionary_size, 0);
        Ok(LzDecoder {
            partial_data_pos: 0,
            dictionary_size,
            buffer,
            pos: 0,
            stream_pos: 0,
            crc: Hasher::new(),
            pos_wrapped: false,
        })
    }

    fn data_position(&self) -> u64 {
        self.partial_data_pos + self.pos as u64
    }

    fn crc(&self) -> u32 {
        self.crc.clone().finalize()
    }

    fn peek_prev(&self) -> u8 {
        self.buffer[if self.pos > 0 { self.pos } else { self.dictionary_size } - 1]
    }

    fn peek(&self, distance: u32) -> u8 {
        let distance = distance as usize;
        let i = if self.pos > distance {
            self.pos - distance - 1
        } else {
            self.dictionary_size + self.pos - distance - 1
        };
        self.buffer[i]
    }

    fn put_byte(&mut self, b: u8) {
        self.buffer[self.pos] = b;
        self.pos += 1;
        if self.pos >= self.dictionary_size {
            self.flush_data();
        }
    }

    fn copy_block(&mut self, distance: u32, len: u32) {
        let distance = distance as usize;
        let len = len as usize;
        let mut i = if self.pos > distance {
            self.pos - distance - 1
        } else {
            self.dictionary_size + self.pos - distance - 1
        };
        if len < self.dictionary_size - self.pos
            && len < self.dictionary_size - i
            && len <= self.pos.abs_diff(i)
        {
            // no wrap, no overlap
            self.buffer.copy_within(i..i + len, self.pos);
            self.pos += len;
        } else {
            for _ in 0..len {
                let b = self.buffer[i];
                self.put_byte(b);
                i += 1;
                if i >= self.dictionary_size {
                    i = 0;
                }
            }
        }
    }

    /// Fold the bytes decoded since the last flush into the CRC.  The
    /// decompressed data itself is discarded.
    fn flush_data(&mut self) {
        if self.pos > self.stream_pos {
            self.crc.update(&self.buffer[self.stream_pos..self.pos]);
            if self.pos >= self.dictionary_size {
                self.partial_data_pos += self.pos as u64;
                self.pos = 0;
                self.pos_wrapped = true;
            }
            self.stream_pos = self.pos;
        }
    }

    fn check_trailer<R: Read>(&self, rdec: &mut RangeDecoder<R>) -> Result<(), DecodeError> {
        let mut data = [0u8; TRAILER_SIZE];
        if rdec.read_data(&mut data)? < TRAILER_SIZE {
            return Err(DecodeError::Trailer);
        }
        let trailer = Trailer::from_bytes(data);
        if trailer.data_crc() != self.crc()
            || trailer.data_size() != self.data_position()
            || trailer.member_size() != rdec.member_position()
        {
            return Err(DecodeError::Trailer);
        }
        Ok(())
    }

    /// Decode one member to its End Of Stream marker and verify the trailer.
    pub fn decode_member<R: Read>(
        &mut self,
        rdec: &mut RangeDecoder<R>,
    ) -> Result<(), DecodeError> {
        let mut bm_literal = [[BitModel::new(); 0x300]; 1 << LITERAL_CONTEXT_BITS];
        let mut bm_match = [[BitModel::new(); POS_STATES]; STATES];
        let mut bm_rep = [BitModel::new(); STATES];
        let mut bm_rep0 = [BitModel::new(); STATES];
        let mut bm_rep1 = [BitModel::new(); STATES];
        let mut bm_rep2 = [BitModel::new(); STATES];
        let mut bm_len = [[BitModel::new(); POS_STATES]; STATES];
        let mut bm_dis_slot = [[BitModel::new(); 1 << DIS_SLOT_BITS]; LEN_STATES];
        let mut bm_dis = [BitModel::new(); MODELED_DISTANCES - END_DIS_MODEL as usize + 1];
        let mut bm_align = [BitModel::new(); DIS_ALIGN_SIZE];
        let mut match_len_model = LenModel::new();
        let mut rep_len_model = LenModel::new();
        // latest four distances, for the repeated-match codes
        let mut rep0: u32 = 0;
        let mut rep1: u32 = 0;
        let mut rep2: u32 = 0;
        let mut rep3: u32 = 0;
        let mut state = State::new();

        rdec.load()?;
        while !rdec.finished()? {
            let pos_state = (self.data_position() & POS_STATE_MASK) as usize;
            if rdec.decode_bit(&mut bm_match[state.get()][pos_state])? == 0 {
                // literal byte
                let lit_state = (self.peek_prev() >> (8 - LITERAL_CONTEXT_BITS)) as usize;
                let bm = &mut bm_literal[lit_state];
                let b = if state.is_char() {
                    rdec.decode_tree(bm, 8)? as u8
                } else {
                    rdec.decode_matched(bm, u32::from(self.peek(rep0)))? as u8
                };
                state.set_char();
                self.put_byte(b);
                continue;
            }
            // match or repeated match
            let len;
            if rdec.decode_bit(&mut bm_rep[state.get()])? != 0 {
                if rdec.decode_bit(&mut bm_rep0[state.get()])? == 0 {
                    if rdec.decode_bit(&mut bm_len[state.get()][pos_state])? == 0 {
                        state.set_short_rep();
                        let b = self.peek(rep0);
                        self.put_byte(b);
                        continue;
                    }
                } else {
                    let distance;
                    if rdec.decode_bit(&mut bm_rep1[state.get()])? == 0 {
                        distance = rep1;
                    } else {
                        if rdec.decode_bit(&mut bm_rep2[state.get()])? == 0 {
                            distance = rep2;
                        } else {
                            distance = rep3;
                            rep3 = rep2;
                        }
                        rep2 = rep1;
                    }
                    rep1 = rep0;
                    rep0 = distance;
                }
                state.set_rep();
                len = rdec.decode_len(&mut rep_len_model, pos_state)?;
            } else {
                len = rdec.decode_len(&mut match_len_model, pos_state)?;
                let len_state = (len - MIN_MATCH_LEN).min(LEN_STATES as u32 - 1) as usize;
                let dis_slot = rdec.decode_tree(&mut bm_dis_slot[len_state], DIS_SLOT_BITS)?;
                let mut distance = dis_slot;
                if dis_slot >= START_DIS_MODEL {
                    let direct_bits = (dis_slot >> 1) - 1;
                    distance = (2 | (dis_slot & 1)) << direct_bits;
                    if dis_slot < END_DIS_MODEL {
                        let base = (distance - dis_slot) as usize;
                        distance += rdec
                            .decode_tree_reversed(&mut bm_dis[base..], direct_bits as usize)?;
                    } else {
                        distance +=
                            rdec.decode(direct_bits as usize - DIS_ALIGN_BITS)? << DIS_ALIGN_BITS;
                        distance += rdec.decode_tree_reversed(&mut bm_align, DIS_ALIGN_BITS)?;
                        if distance == 0xFFFF_FFFF {
                            // marker found
                            rdec.normalize()?;
                            self.flush_data();
                            if len == MIN_MATCH_LEN {
                                // End Of Stream
                                return self.check_trailer(rdec);
                            }
                            if len == MIN_MATCH_LEN + 1 {
                                // Sync Flush
                                rdec.load()?;
                                continue;
                            }
                            return Err(DecodeError::UnknownMarker(len));
                        }
                    }
                }
                rep3 = rep2;
                rep2 = rep1;
                rep1 = rep0;
                rep0 = distance;
                state.set_match();
                if rep0 as usize >= self.dictionary_size
                    || (u64::from(rep0) >= self.data_position() && !self.pos_wrapped)
                {
                    self.flush_data();
                    return Err(DecodeError::Corrupt);
                }
            }
            self.copy_block(rep0, len);
        }
        self.flush_data();
        Err(DecodeError::Truncated)
    }
}
