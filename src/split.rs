//! Split a multimember stream into sequentially numbered member files.
//!
//! A single forward pass with a sliding window of
//! `trailer (20 B) + chunk (64 KiB) + header (6 B)` bytes.  A magic prefix
//! found mid-stream is only trusted as a member boundary when the 8 bytes
//! just before it, read as a little-endian member size, equal the distance
//! from the previous boundary; the magic can occur inside compressed data by
//! coincidence, so only the self-describing size confirms it.  Between chunks the
//! trailing `trailer + header` bytes move to the front of the window so a
//! boundary can be confirmed across the chunk seam.

use std::io::Write;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::RescueError;
use crate::fileio::{open_instream, open_outstream, read_full};
use crate::header::{verify_header, Header, HEADER_SIZE, MAGIC, MIN_MEMBER_SIZE, TRAILER_SIZE};

const SPLIT_CHUNK_SIZE: usize = 65536;

/// Advance the 5-digit counter embedded in a `recNNNNN` prefix, with base-10
/// carry propagation.  Returns false on overflow past `rec99999`.
fn next_prefix(prefix: &mut [u8; 8]) -> bool {
    for i in (3..8).rev() {
        if prefix[i] < b'9' {
            prefix[i] += 1;
            return true;
        }
        prefix[i] = b'0';
    }
    false
}

fn output_name(prefix: &[u8; 8], suffix: &str) -> PathBuf {
    PathBuf::from(format!("{}{}", String::from_utf8_lossy(prefix), suffix))
}

pub fn split_file(
    input_filename: &Path,
    output_suffix: &str,
    force: bool,
) -> Result<(), RescueError> {
    // window layout: [ trailer lookback | chunk | header carry ]
    let mut window = vec![0u8; TRAILER_SIZE + SPLIT_CHUNK_SIZE + HEADER_SIZE];

    let mut input = open_instream(input_filename)?;
    let rd = read_full(&mut input, &mut window[TRAILER_SIZE..])
        .map_err(RescueError::io("read error"))?;
    if (rd as u64) < MIN_MEMBER_SIZE {
        return Err(RescueError::TooShort);
    }
    let mut size = rd - HEADER_SIZE;
    let mut at_stream_end = size < SPLIT_CHUNK_SIZE;

    let first = Header::read(&mut &window[TRAILER_SIZE..])
        .map_err(RescueError::io("read error"))?;
    verify_header(&first)?;

    let mut prefix = *b"rec00001";
    let mut out = open_outstream(&output_name(&prefix, output_suffix), force)?;

    let mut partial_member_size: u64 = 0;
    loop {
        let mut pos: usize = 0;
        for newpos in 1..=size {
            if window[TRAILER_SIZE + newpos..TRAILER_SIZE + newpos + 4] != MAGIC {
                continue;
            }
            let member_size =
                LittleEndian::read_u64(&window[TRAILER_SIZE + newpos - 8..TRAILER_SIZE + newpos]);
            if partial_member_size + (newpos - pos) as u64 == member_size {
                // confirmed boundary
                out.write_all(&window[TRAILER_SIZE + pos..TRAILER_SIZE + newpos])
                    .map_err(RescueError::io("write error"))?;
                drop(out);
                if !next_prefix(&mut prefix) {
                    return Err(RescueError::TooManyMembers);
                }
                out = open_outstream(&output_name(&prefix, output_suffix), force)?;
                partial_member_size = 0;
                pos = newpos;
            }
        }

        if at_stream_end {
            out.write_all(&window[TRAILER_SIZE + pos..TRAILER_SIZE + size + HEADER_SIZE])
                .map_err(RescueError::io("write error"))?;
            break;
        }
        if pos < SPLIT_CHUNK_SIZE {
            partial_member_size += (SPLIT_CHUNK_SIZE - pos) as u64;
            out.write_all(&window[TRAILER_SIZE + pos..TRAILER_SIZE + SPLIT_CHUNK_SIZE])
                .map_err(RescueError::io("write error"))?;
        }
        window.copy_within(SPLIT_CHUNK_SIZE.., 0);
        let rd = read_full(
            &mut input,
            &mut window[TRAILER_SIZE + HEADER_SIZE..TRAILER_SIZE + HEADER_SIZE + SPLIT_CHUNK_SIZE],
        )
        .map_err(RescueError::io("read error"))?;
        size = rd;
        at_stream_end = size < SPLIT_CHUNK_SIZE;
    }
    Ok(())
}
