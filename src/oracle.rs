//! The decompression oracle: decides whether a byte stream is one complete,
//! valid member.  Its verdict is the fitness function for merge and repair.

use std::io::Read;
use std::process;

use crate::decoder::{DecodeError, LzDecoder, RangeDecoder};
use crate::header::{Header, HEADER_SIZE, MAX_DICTIONARY_SIZE, MIN_DICTIONARY_SIZE};
use crate::verbosity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The member decoded completely and consumed exactly the expected size.
    Accept,
    /// Decoding failed after consuming `failure_pos` bytes (0 when the
    /// failure happened at or before the header).
    Reject { failure_pos: u64 },
    /// The dictionary buffer could not be allocated.  Not a statement about
    /// the input; callers terminate the process.
    Fatal,
}

impl Verdict {
    pub fn is_accept(self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

/// Decode one member from the current position of `src` and check that it
/// consumed exactly `expected_size` bytes.  Pure with respect to the byte
/// contents of `src`; the decompressed output is discarded.
pub fn try_decompress<R: Read>(src: &mut R, expected_size: u64) -> Verdict {
    let mut rdec = RangeDecoder::new(src);
    rdec.reset_member_position();
    match run_member(&mut rdec, expected_size) {
        Ok(verdict) => verdict,
        Err(DecodeError::OutOfMemory) => Verdict::Fatal,
        Err(_) => Verdict::Reject { failure_pos: rdec.member_position() },
    }
}

fn run_member<R: Read>(
    rdec: &mut RangeDecoder<R>,
    expected_size: u64,
) -> Result<Verdict, DecodeError> {
    let mut data = [0u8; HEADER_SIZE];
    for b in data.iter_mut() {
        *b = rdec.get_byte()?;
    }
    let header = Header::from_bytes(data);
    let dictionary_size = header.dictionary_size();
    if rdec.finished()?
        || !header.magic_ok()
        || header.version() != 1
        || !(MIN_DICTIONARY_SIZE..=MAX_DICTIONARY_SIZE).contains(&dictionary_size)
    {
        return Ok(Verdict::Reject { failure_pos: 0 });
    }
    let mut decoder = LzDecoder::new(dictionary_size)?;
    match decoder.decode_member(rdec) {
        Ok(()) if rdec.member_position() == expected_size => Ok(Verdict::Accept),
        Ok(()) => Ok(Verdict::Reject { failure_pos: rdec.member_position() }),
        Err(e @ (DecodeError::OutOfMemory | DecodeError::Io(_))) => Err(e),
        Err(_) => Ok(Verdict::Reject { failure_pos: rdec.member_position() }),
    }
}

/// Allocation failure inside the oracle is an environmental problem, not a
/// verdict about the input.
pub fn exit_out_of_memory() -> ! {
    if verbosity() >= 0 {
        eprintln!("lzrescue: not enough memory to decode member");
    }
    process::exit(1);
}
