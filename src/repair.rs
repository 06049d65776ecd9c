//! Repair recovery — fix a single damaged byte in one copy.
//!
//! The oracle's reported failure position anchors a bounded search window:
//! every byte in `[max(header, failure_pos - 1000), failure_pos]`, scanned
//! from high to low, is cycled through its 255 other values, re-running the
//! oracle after each write.  A byte that fails all trials is restored to its
//! original value before the scan moves on.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::RescueError;
use crate::fileio::{open_instream, open_outstream};
use crate::header::{verify_single_member, HEADER_SIZE, MIN_MEMBER_SIZE};
use crate::oracle::{exit_out_of_memory, try_decompress, Verdict};
use crate::verbosity;

/// How far below the reported failure position the search reaches.
const REPAIR_WINDOW: u64 = 1000;

pub fn repair_file(
    input_filename: &Path,
    output_filename: &Path,
    force: bool,
) -> Result<(), RescueError> {
    let mut input = open_instream(input_filename)?;
    let input_size = input
        .seek(SeekFrom::End(0))
        .map_err(RescueError::io("input file is not seekable"))?;
    if input_size < MIN_MEMBER_SIZE {
        return Err(RescueError::TooShort);
    }
    verify_single_member(&mut input, input_size)?;
    input
        .seek(SeekFrom::Start(0))
        .map_err(RescueError::io("seek error in input file"))?;
    let mut failure_pos = match try_decompress(&mut input, input_size) {
        Verdict::Accept => {
            if verbosity() >= 1 {
                println!("Input file has no errors. Recovery is not needed.");
            }
            return Ok(());
        }
        Verdict::Fatal => exit_out_of_memory(),
        Verdict::Reject { failure_pos } => failure_pos,
    };
    // the trailer tail is assumed intact; the error must lie earlier
    if failure_pos >= input_size - 8 {
        failure_pos = input_size - 8 - 1;
    }
    if failure_pos < HEADER_SIZE as u64 {
        return Err(RescueError::HeaderDamaged);
    }

    let mut out = open_outstream(output_filename, force)?;
    input
        .seek(SeekFrom::Start(0))
        .map_err(RescueError::io("seek error in input file"))?;
    io::copy(&mut input, &mut out)
        .map_err(RescueError::io("error copying input to output file"))?;

    let min_pos = failure_pos.saturating_sub(REPAIR_WINDOW).max(HEADER_SIZE as u64);
    let mut done = false;
    'positions: for pos in (min_pos..=failure_pos).rev() {
        if verbosity() >= 1 {
            print!("Trying position {pos} \r");
            let _ = io::stdout().flush();
        }
        let mut byte =
            read_byte_at(&mut out, pos).map_err(RescueError::io("error reading output file"))?;
        for _ in 0..255 {
            byte = byte.wrapping_add(1);
            write_byte_at(&mut out, pos, byte)
                .map_err(RescueError::io("error writing output file"))?;
            out.seek(SeekFrom::Start(0))
                .map_err(RescueError::io("seek error in output file"))?;
            match try_decompress(&mut out, input_size) {
                Verdict::Accept => {
                    done = true;
                    break 'positions;
                }
                Verdict::Fatal => exit_out_of_memory(),
                Verdict::Reject { .. } => {}
            }
        }
        // 255 failed trials leave the byte one below its original value
        byte = byte.wrapping_add(1);
        write_byte_at(&mut out, pos, byte)
            .map_err(RescueError::io("error writing output file"))?;
    }
    if verbosity() >= 1 {
        println!();
    }

    if done {
        if verbosity() >= 1 {
            println!("Copy of input file repaired successfully.");
        }
        Ok(())
    } else {
        drop(out);
        let _ = fs::remove_file(output_filename);
        Err(RescueError::RepairExhausted)
    }
}

fn read_byte_at(file: &mut File, pos: u64) -> io::Result<u8> {
    file.seek(SeekFrom::Start(pos))?;
    let mut byte = [0u8; 1];
    file.read_exact(&mut byte)?;
    Ok(byte[0])
}

fn write_byte_at(file: &mut File, pos: u64, byte: u8) -> io::Result<()> {
    file.seek(SeekFrom::Start(pos))?;
    file.write_all(&[byte])
}
