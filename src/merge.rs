//! Merge recovery — reconstruct one good member from several damaged copies.
//!
//! After diff-scanning the copies, every way of assigning "which copy fills
//! each disagreement block" is enumerated as a base-K number and tried
//! against the oracle.  When the copies disagree in a single contiguous
//! block, that block is split into a 1-byte pivot plus a tail and the pivot
//! slides rightward through the region after each full round of assignments,
//! covering damage where the good bytes interleave across copies.

use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::diff::{copy_and_diff, Block};
use crate::error::RescueError;
use crate::fileio::{copy_bytes, open_instream, open_outstream};
use crate::header::{verify_single_member, MIN_MEMBER_SIZE};
use crate::oracle::{exit_out_of_memory, try_decompress, Verdict};
use crate::verbosity;

/// Integer power saturating at `i32::MAX`, the search-cardinality ceiling.
fn ipow(base: u64, exponent: usize) -> u64 {
    let mut result = 1u64;
    for _ in 0..exponent {
        result = result.saturating_mul(base);
        if result >= i32::MAX as u64 {
            return i32::MAX as u64;
        }
    }
    result
}

pub fn merge_files(
    filenames: &[PathBuf],
    output_filename: &Path,
    force: bool,
) -> Result<(), RescueError> {
    let mut copies = Vec::with_capacity(filenames.len());
    for name in filenames {
        copies.push(open_instream(name)?);
    }

    let mut input_size = 0u64;
    for (i, copy) in copies.iter_mut().enumerate() {
        let size = copy.seek(SeekFrom::End(0)).map_err(RescueError::io(format!(
            "input file `{}` is not seekable",
            filenames[i].display()
        )))?;
        if i == 0 {
            input_size = size;
        } else if size != input_size {
            return Err(RescueError::SizeMismatch);
        }
    }
    if input_size < MIN_MEMBER_SIZE {
        return Err(RescueError::TooShort);
    }
    for copy in copies.iter_mut() {
        verify_single_member(copy, input_size)?;
    }
    for (i, copy) in copies.iter_mut().enumerate() {
        copy.seek(SeekFrom::Start(0))
            .map_err(RescueError::io("seek error in input file"))?;
        match try_decompress(copy, input_size) {
            Verdict::Accept => {
                if verbosity() >= 1 {
                    println!(
                        "File `{}` has no errors. Recovery is not needed.",
                        filenames[i].display()
                    );
                }
                return Ok(());
            }
            Verdict::Fatal => exit_out_of_memory(),
            Verdict::Reject { .. } => {}
        }
    }

    let mut out = open_outstream(output_filename, force)?;
    for copy in copies.iter_mut() {
        copy.seek(SeekFrom::Start(0))
            .map_err(RescueError::io("seek error in input file"))?;
    }

    let mut blocks = copy_and_diff(&mut copies, &mut out)?;
    if blocks.is_empty() {
        return Err(RescueError::IdenticalCopies);
    }
    let single_block = blocks.len() == 1;
    if single_block && blocks[0].size < 2 {
        return Err(RescueError::IdenticalDamage);
    }

    let k = copies.len() as u64;
    if ipow(k, blocks.len()) >= i32::MAX as u64
        || (single_block && ipow(k, 2) >= i32::MAX as u64 / blocks[0].size)
    {
        return Err(RescueError::TooDamaged);
    }

    let shifts = if single_block { blocks[0].size - 1 } else { 1 };
    if single_block {
        let tail = Block::new(blocks[0].pos + 1, blocks[0].size - 1);
        blocks[0].size = 1;
        blocks.push(tail);
    }

    let base_variations = ipow(k, blocks.len());
    // the top variation would reproduce the last copy verbatim
    let variations = base_variations * shifts - 2;
    let mut done = false;
    for var in 1..=variations {
        if verbosity() >= 1 {
            print!("Trying variation {var} of {variations} \r");
            let _ = io::stdout().flush();
        }
        apply_variation(&mut copies, &mut out, &blocks, var, k)?;
        out.seek(SeekFrom::Start(0))
            .map_err(RescueError::io("seek error in output file"))?;
        match try_decompress(&mut out, input_size) {
            Verdict::Accept => {
                done = true;
                break;
            }
            Verdict::Fatal => exit_out_of_memory(),
            Verdict::Reject { .. } => {}
        }
        if var % base_variations == 0 {
            let (head, tail) = blocks.split_at_mut(1);
            head[0].shift(&mut tail[0]);
        }
    }
    if verbosity() >= 1 {
        println!();
    }

    if done {
        if verbosity() >= 1 {
            println!("Input files merged successfully.");
        }
        Ok(())
    } else {
        drop(out);
        let _ = fs::remove_file(output_filename);
        Err(RescueError::MergeExhausted)
    }
}

/// Decode `var` into base-K digits, one per block, and copy each block from
/// the selected copy into the output.
fn apply_variation(
    copies: &mut [File],
    out: &mut File,
    blocks: &[Block],
    var: u64,
    k: u64,
) -> Result<(), RescueError> {
    let mut tmp = var;
    for block in blocks {
        let digit = (tmp % k) as usize;
        tmp /= k;
        let copy = copies
            .get_mut(digit)
            .ok_or(RescueError::Internal("variation digit out of range"))?;
        copy.seek(SeekFrom::Start(block.pos))
            .map_err(RescueError::io("seek error in input file"))?;
        out.seek(SeekFrom::Start(block.pos))
            .map_err(RescueError::io("seek error in output file"))?;
        copy_bytes(copy, out, block.size)
            .map_err(RescueError::io("error copying input to output file"))?;
    }
    Ok(())
}
