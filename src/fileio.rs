//! File open/copy wrappers shared by the recovery engines.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::RescueError;

/// Open `path` read-only, rejecting anything that is not a regular file.
pub fn open_instream(path: &Path) -> Result<File, RescueError> {
    let context = || format!("can't open input file `{}`", path.display());
    let file = File::open(path).map_err(RescueError::io(context()))?;
    let meta = file.metadata().map_err(RescueError::io(context()))?;
    if !meta.is_file() {
        return Err(RescueError::NotRegular(path.to_owned()));
    }
    Ok(file)
}

/// Create `path` for reading and writing.  Without `force` an existing file
/// is an error; with it the file is truncated.
pub fn open_outstream(path: &Path, force: bool) -> Result<File, RescueError> {
    let mut opts = OpenOptions::new();
    opts.read(true).write(true).create(true);
    if force {
        opts.truncate(true);
    } else {
        opts.create_new(true);
    }
    opts.open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::AlreadyExists {
            RescueError::OutputExists(path.to_owned())
        } else {
            RescueError::Io {
                context: format!("can't create output file `{}`", path.display()),
                source: e,
            }
        }
    })
}

/// Read until `buf` is full or EOF.  Returns the number of bytes read.
pub fn read_full<R: Read>(src: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut sz = 0;
    while sz < buf.len() {
        match src.read(&mut buf[sz..]) {
            Ok(0) => break,
            Ok(n) => sz += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(sz)
}

/// Copy exactly `size` bytes from `src` to `dst` at their current positions.
pub fn copy_bytes<R: Read, W: Write>(src: R, dst: &mut W, size: u64) -> io::Result<()> {
    let copied = io::copy(&mut src.take(size), dst)?;
    if copied != size {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "unexpected end of input file",
        ));
    }
    Ok(())
}

/// Default output name for merge and repair: `_fixed` inserted before a
/// `.lz` or `.tlz` suffix, else `_fixed.lz` appended.
pub fn insert_fixed(name: &Path) -> PathBuf {
    let name = name.to_string_lossy();
    let fixed = if name.len() > 4 && name.ends_with(".tlz") {
        format!("{}_fixed.tlz", &name[..name.len() - 4])
    } else if name.len() > 3 && name.ends_with(".lz") {
        format!("{}_fixed.lz", &name[..name.len() - 3])
    } else {
        format!("{name}_fixed.lz")
    };
    PathBuf::from(fixed)
}
