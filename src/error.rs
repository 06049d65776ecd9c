use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Every failure mode of a recovery run, mapped onto the process exit codes:
/// 1 for environmental problems, 2 for corrupt or unrecoverable input,
/// 3 for an internal consistency error.
#[derive(Error, Debug)]
pub enum RescueError {
    #[error("{context}: {source}")]
    Io { context: String, source: io::Error },
    #[error("input file `{0}` is not a regular file")]
    NotRegular(PathBuf),
    #[error("output file `{0}` already exists; use `--force` to overwrite it")]
    OutputExists(PathBuf),
    #[error("sizes of input files are different")]
    SizeMismatch,
    #[error("input files are identical; recovery is not possible")]
    IdenticalCopies,
    #[error("input files have the same byte damaged; try repairing one of them")]
    IdenticalDamage,
    #[error("input files are too damaged; recovery is not possible")]
    TooDamaged,
    #[error("too many members in file")]
    TooManyMembers,
    #[error("input file is too short")]
    TooShort,
    #[error("bad magic number (file not in lzip format)")]
    BadMagic,
    #[error("version 0 member format can't be recovered")]
    Version0,
    #[error("version {0} member format not supported")]
    UnsupportedVersion(u8),
    #[error("invalid dictionary size in member header")]
    BadDictionarySize,
    #[error("member size in input file trailer is corrupt")]
    BadTrailerSize,
    #[error("input file has more than 1 member; split it first")]
    MultiMember,
    #[error("some error areas overlap; can't recover input file")]
    MergeExhausted,
    #[error("error is larger than 1 byte; can't repair input file")]
    RepairExhausted,
    #[error("can't repair error in input file")]
    HeaderDamaged,
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl RescueError {
    /// Wrap an I/O error with a caller-supplied context message.
    pub fn io(context: impl Into<String>) -> impl FnOnce(io::Error) -> RescueError {
        let context = context.into();
        move |source| RescueError::Io { context, source }
    }

    pub fn exit_code(&self) -> i32 {
        use RescueError::*;
        match self {
            Io { .. } | NotRegular(_) | OutputExists(_) | SizeMismatch
            | IdenticalCopies | IdenticalDamage | TooDamaged | TooManyMembers => 1,
            TooShort | BadMagic | Version0 | UnsupportedVersion(_)
            | BadDictionarySize | BadTrailerSize | MultiMember
            | MergeExhausted | RepairExhausted | HeaderDamaged => 2,
            Internal(_) => 3,
        }
    }
}
