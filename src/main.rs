use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser};

use lzrescue::error::RescueError;
use lzrescue::fileio::insert_fixed;
use lzrescue::merge::merge_files;
use lzrescue::repair::repair_file;
use lzrescue::split::split_file;
use lzrescue::{set_verbosity, verbosity};

#[derive(Parser)]
#[command(name = "lzrescue")]
#[command(version, about = "Data recovery tool for lzip compressed files", long_about = None)]
struct Cli {
    /// Overwrite existing output files
    #[arg(short, long)]
    force: bool,
    /// Correct errors in file using several copies
    #[arg(short, long)]
    merge: bool,
    /// Place the output into <FILE>
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
    /// Suppress all messages
    #[arg(short, long)]
    quiet: bool,
    /// Try to repair a small error in file
    #[arg(short = 'R', long)]
    repair: bool,
    /// Split a multimember file in single-member files
    #[arg(short, long)]
    split: bool,
    /// Be verbose (a 2nd -v gives more)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Files to operate on
    files: Vec<PathBuf>,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // help and version exit 0; anything else is a usage problem
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };

    set_verbosity(if cli.quiet { -1 } else { i32::from(cli.verbose.min(4)) });

    if let Err(e) = run(&cli) {
        if verbosity() >= 0 {
            eprintln!("lzrescue: {e}");
        }
        process::exit(e.exit_code());
    }
}

fn run(cli: &Cli) -> Result<(), RescueError> {
    let modes = u32::from(cli.merge) + u32::from(cli.repair) + u32::from(cli.split);
    if modes != 1 {
        usage_error("you must specify exactly one operation to be performed on file");
    }

    if cli.merge {
        if cli.files.len() < 2 {
            usage_error("you must specify at least 2 files");
        }
        let output = cli
            .output
            .clone()
            .unwrap_or_else(|| insert_fixed(&cli.files[0]));
        return merge_files(&cli.files, &output, cli.force);
    }

    if cli.files.len() != 1 {
        usage_error("you must specify exactly 1 file");
    }
    let input = &cli.files[0];

    if cli.repair {
        let output = cli.output.clone().unwrap_or_else(|| insert_fixed(input));
        repair_file(input, &output, cli.force)
    } else {
        let suffix = match &cli.output {
            Some(path) => path.to_string_lossy().into_owned(),
            None => input.to_string_lossy().into_owned(),
        };
        split_file(input, &suffix, cli.force)
    }
}

fn usage_error(msg: &str) -> ! {
    if verbosity() >= 0 {
        eprintln!("lzrescue: {msg}");
        eprintln!("Try `lzrescue --help` for more information.");
    }
    process::exit(1);
}
