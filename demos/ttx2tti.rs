//! Recover a teletext service from a transport stream recording and write it out as
//! TTI page files, raw T42 lines, or a line stream on standard output.

use clap::{Parser, ValueEnum};
use log::{info, warn};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::process::exit;
use teletext_io::output::{Output, T42Sink, TtiSink};
use teletext_io::{Pipeline, PipelineError, PipelineOptions, ServiceScanner, StreamError};

const CHUNK_SIZE: usize = 64 * 1024;

const EXIT_INVALID_ARGS: i32 = 1;
const EXIT_INVALID_SID: i32 = 2;
const EXIT_INVALID_PID: i32 = 3;
const EXIT_BAD_INPUT: i32 = 4;
const EXIT_UNSPECIFIED: i32 = 5;
const EXIT_SID_NOT_FOUND: i32 = 6;
const EXIT_TELETEXT_NOT_FOUND: i32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// TTI page files, one per page number.
    Tti,
    /// Raw 40-byte lines to a file.
    T42,
    /// Raw 40-byte lines to standard output.
    Stdout,
}

#[derive(Parser, Debug)]
#[command(name = "ttx2tti", about = "Recover teletext pages from a TS recording")]
struct Args {
    /// Transport stream recording to decode.
    input: PathBuf,

    /// PID of the teletext elementary stream.
    #[arg(long, conflicts_with = "sid")]
    pid: Option<u16>,

    /// DVB service identifier; the teletext PID is found via PAT and PMT.
    #[arg(long)]
    sid: Option<u16>,

    /// Seconds between subpages when the output is retransmitted.
    #[arg(long, default_value_t = 8)]
    cycle: u32,

    /// Output directory (tti) or file (t42).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Also decode subtitle data units.
    #[arg(long)]
    include_subtitles: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Tti)]
    format: Format,

    /// Rewind and replay the input forever; streaming formats only.
    #[arg(long = "loop")]
    loop_input: bool,

    /// Pad each PES packet's lines to a full 16-line field.
    #[arg(long)]
    pad_fields: bool,
}

fn main() {
    pretty_env_logger::init();
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(error) => {
            let code = if error.use_stderr() { EXIT_INVALID_ARGS } else { 0 };
            let _ = error.print();
            exit(code);
        }
    };
    exit(run(args));
}

fn run(args: Args) -> i32 {
    if args.cycle < 1 {
        eprintln!("cycle time must be at least one second");
        return EXIT_INVALID_ARGS;
    }

    let mut file = match File::open(&args.input) {
        Ok(file) => file,
        Err(error) => {
            eprintln!("unable to open {}: {}", args.input.display(), error);
            return EXIT_BAD_INPUT;
        }
    };

    let pid = match resolve_pid(&args, &mut file) {
        Ok(pid) => pid,
        Err(code) => return code,
    };

    let mut sink = match make_sink(&args) {
        Ok(sink) => sink,
        Err(code) => return code,
    };

    let mut looping = args.loop_input;
    if looping && args.format == Format::Tti {
        warn!("loop mode is not meaningful for page file output; ignoring");
        looping = false;
    }

    let options = PipelineOptions::with_pid(pid).include_subtitles(args.include_subtitles);
    loop {
        let mut pipeline = Pipeline::new(options);
        let mut chunk = [0_u8; CHUNK_SIZE];
        loop {
            let length = match file.read(&mut chunk) {
                Ok(length) => length,
                Err(error) => {
                    eprintln!("read error: {}", error);
                    return EXIT_BAD_INPUT;
                }
            };
            if length == 0 {
                break;
            }
            if let Err(error) = pipeline.push(&chunk[..length], &mut sink) {
                eprintln!("output error: {}", error);
                return EXIT_UNSPECIFIED;
            }
        }

        if !looping {
            return match pipeline.finish(&mut sink) {
                Ok(service) => {
                    info!(
                        "decoded {} pages, initial page {}",
                        service.page_count(),
                        service.initial_page()
                    );
                    0
                }
                Err(PipelineError::Stream(StreamError::NotTransportStream)) => {
                    eprintln!("{} is not a transport stream", args.input.display());
                    EXIT_BAD_INPUT
                }
                Err(PipelineError::Stream(StreamError::PidNotMatched(pid))) => {
                    eprintln!("no teletext packets on PID {:#x}", pid);
                    EXIT_INVALID_PID
                }
                Err(error) => {
                    eprintln!("{}", error);
                    EXIT_UNSPECIFIED
                }
            };
        }

        let stats = pipeline.stats();
        if stats.received == 0 {
            eprintln!("{} is not a transport stream", args.input.display());
            return EXIT_BAD_INPUT;
        }
        if file.seek(SeekFrom::Start(0)).is_err() {
            eprintln!("unable to rewind {}", args.input.display());
            return EXIT_BAD_INPUT;
        }
    }
}

/// Validates the PID argument, or resolves the SID through a pre-pass over the file.
fn resolve_pid(args: &Args, file: &mut File) -> Result<u16, i32> {
    if let Some(pid) = args.pid {
        if !(1..0x1fff).contains(&pid) {
            eprintln!("PID must be between 1 and 8190");
            return Err(EXIT_INVALID_PID);
        }
        return Ok(pid);
    }

    let sid = match args.sid {
        Some(sid) => sid,
        None => {
            eprintln!("either --pid or --sid is required");
            return Err(EXIT_INVALID_ARGS);
        }
    };
    if sid == 0 {
        eprintln!("service identifier 0 is reserved");
        return Err(EXIT_INVALID_SID);
    }

    let mut scanner = ServiceScanner::new(sid);
    let mut chunk = [0_u8; CHUNK_SIZE];
    let found = loop {
        let length = match file.read(&mut chunk) {
            Ok(length) => length,
            Err(error) => {
                eprintln!("read error: {}", error);
                return Err(EXIT_BAD_INPUT);
            }
        };
        if length == 0 {
            break None;
        }
        if let Some(pid) = scanner.push(&chunk[..length]) {
            break Some(pid);
        }
    };

    if file.seek(SeekFrom::Start(0)).is_err() {
        eprintln!("unable to rewind {}", args.input.display());
        return Err(EXIT_BAD_INPUT);
    }

    match found.map(Ok).unwrap_or_else(|| scanner.result()) {
        Ok(pid) => {
            info!("service {} carries teletext on PID {:#x}", sid, pid);
            Ok(pid)
        }
        Err(StreamError::SidNotFound(_)) => {
            eprintln!("service {} not found in the PAT", sid);
            Err(EXIT_SID_NOT_FOUND)
        }
        Err(StreamError::TeletextPidNotFound(_)) => {
            eprintln!("service {} has no teletext stream", sid);
            Err(EXIT_TELETEXT_NOT_FOUND)
        }
        Err(error) => {
            eprintln!("{}", error);
            Err(EXIT_UNSPECIFIED)
        }
    }
}

fn make_sink(args: &Args) -> Result<Output, i32> {
    match args.format {
        Format::Tti => {
            let directory = args.output.clone().unwrap_or_else(|| PathBuf::from("."));
            if let Err(error) = fs::create_dir_all(&directory) {
                eprintln!("unable to create {}: {}", directory.display(), error);
                return Err(EXIT_UNSPECIFIED);
            }
            Ok(Output::Tti(TtiSink::new(directory, args.cycle)))
        }
        Format::T42 => {
            let path = match args.output.as_ref() {
                Some(path) => path,
                None => {
                    eprintln!("--output is required for t42 files");
                    return Err(EXIT_INVALID_ARGS);
                }
            };
            match File::create(path) {
                Ok(file) => Ok(Output::T42(T42Sink::new(file, args.pad_fields))),
                Err(error) => {
                    eprintln!("unable to create {}: {}", path.display(), error);
                    return Err(EXIT_UNSPECIFIED);
                }
            }
        }
        Format::Stdout => Ok(Output::StdOut(T42Sink::new(
            std::io::stdout(),
            args.pad_fields,
        ))),
    }
}
