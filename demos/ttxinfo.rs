//! Dump a summary of the teletext service carried on one PID of a recording.

use clap::Parser;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::process::exit;
use teletext_io::output::NullSink;
use teletext_io::{Pipeline, PipelineOptions};

#[derive(Parser, Debug)]
#[command(name = "ttxinfo", about = "Summarise the teletext service in a TS recording")]
struct Args {
    /// Transport stream recording to inspect.
    input: PathBuf,

    /// PID of the teletext elementary stream.
    #[arg(long)]
    pid: u16,

    /// Also decode subtitle data units.
    #[arg(long)]
    include_subtitles: bool,
}

fn main() {
    pretty_env_logger::init();
    let args = Args::parse();

    let mut file = File::open(&args.input).expect("unable to open!");
    let mut pipeline = Pipeline::new(
        PipelineOptions::with_pid(args.pid).include_subtitles(args.include_subtitles),
    );
    let mut sink = NullSink::default();

    let mut chunk = [0_u8; 64 * 1024];
    loop {
        let length = file.read(&mut chunk).expect("IO error!");
        if length == 0 {
            break;
        }
        pipeline.push(&chunk[..length], &mut sink).expect("sink error!");
    }

    let stats = pipeline.stats();
    let service = match pipeline.finish(&mut sink) {
        Ok(service) => service,
        Err(error) => {
            eprintln!("{}", error);
            exit(1);
        }
    };

    println!(
        "packets: {} received, {} on PID {:#x}",
        stats.received, stats.matched, args.pid
    );
    if let Some(name) = service.status_display() {
        println!("status display: {}", name);
    }
    if let Some(nic) = service.network_identification_code() {
        println!("network id: {:04X}", nic);
    }
    println!(
        "initial page: {} subcode {}, {}",
        service.initial_page(),
        service.initial_subcode(),
        if service.multiplexed() {
            "multiplexed with video"
        } else {
            "full channel"
        }
    );

    for magazine in service.magazines().iter() {
        if magazine.carousels().is_empty() {
            continue;
        }
        let subpages: usize = magazine
            .carousels()
            .iter()
            .map(|carousel| carousel.pages().len())
            .sum();
        println!(
            "magazine {}: {} pages, {} subpages{}",
            magazine.number(),
            magazine.carousels().len(),
            subpages,
            if magazine.initial_top_seen() {
                ", TOP tables seen"
            } else {
                ""
            }
        );
        for carousel in magazine.carousels() {
            let page = &carousel.pages_by_subcode()[0];
            println!(
                "  P{}{} x{} {}",
                magazine.number(),
                carousel.number(),
                carousel.pages().len(),
                if page.subtitles() { "(subtitles)" } else { "" }
            );
        }
    }
}
