use std::fs::File;
use std::io::{self, BufReader, Write};
#[cfg(target_os = "linux")]
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

#[cfg(target_os = "linux")]
use flowtap::capture::{check_capture_access, AfPacketCapture, FilterKind};
use flowtap::cli::{Cli, Command, DecodeArgs, LiveArgs};
use flowtap::error::FlowtapError;
use flowtap::output;
use flowtap::packet::{decode_frame, DecodeStats, Verdict};
use flowtap::replay;

/// Global shutdown flag, set by signal handlers.
#[cfg(target_os = "linux")]
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

#[cfg(target_os = "linux")]
extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

#[cfg(target_os = "linux")]
fn install_signal_handlers() {
    unsafe {
        libc::signal(
            libc::SIGTERM,
            signal_handler as *const () as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGINT,
            signal_handler as *const () as libc::sighandler_t,
        );
    }
}

/// Exit codes: 1 missing privileges, 2 capture device, 3 bad input, 4 anything else.
fn exit_code(err: &FlowtapError) -> i32 {
    match err {
        FlowtapError::InsufficientPermission(_) => 1,
        FlowtapError::CaptureDevice(_) => 2,
        FlowtapError::Input(_) | FlowtapError::FrameRecord { .. } => 3,
        _ => 4,
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(exit_code(&e));
    }
}

fn run(cli: Cli) -> Result<(), FlowtapError> {
    match cli.command {
        Command::Live(args) => run_live(&args),
        Command::Decode(args) => run_decode(&args),
    }
}

// ---------------------------------------------------------------------------
// Live capture
// ---------------------------------------------------------------------------

#[cfg(target_os = "linux")]
fn run_live(args: &LiveArgs) -> Result<(), FlowtapError> {
    // 0. Install signal handlers for graceful shutdown.
    install_signal_handlers();

    // 1. Check capture privileges before touching the interface.
    check_capture_access()?;

    // 2. Open the capture socket.
    let filter_kind = if args.no_filter {
        FilterKind::All
    } else {
        FilterKind::Ipv4Tcp
    };
    let mut cap = AfPacketCapture::new(
        &args.interface,
        args.buffer,
        filter_kind,
        args.promiscuous,
    )?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    output::write_preamble(args.output.format, &mut out)?;

    // 3. Read, decode, emit until a signal arrives (or --count is reached).
    let mut stats = DecodeStats::default();
    let mut timeout_count: u64 = 0;

    while !SHUTDOWN_REQUESTED.load(Ordering::Relaxed) {
        let outcome = match cap.read_frame()? {
            None => {
                // Read timeout with no data; loop back to the shutdown check.
                timeout_count += 1;
                continue;
            }
            Some(frame) => decode_frame(frame),
        };
        stats.record(&outcome);

        match outcome {
            Ok(Verdict::Flow(record)) => {
                output::write_record(&record, args.output.format, &mut out)?;
                out.flush().map_err(FlowtapError::Serialization)?;
                if args.count > 0 && stats.flows >= args.count {
                    break;
                }
            }
            Ok(Verdict::NotApplicable(reason)) => {
                log::debug!("skipped frame: {reason}");
            }
            Err(e) => {
                log::debug!("undecodable frame: {e}");
            }
        }
    }

    output::write_summary(&stats, args.output.format, &mut out)?;
    out.flush().map_err(FlowtapError::Serialization)?;

    // 4. Exit tally, with kernel socket counters when available.
    match cap.stats() {
        Ok(st) => log::info!(
            "capture {} exit: frames={}, flows={}, not_ipv4={}, fragments={}, not_tcp={}, \
             malformed={}, out_of_bounds={}, timeouts={}, kernel_recv={}, kernel_drop={}",
            cap.interface(),
            stats.frames,
            stats.flows,
            stats.not_ipv4,
            stats.fragments,
            stats.not_tcp,
            stats.malformed,
            stats.out_of_bounds,
            timeout_count,
            st.received,
            st.dropped
        ),
        Err(_) => log::info!(
            "capture {} exit: frames={}, flows={}, not_ipv4={}, fragments={}, not_tcp={}, \
             malformed={}, out_of_bounds={}, timeouts={}",
            cap.interface(),
            stats.frames,
            stats.flows,
            stats.not_ipv4,
            stats.fragments,
            stats.not_tcp,
            stats.malformed,
            stats.out_of_bounds,
            timeout_count
        ),
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn run_live(_args: &LiveArgs) -> Result<(), FlowtapError> {
    Err(FlowtapError::CaptureDevice(
        "live capture requires AF_PACKET sockets (Linux only)".to_string(),
    ))
}

// ---------------------------------------------------------------------------
// Decode mode
// ---------------------------------------------------------------------------

fn run_decode(args: &DecodeArgs) -> Result<(), FlowtapError> {
    let frames = if args.input == "-" {
        replay::read_hex_frames(io::stdin().lock())?
    } else {
        let file = File::open(&args.input).map_err(FlowtapError::Input)?;
        replay::read_hex_frames(BufReader::new(file))?
    };
    log::info!("decoding {} recorded frame(s)", frames.len());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    output::write_preamble(args.output.format, &mut out)?;

    let mut stats = DecodeStats::default();
    for frame in &frames {
        let outcome = decode_frame(frame);
        stats.record(&outcome);
        match outcome {
            Ok(Verdict::Flow(record)) => {
                output::write_record(&record, args.output.format, &mut out)?;
            }
            Ok(Verdict::NotApplicable(reason)) => {
                log::debug!("skipped frame: {reason}");
            }
            Err(e) => {
                log::debug!("undecodable frame: {e}");
            }
        }
    }

    output::write_summary(&stats, args.output.format, &mut out)?;
    out.flush().map_err(FlowtapError::Serialization)
}
