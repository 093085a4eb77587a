use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "flowtap",
    version,
    about = "TCP/IPv4 flow extraction from live or recorded Ethernet frames"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Capture frames from a network interface and print flow records
    Live(LiveArgs),
    /// Decode hex-encoded frames from a file or stdin
    Decode(DecodeArgs),
}

/// Arguments shared by both modes.
#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Output format [default: pretty]
    #[arg(long, default_value = "pretty")]
    pub format: OutputFormat,
}

/// Arguments specific to live capture.
#[derive(Args, Debug, Clone)]
pub struct LiveArgs {
    /// Network interface to capture on (e.g. eth0)
    pub interface: String,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Stop after this many flow records; 0 runs until interrupted [default: 0]
    #[arg(long, default_value_t = 0)]
    pub count: u64,

    /// Capture socket receive buffer size in bytes [default: 32768]
    #[arg(long, default_value_t = 32768, value_parser = validate_buffer)]
    pub buffer: u32,

    /// Do not install the kernel packet filter; classify every frame in userspace
    #[arg(long)]
    pub no_filter: bool,

    /// Enable promiscuous mode on the interface for the duration of the run
    #[arg(long)]
    pub promiscuous: bool,
}

/// Arguments specific to decode mode.
#[derive(Args, Debug, Clone)]
pub struct DecodeArgs {
    /// File of hex-encoded frames, one frame per line; '-' reads stdin
    #[arg(default_value = "-")]
    pub input: String,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Pretty,
    Tsv,
    Json,
}

fn validate_buffer(s: &str) -> Result<u32, String> {
    let val: u32 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid integer"))?;
    if val < 4096 {
        Err("buffer must be at least 4096 bytes".to_string())
    } else if val > 1_048_576 {
        Err("buffer must be at most 1048576 bytes".to_string())
    } else {
        Ok(val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(args)
    }

    fn live(args: &[&str]) -> LiveArgs {
        match parse(args).unwrap().command {
            Command::Live(a) => a,
            other => panic!("expected live subcommand, got {other:?}"),
        }
    }

    fn decode(args: &[&str]) -> DecodeArgs {
        match parse(args).unwrap().command {
            Command::Decode(a) => a,
            other => panic!("expected decode subcommand, got {other:?}"),
        }
    }

    // UT-4.1: A subcommand is required
    #[test]
    fn test_no_subcommand() {
        assert!(parse(&["flowtap"]).is_err());
    }

    // UT-4.2: Live requires an interface
    #[test]
    fn test_live_requires_interface() {
        assert!(parse(&["flowtap", "live"]).is_err());
    }

    // UT-4.3: Live defaults
    #[test]
    fn test_live_defaults() {
        let args = live(&["flowtap", "live", "eth0"]);
        assert_eq!(args.interface, "eth0");
        assert_eq!(args.output.format, OutputFormat::Pretty);
        assert_eq!(args.count, 0);
        assert_eq!(args.buffer, 32768);
        assert!(!args.no_filter);
        assert!(!args.promiscuous);
    }

    // UT-4.4: Live with JSON output
    #[test]
    fn test_live_format_json() {
        let args = live(&["flowtap", "live", "eth0", "--format", "json"]);
        assert_eq!(args.output.format, OutputFormat::Json);
    }

    // UT-4.5: Invalid format value
    #[test]
    fn test_invalid_format() {
        assert!(parse(&["flowtap", "live", "eth0", "--format", "xml"]).is_err());
    }

    // UT-4.6: Record count limit
    #[test]
    fn test_count_flag() {
        let args = live(&["flowtap", "live", "eth0", "--count", "10"]);
        assert_eq!(args.count, 10);
    }

    // UT-4.7: Buffer valid
    #[test]
    fn test_buffer_valid() {
        let args = live(&["flowtap", "live", "eth0", "--buffer", "65536"]);
        assert_eq!(args.buffer, 65536);
    }

    // UT-4.8: Buffer too small
    #[test]
    fn test_buffer_too_small() {
        assert!(parse(&["flowtap", "live", "eth0", "--buffer", "1024"]).is_err());
    }

    // UT-4.9: Buffer too large
    #[test]
    fn test_buffer_too_large() {
        assert!(parse(&["flowtap", "live", "eth0", "--buffer", "2000000"]).is_err());
    }

    // UT-4.10: Buffer not a number
    #[test]
    fn test_buffer_not_a_number() {
        assert!(parse(&["flowtap", "live", "eth0", "--buffer", "lots"]).is_err());
    }

    // UT-4.11: No-filter flag
    #[test]
    fn test_no_filter_flag() {
        let args = live(&["flowtap", "live", "eth0", "--no-filter"]);
        assert!(args.no_filter);
    }

    // UT-4.12: Promiscuous flag
    #[test]
    fn test_promiscuous_flag() {
        let args = live(&["flowtap", "live", "eth0", "--promiscuous"]);
        assert!(args.promiscuous);
    }

    // UT-4.13: Decode defaults to stdin
    #[test]
    fn test_decode_default_stdin() {
        let args = decode(&["flowtap", "decode"]);
        assert_eq!(args.input, "-");
        assert_eq!(args.output.format, OutputFormat::Pretty);
    }

    // UT-4.14: Decode with a file path
    #[test]
    fn test_decode_file() {
        let args = decode(&["flowtap", "decode", "frames.hex"]);
        assert_eq!(args.input, "frames.hex");
    }

    // UT-4.15: Decode with TSV output
    #[test]
    fn test_decode_format_tsv() {
        let args = decode(&["flowtap", "decode", "--format", "tsv"]);
        assert_eq!(args.output.format, OutputFormat::Tsv);
    }

    // UT-4.16: --count is live-only, not accepted on decode
    #[test]
    fn test_count_not_on_decode() {
        assert!(parse(&["flowtap", "decode", "--count", "5"]).is_err());
    }

    // UT-4.17: --buffer is live-only, not accepted on decode
    #[test]
    fn test_buffer_not_on_decode() {
        assert!(parse(&["flowtap", "decode", "--buffer", "65536"]).is_err());
    }
}
