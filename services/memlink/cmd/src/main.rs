//! Memlink probe binary.
//!
//! Connects to a game memory backend, performs one read or write and prints
//! the result as hex. Useful for checking that a console companion is
//! reachable and for poking at addresses while developing a tracker.

use anyhow::{bail, Context};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use memlink_backend::{read_game_id, GameMemory, NetworkClient};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::{BackendKind, MemlinkConfig};
use logging::MemlinkLogFormatter;

/// Read and write game memory through a memlink backend
#[derive(Parser, Debug)]
#[command(name = "memlink", version, about = "Game memory probe")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Companion host (overrides config and MEMLINK_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Companion port
    #[arg(long)]
    port: Option<u16>,

    /// Backend: nintendont or emulator
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Flush and receive timeout, e.g. 500ms
    #[arg(long)]
    timeout: Option<humantime::Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read LEN bytes at ADDR
    Read {
        #[arg(value_parser = parse_u32)]
        address: u32,
        #[arg(value_parser = parse_usize)]
        len: usize,
    },
    /// Read LEN bytes at *PTR + OFF
    ReadPointer {
        #[arg(value_parser = parse_u32)]
        pointer: u32,
        #[arg(value_parser = parse_u16)]
        offset: u16,
        #[arg(value_parser = parse_usize)]
        len: usize,
    },
    /// Write hex-encoded DATA at ADDR
    Write {
        #[arg(value_parser = parse_u32)]
        address: u32,
        #[arg(value_parser = parse_hex_bytes)]
        data: Bytes,
    },
    /// Print the disc ID of the running game
    GameId,
}

fn parse_number(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn parse_u32(s: &str) -> Result<u32, String> {
    u32::try_from(parse_number(s)?).map_err(|_| format!("'{}' does not fit in 32 bits", s))
}

fn parse_u16(s: &str) -> Result<u16, String> {
    u16::try_from(parse_number(s)?).map_err(|_| format!("'{}' does not fit in 16 bits", s))
}

fn parse_usize(s: &str) -> Result<usize, String> {
    usize::try_from(parse_number(s)?).map_err(|_| format!("'{}' is too large", s))
}

fn parse_hex_bytes(s: &str) -> Result<Bytes, String> {
    let digits: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(format!("hex data '{}' has an odd number of digits", s));
    }

    digits
        .chunks(2)
        .map(|pair| {
            let byte: String = pair.iter().collect();
            u8::from_str_radix(&byte, 16).map_err(|_| format!("invalid hex byte '{}'", byte))
        })
        .collect::<Result<Vec<u8>, String>>()
        .map(Bytes::from)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

async fn run(memory: &dyn GameMemory, command: Command) -> anyhow::Result<String> {
    let output = match command {
        Command::Read { address, len } => to_hex(&memory.read_address(address, len).await?),
        Command::ReadPointer {
            pointer,
            offset,
            len,
        } => match memory.read_pointer(pointer, offset, len).await? {
            Some(bytes) => to_hex(&bytes),
            None => "absent".to_string(),
        },
        Command::Write { address, data } => {
            let len = data.len();
            memory.write_address(address, data).await?;
            format!("wrote {} bytes", len)
        }
        Command::GameId => read_game_id(memory).await?,
    };
    Ok(output)
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("warn")
        .add_directive(format!("memlink={}", args.log_level).parse()?)
        .add_directive(format!("memlink_wire={}", args.log_level).parse()?)
        .add_directive(format!("memlink_session={}", args.log_level).parse()?)
        .add_directive(format!("memlink_backend={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .event_format(MemlinkLogFormatter::new("memlink".to_string()))
        .init();

    info!("Starting memlink probe v{}", env!("CARGO_PKG_VERSION"));

    let mut config = MemlinkConfig::load_from_file(&args.config)?;
    if let Some(host) = args.host {
        config.host = Some(host);
    }
    if let Some(port) = args.port {
        config.remote.port = port;
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(timeout) = args.timeout {
        config.set_timeout(timeout.into());
    }

    if config.backend == BackendKind::Emulator {
        bail!(
            "the emulator backend needs an emulator hook library, which this build does not \
             include; use --backend nintendont"
        );
    }

    let host = config
        .host
        .clone()
        .context("no companion host configured; pass --host or set MEMLINK_HOST")?;

    let client = NetworkClient::new(config.remote.clone());
    client.set_address(Some(host.clone())).await;
    client
        .connect()
        .await
        .with_context(|| format!("could not connect to {}:{}", host, config.remote.port))?;

    let result = run(&client, args.command).await;

    debug!("Session statistics: {:?}", client.stats().await);
    client.disconnect().await;

    println!("{}", result?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use memlink_backend::{EmulatorClient, MemoryImage};

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_u32("0x80000000"), Ok(0x8000_0000));
        assert_eq!(parse_u32("128"), Ok(128));
        assert!(parse_u32("0x100000000").is_err());
        assert_eq!(parse_u16("0X10"), Ok(16));
        assert!(parse_u16("70000").is_err());
        assert!(parse_usize("ten").is_err());
    }

    #[test]
    fn test_parse_hex_bytes() {
        assert_eq!(
            parse_hex_bytes("deadBEEF"),
            Ok(Bytes::from_static(&[0xDE, 0xAD, 0xBE, 0xEF]))
        );
        assert_eq!(parse_hex_bytes("01 02"), Ok(Bytes::from_static(&[1, 2])));
        assert_eq!(parse_hex_bytes(""), Ok(Bytes::new()));
        assert!(parse_hex_bytes("abc").is_err());
        assert!(parse_hex_bytes("zz").is_err());
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(to_hex(&[0x00, 0x0f, 0xff]), "000fff");
        assert_eq!(to_hex(&[]), "");
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "memlink",
            "--host",
            "10.0.0.2",
            "--timeout",
            "500ms",
            "read-pointer",
            "0x80001000",
            "4",
            "16",
        ])
        .unwrap();
        assert_eq!(args.host.as_deref(), Some("10.0.0.2"));
        assert_eq!(
            std::time::Duration::from(args.timeout.unwrap()),
            std::time::Duration::from_millis(500)
        );
        assert!(matches!(
            args.command,
            Command::ReadPointer {
                pointer: 0x8000_1000,
                offset: 4,
                len: 16
            }
        ));

        let args =
            Args::try_parse_from(["memlink", "--backend", "emulator", "game-id"]).unwrap();
        assert_eq!(args.backend, Some(BackendKind::Emulator));
    }

    #[tokio::test]
    async fn test_run_against_memory_image() {
        let mut image = MemoryImage::new(0x100);
        image.poke(0x8000_0000, b"GZ2E01");
        let memory = EmulatorClient::new(image);
        memory.connect().await.unwrap();

        assert_eq!(run(&memory, Command::GameId).await.unwrap(), "GZ2E01");
        let write = Command::Write {
            address: 0x8000_0010,
            data: Bytes::from_static(&[0xAB]),
        };
        assert_eq!(run(&memory, write).await.unwrap(), "wrote 1 bytes");
        let read = Command::Read {
            address: 0x8000_0010,
            len: 1,
        };
        assert_eq!(run(&memory, read).await.unwrap(), "ab");
        let read_pointer = Command::ReadPointer {
            pointer: 0x8000_0020,
            offset: 0,
            len: 1,
        };
        assert_eq!(run(&memory, read_pointer).await.unwrap(), "absent");
    }
}
