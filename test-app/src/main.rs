// lanio test application -- CLI tool for talking to LAN instruments over
// their raw SCPI socket.
//
// Usage:
//   lanio-cli --host 192.168.1.20 idn
//   lanio-cli --host 192.168.1.20 query "MEAS:VOLT:DC?"
//   lanio-cli --host 192.168.1.20 write "*RST"
//   lanio-cli --host 192.168.1.20 --timeout-ms 10000 block 1 ":WAV:DATA?"
//   lanio-cli --host 192.168.1.20 --clear-port 5000 clear
//   lanio-cli --host 192.168.1.20 clear-port "SYST:COMM:TCPIP:CONT?"
//   lanio-cli --host 192.168.1.20 shell
//
// Logging is controlled with RUST_LOG (default: lanio=info).

use std::io::{self, BufRead, Write};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use lanio::{ClientBuilder, InstrumentClient};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// lanio test application -- talks to an instrument from the command line.
#[derive(Parser)]
#[command(name = "lanio-cli", version, about)]
struct Cli {
    /// Instrument host name or IP address (e.g. 192.168.1.20).
    #[arg(long)]
    host: String,

    /// Instrument SCPI socket port.
    #[arg(long, default_value_t = 5025)]
    port: u16,

    /// Connect timeout in milliseconds (0 = single attempt, no waiting).
    #[arg(long, default_value_t = 5000)]
    connect_timeout_ms: u64,

    /// Read and write timeout in milliseconds (0 = single attempt).
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Newline token ending commands and responses. Accepts \n, \r and \t
    /// escapes.
    #[arg(long, default_value = "\\n", value_parser = parse_newline)]
    newline: String,

    /// Port that triggers a device clear on the instrument.
    #[arg(long, default_value_t = 5000)]
    clear_port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Query the instrument identification (*IDN?).
    Idn,

    /// Send a query and print the response.
    Query {
        /// Query text, e.g. "MEAS:VOLT:DC?".
        text: String,
    },

    /// Send a command without reading a response.
    Write {
        /// Command text, e.g. "*RST".
        text: String,

        /// Do not append the newline token.
        #[arg(long)]
        no_newline: bool,
    },

    /// Read one response line (or a fixed number of raw bytes).
    Read {
        /// Read exactly this many raw bytes instead of a line.
        #[arg(long)]
        bytes: Option<usize>,

        /// Keep the newline token at the end of the line.
        #[arg(long)]
        keep_newline: bool,
    },

    /// Send a query and read definite-length binary blocks.
    Block {
        /// Number of blocks to read.
        count: usize,

        /// Query that makes the instrument send the blocks.
        query: String,
    },

    /// Send a device clear over the clear port.
    Clear,

    /// Ask the instrument for its device-clear port, then clear through it.
    ClearPort {
        /// Query whose response is the port number.
        query: String,

        /// Only report the port; do not send the clear.
        #[arg(long)]
        no_clear: bool,
    },

    /// Interactive session: lines ending in '?' are queries, others are
    /// written as commands. Type "clear" for a device clear, "quit" to exit.
    Shell,
}

/// Turn `\n`, `\r` and `\t` escapes typed on a shell into real bytes.
fn parse_newline(s: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => return Err(format!("unsupported escape: \\{other}")),
            None => return Err("dangling backslash".into()),
        }
    }
    if out.is_empty() {
        return Err("newline token must not be empty".into());
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Client construction and error reporting
// ---------------------------------------------------------------------------

async fn connect(cli: &Cli) -> Result<InstrumentClient> {
    let io_timeout = Duration::from_millis(cli.timeout_ms);
    ClientBuilder::new()
        .connect_timeout(Duration::from_millis(cli.connect_timeout_ms))
        .io_timeout(io_timeout)
        .newline(&cli.newline)
        .device_clear_port(cli.clear_port)
        .connect(&cli.host, cli.port)
        .await
        .with_context(|| format!("connecting to {}:{}", cli.host, cli.port))
}

/// Tag an error with the domain, code and kind of the underlying lanio
/// error, if there is one.
fn annotate(err: anyhow::Error) -> anyhow::Error {
    let tag = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<lanio::Error>())
        .map(|e| format!("{} error {} ({:?})", e.domain(), e.code(), e.kind()));
    match tag {
        Some(tag) => err.context(tag),
        None => err,
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_query(client: &mut InstrumentClient, text: &str) -> Result<()> {
    let start = Instant::now();
    let response = client.query(text).await?;
    tracing::debug!(elapsed_ms = start.elapsed().as_millis(), "query complete");
    println!("{response}");
    Ok(())
}

async fn cmd_write(client: &mut InstrumentClient, text: &str, no_newline: bool) -> Result<()> {
    client.print(text, !no_newline).await?;
    println!("sent {text:?}");
    Ok(())
}

async fn cmd_read(
    client: &mut InstrumentClient,
    bytes: Option<usize>,
    keep_newline: bool,
) -> Result<()> {
    let Some(len) = bytes else {
        let line = client.scan(!keep_newline).await?;
        println!("{line}");
        return Ok(());
    };

    let mut buf = vec![0u8; len];
    match client.scan_buffer(&mut buf).await {
        Ok(n) => {
            print_hex(&buf[..n]);
            Ok(())
        }
        Err(e) => {
            let got = e.bytes_transferred().unwrap_or(0);
            if got > 0 {
                eprintln!("partial read: {got} of {len} bytes");
                print_hex(&buf[..got]);
            }
            Err(e.into())
        }
    }
}

async fn cmd_block(client: &mut InstrumentClient, count: usize, query: &str) -> Result<()> {
    client.print(query, true).await?;

    let start = Instant::now();
    let scan = client.scan_definite_blocks(count).await;
    let elapsed = start.elapsed();

    for (i, size) in scan.sizes().iter().enumerate() {
        println!("block {i}: {size} bytes");
    }
    let total: usize = scan.sizes().iter().sum();
    println!(
        "{} of {count} blocks, {total} bytes in {:.3} s",
        scan.blocks_read(),
        elapsed.as_secs_f64()
    );

    scan.into_result()?;
    Ok(())
}

async fn cmd_clear(client: &mut InstrumentClient) -> Result<()> {
    client.device_clear().await?;
    println!(
        "device clear sent on port {}",
        client.options().device_clear_port
    );
    Ok(())
}

async fn cmd_clear_port(client: &mut InstrumentClient, query: &str, no_clear: bool) -> Result<()> {
    let port = client.query_device_clear_port(query).await?;
    println!("device clear port: {port}");
    if !no_clear {
        cmd_clear(client).await?;
    }
    Ok(())
}

async fn cmd_shell(client: &mut InstrumentClient) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("lanio> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();

        let result = match line {
            "" => continue,
            "quit" | "exit" => break,
            "clear" => cmd_clear(client).await,
            text if text.ends_with('?') => cmd_query(client, text).await,
            text => client.print(text, true).await.map_err(Into::into),
        };

        // Errors end the command, not the session, unless the link is gone.
        if let Err(e) = result {
            eprintln!("{:#}", annotate(e));
            if !client.is_connected() {
                bail!("connection to instrument lost");
            }
        }
    }

    Ok(())
}

fn print_hex(data: &[u8]) {
    for (i, chunk) in data.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02X}")).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
            .collect();
        println!("{:08X}  {:<47}  {ascii}", i * 16, hex.join(" "));
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

async fn run(cli: Cli) -> Result<()> {
    let mut client = connect(&cli).await?;

    let result = match &cli.command {
        Command::Idn => cmd_query(&mut client, "*IDN?").await,
        Command::Query { text } => cmd_query(&mut client, text).await,
        Command::Write { text, no_newline } => cmd_write(&mut client, text, *no_newline).await,
        Command::Read {
            bytes,
            keep_newline,
        } => cmd_read(&mut client, *bytes, *keep_newline).await,
        Command::Block { count, query } => cmd_block(&mut client, *count, query).await,
        Command::Clear => cmd_clear(&mut client).await,
        Command::ClearPort { query, no_clear } => {
            cmd_clear_port(&mut client, query, *no_clear).await
        }
        Command::Shell => cmd_shell(&mut client).await,
    };

    client.close().await.ok();
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lanio=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    run(cli).await.map_err(annotate)
}
