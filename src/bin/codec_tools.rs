//! Thin CLI collaborator around the codec core (spec §6 "CLI surface": "not
//! part of the core... exposes no environment variables and persists no
//! state"). Reads a JSON-encoded schema tree and either a raw payload file
//! (`decode`) or a JSON input mapping (`encode`), mirroring the decode/
//! encode subcommand shape `idb-tools` uses for its dump operations.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use telemetry_codec::schema::Schema;

/// Decode or encode a telemetry payload against a schema file.
#[derive(Clone, Debug, Parser)]
struct Cli {
    /// Path to a JSON-serialized schema tree.
    #[arg(short, long)]
    schema: PathBuf,
    /// LoRaWAN fPort to select an alternate field sequence, if the schema
    /// declares a port table.
    #[arg(short, long)]
    port: Option<u32>,
    #[command(subcommand)]
    operation: Operation,
}

#[derive(Clone, Debug, Subcommand)]
enum Operation {
    /// Decode a raw binary payload file and print the resulting mapping as JSON.
    Decode {
        /// Path to the raw payload bytes.
        payload: PathBuf,
    },
    /// Encode a JSON input mapping file and print the resulting bytes as hex.
    Encode {
        /// Path to a JSON file holding the named field values to encode.
        input: PathBuf,
    },
}

fn load_schema(path: &PathBuf) -> Result<Schema> {
    let file = File::open(path).with_context(|| format!("opening schema file {path:?}"))?;
    serde_json::from_reader(BufReader::new(file)).context("parsing schema JSON")
}

fn run_decode(cli: &Cli, payload: &PathBuf) -> Result<()> {
    let schema = load_schema(&cli.schema)?;
    let bytes = std::fs::read(payload).with_context(|| format!("reading payload {payload:?}"))?;
    let value = match cli.port {
        Some(port) => telemetry_codec::decode_with_port(&schema, &bytes, port)?,
        None => telemetry_codec::decode(&schema, &bytes)?,
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn run_encode(cli: &Cli, input: &PathBuf) -> Result<()> {
    let schema = load_schema(&cli.schema)?;
    let file = File::open(input).with_context(|| format!("opening input file {input:?}"))?;
    let value: telemetry_codec::Value = serde_json::from_reader(BufReader::new(file))
        .context("parsing input JSON")?;
    let bytes = match cli.port {
        Some(port) => telemetry_codec::encode_with_port(&schema, &value, port)?,
        None => telemetry_codec::encode(&schema, &value)?,
    };
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    let mut stdout = std::io::stdout();
    writeln!(stdout, "{hex}")?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match &cli.operation {
        Operation::Decode { payload } => run_decode(&cli, payload),
        Operation::Encode { input } => run_encode(&cli, input),
    }
}
