//! KSON command-line tool
//!
//! Converts between plain JSON and KSON, and infers schemas from sample
//! documents. The engine does all the work; this layer only maps verbs,
//! files, and exit codes onto it.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use kson::{find_top_schema, Kson, KsonConfig, OutputFormat, Schema};

#[derive(Parser)]
#[command(name = "kson")]
#[command(version, about = "Convert between JSON and KSON")]
struct Cli {
    /// Path to a config file (defaults to kson.toml if present)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct IoArgs {
    /// Input file (defaults to stdin)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Indent output
    #[arg(short, long)]
    pretty: bool,
}

#[derive(Args)]
struct ConvertArgs {
    /// Schema batch files to load (KSON or JSON)
    schemas: Vec<PathBuf>,

    #[command(flatten)]
    io: IoArgs,

    /// Schema id for the input (required if the schema files are
    /// ambiguous about the top-level schema)
    #[arg(short = 's', long)]
    schema_id: Option<String>,

    /// Schema id for the output (defaults to the input schema)
    #[arg(long)]
    out_schema_id: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Infer schemas from a JSON document
    Introspect {
        #[command(flatten)]
        io: IoArgs,

        /// Id prefix for the generated schemas
        #[arg(short = 's', long)]
        schema_id: Option<String>,

        /// Write the schema batch as plain JSON instead of KSON
        #[arg(short, long)]
        json: bool,
    },

    /// Encode plain JSON to KSON
    J2k(ConvertArgs),

    /// Decode KSON to plain JSON
    K2j(ConvertArgs),

    /// Re-encode KSON against another schema
    K2k(ConvertArgs),

    /// Reformat plain JSON
    J2j {
        #[command(flatten)]
        io: IoArgs,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = KsonConfig::load_from(cli.config.as_deref())?;

    let mut kson = Kson::new();
    for path in &config.schemas.preload {
        kson.load_schemas_file(path)
            .with_context(|| format!("failed to preload schemas from {}", path.display()))?;
    }

    match cli.command {
        Commands::Introspect {
            io,
            schema_id,
            json,
        } => {
            let text = read_input(&io)?;
            let prefix = schema_id.or_else(|| config.inference.id_prefix.clone());
            let (_, schemas) = kson.infer_schemas_str(&text, prefix.as_deref())?;

            let pretty = io.pretty || config.output.format == OutputFormat::Pretty;
            let out = if json {
                serialize_json(&serde_json::to_value(&schemas)?, pretty)?
            } else {
                let batch = serde_json::to_value(&schemas)?;
                encode(&kson, &batch, "[]schema", pretty)?
            };
            write_output(&io, &out)
        }

        Commands::J2k(args) => {
            let (_, out_id) = resolve_schemas(&mut kson, &args)?;
            let text = read_input(&args.io)?;
            let data: Value = serde_json::from_str(&text).context("input is not valid JSON")?;
            let pretty = args.io.pretty || config.output.format == OutputFormat::Pretty;
            let out = encode(&kson, &data, &out_id, pretty)?;
            write_output(&args.io, &out)
        }

        Commands::K2j(args) => {
            let (in_id, _) = resolve_schemas(&mut kson, &args)?;
            let text = read_input(&args.io)?;
            let data = kson.decode(&text, Some(&in_id))?;
            let out = serialize_json(&data, args.io.pretty)?;
            write_output(&args.io, &out)
        }

        Commands::K2k(args) => {
            let (in_id, out_id) = resolve_schemas(&mut kson, &args)?;
            let text = read_input(&args.io)?;
            let data = kson.decode(&text, Some(&in_id))?;
            let pretty = args.io.pretty || config.output.format == OutputFormat::Pretty;
            let out = encode(&kson, &data, &out_id, pretty)?;
            write_output(&args.io, &out)
        }

        Commands::J2j { io } => {
            let text = read_input(&io)?;
            let data: Value = serde_json::from_str(&text).context("input is not valid JSON")?;
            let out = serialize_json(&data, io.pretty)?;
            write_output(&io, &out)
        }
    }
}

/// Load the schema files and settle the input/output schema ids: an
/// explicit --schema-id wins, otherwise the one loaded schema that no
/// other loaded schema references.
fn resolve_schemas(kson: &mut Kson, args: &ConvertArgs) -> anyhow::Result<(String, String)> {
    let mut loaded: Vec<Schema> = Vec::new();
    for path in &args.schemas {
        let batch = kson
            .load_schemas_file(path)
            .with_context(|| format!("failed to load schemas from {}", path.display()))?;
        loaded.extend(batch);
    }

    let in_id = match &args.schema_id {
        Some(id) => id.clone(),
        None => match find_top_schema(&loaded) {
            Some(id) => id,
            None => bail!("--schema-id <id> required"),
        },
    };
    let out_id = args.out_schema_id.clone().unwrap_or_else(|| in_id.clone());

    for id in [&in_id, &out_id] {
        let plain = id.strip_prefix("[]").unwrap_or(id);
        if kson.schema(plain).is_none() {
            let known: Vec<&str> = kson.schema_ids().collect();
            bail!("schema '{}' not found in: {}", plain, known.join(", "));
        }
    }

    Ok((in_id, out_id))
}

fn encode(kson: &Kson, data: &Value, schema_ref: &str, pretty: bool) -> anyhow::Result<String> {
    let out = if pretty {
        kson.encode_pretty(data, schema_ref)?
    } else {
        kson.encode(data, schema_ref)?
    };
    Ok(out)
}

fn serialize_json(data: &Value, pretty: bool) -> anyhow::Result<String> {
    let out = if pretty {
        serde_json::to_string_pretty(data)?
    } else {
        serde_json::to_string(data)?
    };
    Ok(out)
}

fn read_input(io_args: &IoArgs) -> anyhow::Result<String> {
    match &io_args.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

fn write_output(io_args: &IoArgs, data: &str) -> anyhow::Result<()> {
    match &io_args.output {
        Some(path) => {
            fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(data.as_bytes())?;
            stdout.write_all(b"\n")?;
            Ok(())
        }
    }
}
