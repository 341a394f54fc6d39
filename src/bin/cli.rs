//! Cedar Store CLI Client
//!
//! Command-line interface for interacting with a Cedar Store server.

use cedarstore::protocol::{read_response, write_request, Command, Request};
use cedarstore::{FieldValue, FilterExpr, Record, Result, StoreError};
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tokio::net::TcpStream;

/// Cedar Store CLI
#[derive(Parser, Debug)]
#[command(name = "cedar-cli")]
#[command(about = "CLI for the Cedar Store record server")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8081")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a record by id
    Get {
        table: String,
        /// Id as JSON (e.g. '"alice"' or 42)
        id: String,
    },

    /// Check whether a record exists
    Has {
        table: String,
        /// Id as JSON
        id: String,
    },

    /// Insert or overwrite records
    Set {
        table: String,
        /// Records as a JSON array of arrays
        records: String,
    },

    /// Delete records
    Del {
        table: String,
        /// Ids as a JSON array
        ids: String,
    },

    /// List records of an unsharded table
    List {
        table: String,
        /// Filter as JSON (defaults to matching everything)
        #[arg(default_value = "[[]]")]
        filter: String,
    },

    /// List a table's shard keys
    Shards { table: String },

    /// Ask the server to persist all dirty shards
    Flush,

    /// Ping the server
    Ping,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let command = build_command(args.command)?;

    let stream = TcpStream::connect(&args.server)
        .await
        .map_err(|e| StoreError::Network(format!("connect {}: {}", args.server, e)))?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    write_request(&mut write_half, &Request::new(1, command)).await?;

    let response = read_response(&mut reader)
        .await?
        .ok_or_else(|| StoreError::Network("server closed the connection".to_string()))?;

    if !response.success {
        return Err(StoreError::Protocol(response.error));
    }

    println!("{}", serde_json::to_string_pretty(&response.data)?);
    Ok(())
}

fn build_command(command: Commands) -> Result<Command> {
    Ok(match command {
        Commands::Get { table, id } => Command::Get {
            table,
            id: parse::<FieldValue>(&id)?,
        },
        Commands::Has { table, id } => Command::Has {
            table,
            id: parse::<FieldValue>(&id)?,
        },
        Commands::Set { table, records } => Command::Set {
            table,
            records: parse::<Vec<Record>>(&records)?,
        },
        Commands::Del { table, ids } => Command::Delete {
            table,
            ids: parse::<Vec<FieldValue>>(&ids)?,
        },
        Commands::List { table, filter } => Command::List {
            table,
            filter: parse::<FilterExpr>(&filter)?,
        },
        Commands::Shards { table } => Command::Shards { table },
        Commands::Flush => Command::Flush,
        Commands::Ping => Command::Ping,
    })
}

fn parse<T: serde::de::DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| StoreError::Serialization(format!("'{}': {}", json, e)))
}
