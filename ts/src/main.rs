//! taskstore - inspect and maintain a TaskStore directory from the command line

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Result, WrapErr};
use rusqlite::Connection;

#[derive(Parser, Debug)]
#[command(name = "taskstore")]
#[command(author, version, about = "Inspect and maintain a TaskStore directory", long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(short, long, default_value = ".taskstore")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every collection (table) present in the store
    Collections,
    /// Dump every record in a collection as JSON lines
    Dump { collection: String },
    /// Show row counts per collection
    Stats,
}

fn list_collections(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '%__index' AND name != 'sqlite_sequence'",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let db_path = cli.store.join("store.sqlite3");
    let conn = Connection::open(&db_path).wrap_err_with(|| format!("opening {}", db_path.display()))?;

    match cli.command {
        Command::Collections => {
            for name in list_collections(&conn)? {
                println!("{}", name.cyan());
            }
        }
        Command::Stats => {
            for name in list_collections(&conn)? {
                let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM \"{name}\""), [], |r| r.get(0))?;
                println!("{:<24} {}", name.cyan(), count.to_string().bold());
            }
        }
        Command::Dump { collection } => {
            let mut stmt = conn.prepare(&format!("SELECT data FROM \"{collection}\""))?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            for row in rows {
                println!("{}", row?);
            }
        }
    }

    Ok(())
}
