//! doltkit demo
//!
//! Walks a Dolt SQL server through a small branch workflow on the
//! `dividend(act_symbol, ex_date, amount)` table: record dividends with
//! missing amounts on the primary branch, commit, then forward-fill the
//! gaps on a development branch and show the working diff.

use std::process::ExitCode;

use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use doltkit::bulk::{self, Record};
use doltkit::store::mysql::MySqlConnector;
use doltkit::vcs::{self, Author, DEFAULT_PROTECTED};
use doltkit::{report, DoltResult, ServerConfig, Session};

const TABLE: &str = "dividend";
const COLUMNS: [&str; 3] = ["act_symbol", "ex_date", "amount"];
const DEV_BRANCH: &str = "dev-branch";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut database = "stocks".to_string();
    let mut branch = "master".to_string();
    let mut reset = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-d" | "--database" => {
                i += 1;
                if let Some(value) = args.get(i) {
                    database = value.clone();
                }
            }
            "-b" | "--branch" => {
                i += 1;
                if let Some(value) = args.get(i) {
                    branch = value.clone();
                }
            }
            "--reset" => reset = true,
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "--version" => {
                println!("doltkit v{}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            arg => {
                eprintln!("Unknown option: {arg}");
                return ExitCode::FAILURE;
            }
        }
        i += 1;
    }

    match run(&database, &branch, reset) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(database: &str, branch: &str, reset: bool) -> DoltResult<()> {
    let config = ServerConfig::load()?;
    let connector = MySqlConnector::new(config)?;
    let author: Author = "Jennifer <jennifer@dolthub.com>".parse()?;

    let mut session = Session::bind(&connector, database, branch)?;
    println!("Active branch: {}", report::active_branch(&mut session)?);

    if reset {
        let parent = vcs::reset_to_previous_head(&mut session)?;
        println!("Reset {branch} to {}", parent.short());
        let deleted = vcs::delete_non_primary_branches(&mut session, &DEFAULT_PROTECTED)?;
        println!("{deleted}");
    }

    let rows = [("A", "2006-11-02"), ("A", "2012-03-31")]
        .into_iter()
        .map(|(symbol, ex_date)| {
            Record::from([
                ("act_symbol".to_string(), json!(symbol)),
                ("ex_date".to_string(), json!(ex_date)),
                ("amount".to_string(), Value::Null),
            ])
        })
        .collect::<Vec<_>>();
    bulk::insert(&mut session, TABLE, &rows)?;

    for status in report::status(&mut session)? {
        println!("{status}");
    }
    match vcs::commit(&mut session, &author, "Insert values with NULL amount")? {
        Some(hash) => println!("Committed {}", hash.short()),
        None => println!("Nothing to commit"),
    }

    let dividend = bulk::load_rows(&mut session, TABLE)?;
    println!("The first 5 entries:");
    for row in dividend.iter().take(5) {
        println!("  {}", json!(row));
    }

    println!("{:?}", vcs::create_branch(&mut session, DEV_BRANCH)?);
    session.close();

    let mut dev = vcs::checkout(&connector, database, DEV_BRANCH)?;
    println!("Active branch: {}", report::active_branch(&mut dev)?);

    let filled = forward_fill(dividend, "amount");
    bulk::replace_table(&mut dev, TABLE, &filled)?;

    println!("The diff result:");
    for row in report::diff_columns(&mut dev, TABLE, &COLUMNS)? {
        println!("{row}");
    }
    dev.close();
    Ok(())
}

/// Replace NULLs in `column` with the closest earlier non-NULL value.
fn forward_fill(mut rows: Vec<Record>, column: &str) -> Vec<Record> {
    let mut last = Value::Null;
    for row in &mut rows {
        match row.get_mut(column) {
            Some(value) if value.is_null() => *value = last.clone(),
            Some(value) => last = value.clone(),
            None => {}
        }
    }
    rows
}

fn print_help() {
    println!(
        r#"doltkit - Dolt version-control demo

USAGE:
    doltkit [OPTIONS]

OPTIONS:
    -d, --database <NAME>  Database to use (default: stocks)
    -b, --branch <NAME>    Primary branch (default: master)
    --reset                Before running, undo the last commit on the primary
                           branch and force-delete every other branch, so
                           the demo can be re-run
    -h, --help             Print help information
    --version              Print version information

Server settings are read from doltkit.toml and DOLT_HOST, DOLT_PORT,
DOLT_USER, DOLT_PASSWORD. Set RUST_LOG to control log output."#
    );
}
