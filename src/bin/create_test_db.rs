use std::path::{Path, PathBuf};

use bin_monitor::adapters::db::{
    count_snapshots, insert_snapshot, open_connection, run_migrations, schema_version,
};
use bin_monitor::domain::bin_payload::parse_bin_list;
use bin_monitor::domain::bin_record::BinRecord;
use bin_monitor::domain::reconcile::deduplicate_bins_with_report;
use chrono::{SecondsFormat, Utc};

#[derive(Debug)]
struct Options {
    path: PathBuf,
    seed: Option<PathBuf>,
    force: bool,
}

fn main() {
    if let Err(error) = run() {
        eprintln!("failed to create bin cache db: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        print_help();
        return Ok(());
    };

    if let Some(parent) = options.path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|error| format!("failed to create parent directory: {error}"))?;
    }

    if options.force && options.path.exists() {
        std::fs::remove_file(&options.path)
            .map_err(|error| format!("failed to remove existing db file: {error}"))?;
    }

    let path = options.path.to_string_lossy();
    let mut connection = open_connection(&path).map_err(|error| error.to_string())?;
    run_migrations(&mut connection).map_err(|error| error.to_string())?;

    if let Some(seed) = &options.seed {
        let (bins, dropped) = read_seed(seed)?;
        let saved_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        insert_snapshot(&connection, &bins, &saved_at).map_err(|error| error.to_string())?;
        println!(
            "seeded snapshot with {} bins from {} ({dropped} dropped)",
            bins.len(),
            seed.display()
        );
    }

    let version = schema_version(&connection).map_err(|error| error.to_string())?;
    let snapshots = count_snapshots(&connection).map_err(|error| error.to_string())?;

    println!("bin cache db ready at: {path}");
    println!("schema version: {version}, snapshots: {snapshots}");
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Option<Options>, String> {
    let mut options = Options {
        path: Path::new("./data/bins_test.db").to_path_buf(),
        seed: None,
        force: false,
    };

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--path" => {
                options.path = args
                    .next()
                    .map(PathBuf::from)
                    .ok_or_else(|| "--path requires a value".to_string())?;
            }
            "--seed" => {
                options.seed = Some(
                    args.next()
                        .map(PathBuf::from)
                        .ok_or_else(|| "--seed requires a value".to_string())?,
                );
            }
            "--force" => options.force = true,
            "--help" | "-h" => return Ok(None),
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    Ok(Some(options))
}

/// Reads a backend-shaped bin list and reconciles it before it is cached.
fn read_seed(path: &Path) -> Result<(Vec<BinRecord>, usize), String> {
    let content = std::fs::read_to_string(path)
        .map_err(|error| format!("failed to read seed file: {error}"))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|error| format!("seed file is not valid JSON: {error}"))?;
    let parsed = parse_bin_list(&value).map_err(|error| error.to_string())?;
    let (bins, report) = deduplicate_bins_with_report(parsed.bins);

    Ok((bins, parsed.skipped + report.removed()))
}

fn print_help() {
    println!("create_test_db");
    println!();
    println!("Usage:");
    println!("  cargo run --bin create_test_db -- [--path <file>] [--seed <bins.json>] [--force]");
    println!();
    println!("Options:");
    println!("  --path <file>       target sqlite file (default: ./data/bins_test.db)");
    println!("  --seed <bins.json>  store a reconciled bin list as the latest snapshot");
    println!("  --force             delete existing file before creating");
}
