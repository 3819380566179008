use bin_monitor::adapters::bin_source::BinSource;
use bin_monitor::app::config::AppConfig;
use bin_monitor::app::runtime::{SystemClock, build_source};
use bin_monitor::domain::bin_record::BinRecord;
use bin_monitor::domain::bin_summary::summarize;
use bin_monitor::domain::reconcile::deduplicate_bins_with_report;
use bin_monitor::domain::staleness::{CameraStatus, effective_last_seen};
use bin_monitor::domain::timestamp::{Clock, timestamp_to_iso8601};

fn main() {
    if let Err(error) = run() {
        eprintln!("bin status job failed: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut offline_only = false;

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--offline-only" => offline_only = true,
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    let config = AppConfig::from_env().map_err(|error| error.to_string())?;
    let source = build_source(&config.source).map_err(|error| error.to_string())?;
    let now = SystemClock.now();

    println!(
        "[{}] fetching bins from {} source...",
        now.to_rfc3339(),
        config.source_label()
    );

    let fetched = source.fetch_bins().map_err(|error| error.to_string())?;
    let (bins, report) = deduplicate_bins_with_report(fetched);

    println!(
        "received {} records, {} canonical ({} without id, {} duplicate address, {} same id)",
        report.input,
        report.output,
        report.dropped_missing_id,
        report.dropped_duplicates + report.superseded,
        report.replaced
    );

    for bin in &bins {
        let status = CameraStatus::for_bin(bin, &now);
        if offline_only && status == CameraStatus::Online {
            continue;
        }
        print_bin(bin, status, &now);
    }

    let summary = summarize(&bins, &now);
    println!();
    println!("total bins:      {}", summary.total_bins);
    println!("offline cameras: {}", summary.offline_cameras);
    println!("full bins:       {}", summary.full_bins);
    match summary.average_fill_level {
        Some(level) => println!("average fill:    {level:.1}%"),
        None => println!("average fill:    n/a"),
    }

    Ok(())
}

fn print_bin(bin: &BinRecord, status: CameraStatus, now: &chrono::DateTime<chrono::FixedOffset>) {
    println!();
    println!(
        "{} ({})",
        bin.address.as_deref().unwrap_or("<no address>"),
        bin.id
    );
    println!("  camera: {}", status.label());

    match effective_last_seen(bin, now) {
        Some(seen) => println!("  last seen: {}", timestamp_to_iso8601(seen)),
        None => println!("  last seen: never"),
    }

    match bin.fill_level {
        Some(level) => println!("  fill level: {level:.0}%"),
        None => println!("  fill level: n/a"),
    }
}

fn print_help() {
    println!("bin_status_job");
    println!();
    println!("Fetches the bin list once and prints camera status per bin.");
    println!("Reads the same environment as the service (BINS_API_URL, BINS_FIXTURE_FILE, ...).");
    println!();
    println!("Usage:");
    println!("  cargo run --bin bin_status_job -- [--offline-only]");
}
