fn main() {
    if let Err(err) = bin_monitor::app::run_api() {
        eprintln!("api startup failed: {err}");
        std::process::exit(1);
    }
}
