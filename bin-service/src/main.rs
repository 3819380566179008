fn main() {
    if let Err(err) = bin_monitor::app::run_service() {
        eprintln!("service startup failed: {err}");
        std::process::exit(1);
    }
}
