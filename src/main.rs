//! awery-bridge command-line front end.

fn main() {
    if let Err(e) = awery_bridge::cli::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
