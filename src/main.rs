fn main() {
    if let Err(e) = multicert::cli::run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
