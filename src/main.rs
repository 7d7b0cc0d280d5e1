fn main() {
    if let Err(err) = csv_etl::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
