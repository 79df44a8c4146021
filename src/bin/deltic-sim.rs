//! Runs the compiled-in example configuration and writes its enabled trace
//! series to stdout as CSV. Takes no flags: a run is configured entirely by
//! `Config::example()`, per the library's "no CLI flags" design.

use deltic_sim::{run, Config, CsvTraceSink};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = Config::example();
    let sink = Box::new(CsvTraceSink::new(std::io::stdout()));
    if let Err(e) = run(cfg, sink) {
        eprintln!("deltic-sim: run failed: {e}");
        std::process::exit(1);
    }
}
