use netsim::cli::initialize_from_arguments;
use std::env;

/// Without arguments, main runs the default simulation
fn main() {
    println!("Netsim v{}", env!("CARGO_PKG_VERSION"));
    initialize_from_arguments();
    println!("Done");
}
