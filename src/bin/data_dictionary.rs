//! Data Dictionary - emits the machine-readable schema of the output tables
//!
//! Usage:
//!   cargo run --bin data_dictionary > dictionary.json
//!
//! The output is generated from the same field definitions the store uses
//! to create its tables, so it always matches what a run actually publishes.

fn main() {
    println!("{}", revflow::dictionary::render_json());
}
