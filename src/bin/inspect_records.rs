use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    shardprep::cli::run_inspect_records(std::env::args().skip(1))
}
