use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    build_triage::apps::run_categorize(std::env::args().skip(1))
}
