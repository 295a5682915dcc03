use std::process;

fn main() {
    process::exit(nbtester::cli::run());
}
