//! `ifs-bench`: run, validate and compare IFS benchmark experiments

fn main() {
    std::process::exit(ifsbench_cli::run());
}
