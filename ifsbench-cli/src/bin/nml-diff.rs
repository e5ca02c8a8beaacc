//! `nml-diff`: structural diff of two Fortran namelist files

fn main() {
    std::process::exit(ifsbench_cli::nml_diff());
}
