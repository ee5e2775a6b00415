use std::process::ExitCode;

fn main() -> ExitCode {
    trestle_cli::run()
}
