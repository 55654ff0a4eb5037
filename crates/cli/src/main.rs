use std::process::ExitCode;

fn main() -> ExitCode {
    scoop_cli::run()
}
