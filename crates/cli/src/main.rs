use std::process::ExitCode;

fn main() -> ExitCode {
    routewatch_cli::run()
}
