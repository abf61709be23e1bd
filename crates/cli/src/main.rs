use std::process::ExitCode;

fn main() -> ExitCode {
    roomservice_cli::run()
}
