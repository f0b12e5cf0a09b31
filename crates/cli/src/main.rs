use std::process::ExitCode;

fn main() -> ExitCode {
    citabot_cli::run()
}
