use std::process::ExitCode;

fn main() -> ExitCode {
    sitemill::cli::run()
}
