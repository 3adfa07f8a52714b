use std::process::ExitCode;

fn main() -> ExitCode {
    maintctl::maint::cli::run()
}
