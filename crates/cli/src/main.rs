use std::process::ExitCode;

fn main() -> ExitCode {
    dossier_cli::run()
}
