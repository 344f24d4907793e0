use std::process::ExitCode;

fn main() -> ExitCode {
    activity_host_lib::run()
}
