use std::fmt;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use startup_gate::config::GateArgs;
use startup_gate::error::GateError;
use startup_gate::report::{self, ReportEntry};
use tracing::Level;
use tracing_subscriber::fmt::time::FormatTime;

struct Elapsed(Instant);

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let total_secs = d.as_secs();
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        write!(w, "[{mins:02}:{secs:02}:{millis:03}]")
    }
}

fn main() -> ExitCode {
    let args = GateArgs::parse();

    // stdout belongs to the handed-off command.
    tracing_subscriber::fmt()
        .with_timer(Elapsed(Instant::now()))
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    let report_path = args.report.clone();
    let invocation = match args.into_invocation() {
        Ok(invocation) => invocation,
        Err(e) => {
            if let Some(path) = &report_path {
                report::record(path, &ReportEntry::failed(&e, None));
            }
            return fail(e);
        }
    };

    match startup_gate::run(invocation) {
        Ok(never) => match never {},
        Err(e) => fail(e),
    }
}

fn fail(e: GateError) -> ExitCode {
    eprintln!("error: {e}");
    ExitCode::from(e.exit_code())
}
