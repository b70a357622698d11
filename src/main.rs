use std::{io, process::ExitCode};

use clap::Parser;
use log::debug;

use nflogd::{
    iface::SystemInterfaces,
    session::{validate_group, AuditWriter, CancellationToken, CaptureSession, SessionConfigBuilder},
};

const EXIT_USAGE: u8 = 1;
const EXIT_SESSION: u8 = 2;

/// Print packets logged to an NFLOG group in the format of the
/// iptables LOG target.
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    /// NFLOG Group ID to listen to
    #[arg(long, default_value_t = 0)]
    group: u64,
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_USAGE } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    let config = match validate_group(args.group)
        .and_then(|group| SessionConfigBuilder::default().group(group).build())
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };
    let group = *config.group();

    let token = CancellationToken::new();
    let signal_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || signal_token.cancel()) {
        eprintln!("failed to install signal handler: {e}");
        return ExitCode::from(EXIT_SESSION);
    }

    let mut session = match CaptureSession::open(config) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_SESSION);
        }
    };
    eprintln!("listening to NFLOG Group {group}");

    let writer = AuditWriter::new(io::stdout(), io::stderr(), SystemInterfaces);
    if let Err(e) = session.register(writer) {
        eprintln!("{e}");
        return ExitCode::from(EXIT_SESSION);
    }

    session.run(&token);
    debug!("Shutting down");
    session.close();
    ExitCode::SUCCESS
}
