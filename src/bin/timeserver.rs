//! The time authority binary: parses configuration, creates the message bus,
//! installs the signal gate, and runs the dispatcher until termination (§6.3).

use std::process::ExitCode;

use timeserver::bus::MessageBus;
use timeserver::clock::Clock;
use timeserver::config::{self, ParseOutcome};
use timeserver::dispatcher::Authority;
use timeserver::error::AuthorityError;
use timeserver::signals::SignalGate;
use timeserver::{trace, wire};

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cfg = match config::parse_args(&args) {
        Ok(ParseOutcome::Help) => {
            print!("{}", config::USAGE);
            return ExitCode::SUCCESS;
        }
        Ok(ParseOutcome::Run(cfg)) => cfg,
        Err(e) => {
            eprintln!("timeserver: {}", e);
            return ExitCode::FAILURE;
        }
    };

    log::info!(
        "starting: origin={} idle_time_us={} idle_jump={:?} busy_wait={} no_fork={}",
        cfg.origin,
        cfg.idle_time_us,
        cfg.idle_jump,
        cfg.busy_wait,
        cfg.no_fork
    );

    let bus = match MessageBus::create_default() {
        Ok(bus) => bus,
        Err(e) => return fatal(AuthorityError::BusUnavailable(e)),
    };

    let clock = Clock::new(cfg.origin, cfg.idle_jump, cfg.busy_wait, cfg.no_fork);
    let gate = SignalGate::install();
    let mut authority = Authority::new(bus, wire::MAXCLIENTS as usize, clock, gate, cfg.idle_time_us);

    let result = authority.run();
    let (num_clients, num_sleeping) = authority.counts();
    if let Err(e) = authority.into_bus().destroy() {
        log::error!("failed to destroy message bus: {}", e);
    }
    trace::log_quit(num_clients, num_sleeping);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fatal(e),
    }
}

/// Log a fatal `AuthorityError` and turn it into a process exit code — the
/// only two ways `main` ever stops early (§7 propagation policy).
fn fatal(e: AuthorityError) -> ExitCode {
    log::error!("{}", e);
    ExitCode::FAILURE
}
