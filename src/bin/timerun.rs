//! The run driver: posts a single `RUN` message and exits (§6.4).

use std::process::ExitCode;

use timeserver::bus::MessageBus;
use timeserver::wire::{self, Message, NEXTSLEEP, NEXTWAKE};

const USAGE: &str = "usage: timerun [seconds | sleep | wake | -h]\n";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let payload = match args.first().map(String::as_str) {
        Some("-h") => {
            print!("{}", USAGE);
            return ExitCode::SUCCESS;
        }
        // No argument runs until the next sleep, same as "sleep" (original_source/timerun.c).
        None | Some("sleep") => NEXTSLEEP,
        Some("wake") => NEXTWAKE,
        Some(n) => match n.parse::<i64>() {
            Ok(v) => v,
            Err(_) => {
                eprintln!("timerun: invalid argument {:?}", n);
                return ExitCode::FAILURE;
            }
        },
    };

    let bus = match MessageBus::attach_default() {
        Ok(bus) => bus,
        Err(e) => {
            eprintln!("timerun: cannot attach to message bus: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = bus.send(Message::new(wire::RUN, 0, payload)) {
        eprintln!("timerun: send failed: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
