//! Grabs a handful of scans from a Sick PLS and prints the range values.
//!
//! Usage: pls_scan PATH [BAUD]
//! Example: pls_scan /dev/ttyUSB0 9600

use sick_pls::{Baud, SickPls, SICK_MAX_NUM_MEASUREMENTS};
use std::env;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 || args[1] == "--help" {
        eprintln!("Usage: pls_scan PATH [BAUD]");
        eprintln!("Ex: pls_scan /dev/ttyUSB0 9600");
        return ExitCode::from(255);
    }

    let device_path = &args[1];
    let desired_baud = match args.get(2) {
        Some(baud_str) => match Baud::from_string(baud_str) {
            Baud::Unknown => {
                eprintln!("Invalid baud value! Valid values are: 9600, 19200, 38400, and 500000");
                return ExitCode::from(255);
            }
            baud => baud,
        },
        None => Baud::B38400,
    };

    let mut sick_pls = SickPls::new(device_path.as_str());

    if let Err(err) = sick_pls.initialize(desired_baud) {
        eprintln!("Initialize failed! Are you using the correct device path? ({})", err);
        return ExitCode::from(255);
    }

    let mut values = [0u16; SICK_MAX_NUM_MEASUREMENTS as usize];
    for _ in 0..10 {
        match sick_pls.get_scan(&mut values) {
            Ok(num_values) => {
                println!("\t  Num. Values: {}", num_values);
                for value in &values[..num_values] {
                    println!("\t  val: {}", value);
                }
            }
            Err(err) => {
                eprintln!("An error occurred! ({})", err);
                break;
            }
        }
    }

    if let Err(err) = sick_pls.uninitialize() {
        eprintln!("Uninitialize failed! ({})", err);
        return ExitCode::from(255);
    }

    ExitCode::SUCCESS
}
