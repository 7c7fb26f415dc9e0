//! State file check tool
//!
//! Parses an ephemera state file, migrating it in memory if needed, and
//! reports what it holds.

use ephemera_config::{ConfigError, CURRENT_CONFIG_VERSION, validate_new};
use ephemera_util::{default_config_path, format_datetime_full};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let state_path = match args.get(1) {
        Some(path) if path != "-h" && path != "--help" => PathBuf::from(path),
        _ => {
            let default_path = default_config_path();
            eprintln!("Usage: check-state [state-file]");
            eprintln!();
            eprintln!("Checks an ephemera state file.");
            eprintln!();
            eprintln!("Example:");
            eprintln!("  check-state {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !state_path.exists() {
        eprintln!("Error: State file not found: {}", state_path.display());
        return ExitCode::from(1);
    }

    match ephemera_config::load_record(&state_path) {
        Ok(record) => {
            println!("✓ State file is readable");
            println!();
            println!("Summary:");
            println!("  Config version: {}", CURRENT_CONFIG_VERSION);
            println!("  Provider: {}", record.provider);
            println!("  TTL: {}", record.ttl);
            println!("  Name: {}", record.name);
            println!("  Force: {}", record.force);
            println!("  Status: {}", record.status);
            if let Some(expires_at) = &record.expires_at {
                println!("  Expires: {}", format_datetime_full(expires_at));
            }
            if let Some(job) = &record.scheduled_job_id {
                println!("  Backstop job: {}", job);
            }
            println!("  Cleanup: {}", record.cleanup_status());

            // Settings only matter for the next `new`, so problems are warnings here.
            if let Err(errors) = validate_new(&record.provider, &record.ttl, &record.name) {
                println!();
                println!("Settings that `new` would reject ({}):", errors.len());
                for err in errors {
                    println!("  - {}", err);
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ State file check failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver, CURRENT_CONFIG_VERSION
                    );
                }
                other => eprintln!("{}", other),
            }
            ExitCode::from(1)
        }
    }
}
