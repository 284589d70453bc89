//! Command-line front-end for caskdb.

use std::env;
use std::process::ExitCode;

use caskdb::{Storage, Store, StoreError};

fn print_usage(program: &str) {
    eprintln!("Usage: {} -db <directory> <command> [args...]", program);
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  set <key> <value>   Set a key-value pair");
    eprintln!("  get <key>           Get value for a key");
    eprintln!("  del <key>           Delete a key");
    eprintln!("  list                List all keys");
    eprintln!("  merge               Compact log files");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  {} -db ./mydb set user:1 alice", program);
    eprintln!("  {} -db ./mydb get user:1", program);
    eprintln!("  {} -db ./mydb del user:1", program);
    eprintln!("  {} -db ./mydb merge", program);
}

fn main() -> ExitCode {
    // Init log config from env.
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("caskdb");

    if args.len() < 4 || args[1] != "-db" {
        if args.len() >= 2 && args[1] != "-db" {
            eprintln!("Error: First argument must be -db");
            eprintln!();
        }
        print_usage(program);
        return ExitCode::FAILURE;
    }

    let db_dir = &args[2];
    let command = args[3].as_str();

    let mut db = match Store::open(db_dir) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Error opening database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match command {
        "set" => {
            if args.len() < 6 {
                eprintln!("Error: 'set' requires key and value arguments");
                print_usage(program);
                return ExitCode::FAILURE;
            }

            if let Err(e) = db.put(args[4].as_bytes(), args[5].as_bytes()) {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }

            println!("OK");
        }
        "get" => {
            if args.len() < 5 {
                eprintln!("Error: 'get' requires key argument");
                print_usage(program);
                return ExitCode::FAILURE;
            }

            match db.get(args[4].as_bytes()) {
                Ok(value) => println!("{}", String::from_utf8_lossy(&value)),
                // a missing key is not an error for the cli.
                Err(StoreError::KeyNotFound(_)) => println!("(nil)"),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
        "del" => {
            if args.len() < 5 {
                eprintln!("Error: 'del' requires key argument");
                print_usage(program);
                return ExitCode::FAILURE;
            }

            if let Err(e) = db.delete(args[4].as_bytes()) {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }

            println!("OK");
        }
        "list" => {
            let keys = match db.list_keys() {
                Ok(keys) => keys,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::FAILURE;
                }
            };

            if keys.is_empty() {
                println!("(empty)");
            } else {
                for key in keys {
                    println!("{}", String::from_utf8_lossy(&key));
                }
            }
        }
        "merge" => {
            println!("Starting merge process...");

            if let Err(e) = db.merge() {
                eprintln!("Error during merge: {}", e);
                return ExitCode::FAILURE;
            }

            println!("Merge completed successfully");
        }
        _ => {
            eprintln!("Error: Unknown command '{}'", command);
            eprintln!();
            print_usage(program);
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
