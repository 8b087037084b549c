//! STOWAGE - Interactive Shell
//! A REPL over a pool of named stores rooted at `STOWAGE_ROOT`.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use stowage::config::PoolConfig;
use stowage::pool::Pool;
use stowage::store::Store;
use stowage::types::{ListQuery, Record};

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(s) => println!("  {}", s),
        Err(e) => println!("  ERROR: {}", e),
    }
}

fn print_result<T: serde::Serialize>(result: Result<T, stowage::StoreError>) {
    match result {
        Ok(value) => print_json(&value),
        Err(e) => {
            print!("  ERROR ");
            print_json(&e.payload());
        }
    }
}

/// Values that are not valid JSON are stored as strings.
fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn main() {
    env_logger::init();

    let config = match PoolConfig::from_env() {
        Ok(c) => c,
        Err(err) => {
            eprintln!("[ERROR] {}", err);
            std::process::exit(1);
        }
    };

    println!();
    println!("  ╔═══════════════════════════════════════════╗");
    println!("  ║              STOWAGE Shell                ║");
    println!("  ║       Pooled Key-Value Stores v0.1.0      ║");
    println!("  ╚═══════════════════════════════════════════╝");
    println!();
    println!("  Root: {:?} (idle after {:?})", config.root_path, config.manager_interval);
    println!();
    println!("  Commands:");
    println!("    use <db>            - Select (and register) a store");
    println!("    set <key> <json>    - Store a value");
    println!("    get <key>           - Retrieve a value");
    println!("    del <key>...        - Delete one or more keys");
    println!("    list [json-query]   - Range scan, e.g. list {{\"gt\":\"a\",\"limit\":5}}");
    println!("    export              - Dump every record");
    println!("    import <json-array> - Write [{{\"key\":..,\"value\":..}}, ...] atomically");
    println!("    close [db]          - Close a store (default: current)");
    println!("    destroy             - Delete the current store's data");
    println!("    dbs                 - List registered stores");
    println!("    stats               - Show current store metrics");
    println!("    exit                - Close everything and quit");
    println!();

    let pool = match Pool::new(config) {
        Ok(p) => p,
        Err(err) => {
            eprintln!("[ERROR] {}", err);
            std::process::exit(1);
        }
    };
    let mut current: Option<(String, Arc<Store>)> = None;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        match &current {
            Some((name, _)) => print!("stowage:{}> ", name),
            None => print!("stowage> "),
        }
        let _ = stdout.flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("[ERROR] {}", e);
                break;
            }
        }

        let line = line.trim();
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((c, r)) => (c, r.trim()),
            None => (line, ""),
        };
        if command.is_empty() {
            continue;
        }
        let command = command.to_lowercase();

        match command.as_str() {
            "use" => {
                if rest.is_empty() {
                    println!("  Usage: use <db>");
                    continue;
                }
                let store = pool.store(rest);
                current = Some((rest.to_string(), store));
                println!("  OK");
                continue;
            }
            "dbs" => {
                let names = pool.names();
                if names.is_empty() {
                    println!("  (none)");
                } else {
                    for name in names {
                        println!("  {}", name);
                    }
                }
                continue;
            }
            "close" if !rest.is_empty() => {
                println!("  {}", pool.close(rest));
                continue;
            }
            "exit" | "quit" | "q" => {
                println!("  Shutting down STOWAGE...");
                break;
            }
            _ => {}
        }

        let Some((name, _)) = &current else {
            println!("  No store selected. Use 'use <db>' first.");
            continue;
        };
        // Re-resolve through the pool so interactive use keeps the store from going idle.
        let name = name.clone();
        let store = pool.store(&name);
        current = Some((name.clone(), Arc::clone(&store)));

        match command.as_str() {
            "set" | "put" => match rest.split_once(char::is_whitespace) {
                Some((key, raw)) => print_result(store.put(key, parse_value(raw.trim()))),
                None => println!("  Usage: set <key> <json>"),
            },
            "get" => {
                if rest.is_empty() {
                    println!("  Usage: get <key>");
                    continue;
                }
                print_result(store.get(rest));
            }
            "del" | "delete" => {
                let keys: Vec<&str> = rest.split_whitespace().collect();
                print_result(store.del(&keys));
            }
            "list" | "scan" => {
                let query = if rest.is_empty() {
                    ListQuery::new()
                } else {
                    match serde_json::from_str::<ListQuery>(rest) {
                        Ok(q) => q,
                        Err(e) => {
                            println!("  Invalid query: {}", e);
                            continue;
                        }
                    }
                };
                match store.list(&query) {
                    Ok(items) if items.is_empty() => println!("  (empty)"),
                    Ok(items) => {
                        for item in &items {
                            print_json(item);
                        }
                        println!("  ({} entries)", items.len());
                    }
                    Err(e) => print_result::<()>(Err(e)),
                }
            }
            "export" => print_result(store.export_all()),
            "import" => match serde_json::from_str::<Vec<Record>>(rest) {
                Ok(records) => print_result(store.import_all(&records)),
                Err(e) => println!("  Invalid records: {}", e),
            },
            "close" => {
                println!("  {}", pool.close(&name));
                current = None;
            }
            "destroy" => {
                print_result(store.destroy());
                pool.close(&name);
                current = None;
            }
            "stats" | "info" => {
                println!("{}", store.metrics().report(&name));
            }
            _ => {
                println!("  Unknown command: '{}'. Type 'exit' to quit.", command);
            }
        }
    }

    pool.stop();
    let closed = pool.close_all().wait();
    log::info!("Closed {} store(s)", closed);
}
