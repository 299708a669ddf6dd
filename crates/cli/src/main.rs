//! # CLI - disk cache shell
//!
//! A REPL-style command-line interface for the on-disk LRU cache. Reads
//! commands from stdin, executes them against a [`cache_engine::Cache`], and
//! prints results to stdout. Designed for both interactive use and scripted
//! testing (pipe commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! EDIT key           Open an editor for key (fails if one is already open)
//! WRITE text...      Append text to the open editor's staging file
//! COMMIT             Commit the open editor
//! ABORT              Abort the open editor, discarding its staging file
//! GET key            Look up a key (prints value or "(nil)")
//! REMOVE key         Remove a key
//! REBUILD            Rewrite the journal to its compact form
//! STATS              Print cache size/entry count
//! CLOSE              Close the cache's journal
//! EXIT / QUIT        Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! All settings are controlled via environment variables:
//!
//! ```text
//! DISK_CACHE_DIR            cache directory    (default: "cache")
//! DISK_CACHE_APP_VERSION    app version         (default: 1)
//! DISK_CACHE_CACHE_VERSION  cache version       (default: 1)
//! DISK_CACHE_MAX_SIZE_BYTES max aggregate size  (default: 10485760 = 10 MiB)
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! disk cache started (dir=cache, max_size=10485760)
//! > EDIT name
//! OK
//! > WRITE Alice
//! OK
//! > COMMIT
//! OK
//! > GET name
//! Alice
//! > EXIT
//! bye
//! ```
use std::io::{self, BufRead, Read, Write};

use anyhow::Result;
use cache_config::CacheConfig;
use cache_engine::{Cache, Editor};

fn main() -> Result<()> {
    let config = CacheConfig::from_env();
    let dir = config.dir.display().to_string();
    let max_size = config.max_size;

    let cache = Cache::open(config)?;

    println!(
        "disk cache started (dir={}, max_size={}, size={})",
        dir,
        max_size,
        cache.size()
    );
    println!("Commands: EDIT key | WRITE text... | COMMIT | ABORT | GET key");
    println!("          REMOVE key | REBUILD | STATS | CLOSE | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    let mut editor: Option<Editor> = None;

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "EDIT" => {
                    if let Some(key) = parts.next() {
                        if editor.is_some() {
                            println!("ERR an editor is already open, commit or abort first");
                        } else {
                            match cache.edit(key) {
                                Ok(e) => {
                                    editor = Some(e);
                                    println!("OK");
                                }
                                Err(e) => println!("ERR edit failed: {}", e),
                            }
                        }
                    } else {
                        println!("ERR usage: EDIT key");
                    }
                }
                "WRITE" => {
                    let text: String = parts.collect::<Vec<&str>>().join(" ");
                    match &editor {
                        Some(e) => {
                            let mut writer = e.open_appending_writer();
                            let mut payload = text.into_bytes();
                            payload.push(b'\n');
                            match writer.write_all(&payload) {
                                Ok(()) => println!("OK"),
                                Err(err) => println!("ERR write failed: {}", err),
                            }
                        }
                        None => println!("ERR no editor open, run EDIT key first"),
                    }
                }
                "COMMIT" => match editor.take() {
                    Some(e) => match e.commit() {
                        Ok(()) => println!("OK"),
                        Err(err) => println!("ERR commit failed: {}", err),
                    },
                    None => println!("ERR no editor open"),
                },
                "ABORT" => match editor.take() {
                    Some(e) => match e.abort() {
                        Ok(()) => println!("OK"),
                        Err(err) => println!("ERR abort failed: {}", err),
                    },
                    None => println!("ERR no editor open"),
                },
                "GET" => {
                    if let Some(key) = parts.next() {
                        match cache.get(key) {
                            Ok(mut snapshot) => {
                                let mut buf = Vec::new();
                                match snapshot.read_to_end(&mut buf) {
                                    Ok(_) => println!("{}", String::from_utf8_lossy(&buf)),
                                    Err(err) => println!("ERR read failed: {}", err),
                                }
                            }
                            Err(err) => println!("(nil) ({})", err),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "REMOVE" => {
                    if let Some(key) = parts.next() {
                        match cache.remove(key) {
                            Ok(()) => println!("OK"),
                            Err(err) => println!("ERR remove failed: {}", err),
                        }
                    } else {
                        println!("ERR usage: REMOVE key");
                    }
                }
                "REBUILD" => match cache.rebuild_journal() {
                    Ok(()) => println!("OK"),
                    Err(err) => println!("ERR rebuild failed: {}", err),
                },
                "STATS" => {
                    println!("size={} entries={}", cache.size(), cache.len());
                }
                "CLOSE" => match cache.close() {
                    Ok(()) => println!("OK"),
                    Err(err) => println!("ERR close failed: {}", err),
                },
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}
