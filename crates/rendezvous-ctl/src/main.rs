//! rendezvous-ctl: command-line interface for the rendezvous monitoring surface.

mod cmd;

use anyhow::{Context, Result};

use cmd::status::{cmd_health, cmd_peers, cmd_status};

const DEFAULT_PORT: u16 = 8080;

fn print_usage() {
    println!("Usage: rendezvous-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status    Online peers, connection count, uptime (default)");
    println!("  peers     Every known peer, online and offline");
    println!("  health    Liveness check");
    println!("  help      Show this message");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => cmd_status(port).await,
        ["peers"] => cmd_peers(port).await,
        ["health"] => cmd_health(port).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
