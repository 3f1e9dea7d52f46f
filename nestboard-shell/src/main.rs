/// nestboard shell: an interactive line-oriented front end for a workspace.
///
/// Usage: `nestboard [config.json]`. Commands are read from stdin; `help`
/// lists them.
mod commands;
mod config;
mod logging;

use std::io::{self, BufRead, Write};

use nestboard_core::config::load_config;
use nestboard_core::Workspace;

use crate::commands::{execute, parse_command, Flow};

fn main() {
    if let Err(e) = logging::init() {
        eprintln!("failed to initialize logger: {}", e);
    }

    let config_path = config::resolve_config_path(std::env::args().nth(1));
    let mut workspace = Workspace::new(load_config(&config_path));
    log::info!(
        "[nestboard.shell] Started with config {}",
        config_path.display()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let _ = write!(stdout, "> ");
    let _ = stdout.flush();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::error!("[nestboard.shell] Failed to read input: {}", e);
                break;
            }
        };
        match parse_command(&line) {
            Ok(Some(command)) => match execute(&mut workspace, command, &mut stdout) {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(e) => eprintln!("error: {}", e),
            },
            Ok(None) => {}
            Err(e) => eprintln!("error: {}", e),
        }
        let _ = write!(stdout, "> ");
        let _ = stdout.flush();
    }
}
