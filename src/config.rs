use std::path::PathBuf;

use crate::select::DuePolicy;

pub const DEFAULT_PORT: u16 = 3000;

pub const USAGE: &str = "\
Usage: recall <command> [args...]
Commands:
  serve <data-dir> [-p PORT] [--due-only] [--memory]   Start the JSON API (default port 3000)
  drill <data-dir> [--due-only]                         Review a deck in the terminal
  import <data-dir> <deck-name> <file.csv>              Add front,back[,difficulty] rows to a deck
  decks <data-dir>                                      List decks with due counts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub port: u16,
    pub due_policy: DuePolicy,
    /// Serve from memory only, seeded from `data_dir` when it exists.
    pub in_memory: bool,
}

impl Config {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            port: DEFAULT_PORT,
            due_policy: DuePolicy::default(),
            in_memory: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Serve(Config),
    Drill(Config),
    Import {
        config: Config,
        deck: String,
        file: PathBuf,
    },
    Decks(Config),
}

struct Parsed {
    positional: Vec<String>,
    port: Option<u16>,
    due_only: bool,
    in_memory: bool,
}

fn parse_flags(args: &[String]) -> Result<Parsed, String> {
    let mut parsed = Parsed {
        positional: Vec::new(),
        port: None,
        due_only: false,
        in_memory: false,
    };
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-p" | "--port" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| format!("{} needs a value", args[i]))?;
                parsed.port = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid port: {value}"))?,
                );
                i += 2;
            }
            "--due-only" => {
                parsed.due_only = true;
                i += 1;
            }
            "--memory" => {
                parsed.in_memory = true;
                i += 1;
            }
            flag if flag.starts_with('-') => return Err(format!("Unknown option: {flag}")),
            _ => {
                parsed.positional.push(args[i].clone());
                i += 1;
            }
        }
    }
    Ok(parsed)
}

/// Parses everything after the program name.
pub fn parse_args(args: &[String]) -> Result<Command, String> {
    let (command, rest) = args.split_first().ok_or("Missing command")?;
    let parsed = parse_flags(rest)?;

    let mut positional = parsed.positional.into_iter();
    let data_dir = positional
        .next()
        .ok_or_else(|| format!("{command}: missing <data-dir>"))?;
    let mut config = Config::new(data_dir);
    if let Some(port) = parsed.port {
        config.port = port;
    }
    if parsed.due_only {
        config.due_policy = DuePolicy::DueOnly;
    }
    config.in_memory = parsed.in_memory;

    let command = match command.as_str() {
        "serve" => Command::Serve(config),
        "drill" => Command::Drill(config),
        "decks" => Command::Decks(config),
        "import" => {
            let deck = positional
                .next()
                .ok_or("import: missing <deck-name>")?;
            let file = positional.next().ok_or("import: missing <file.csv>")?;
            Command::Import {
                config,
                deck,
                file: PathBuf::from(file),
            }
        }
        other => return Err(format!("Unknown command: {other}")),
    };

    if let Some(extra) = positional.next() {
        return Err(format!("Unexpected argument: {extra}"));
    }
    Ok(command)
}
