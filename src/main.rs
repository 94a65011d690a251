use std::io::{self, BufRead, Write};
use std::sync::Arc;

use recall::card::{self, Deck};
use recall::clock::{Clock, SystemClock};
use recall::config::{self, Command, Config};
use recall::error::{Error, StoreError};
use recall::schedule::Feedback;
use recall::select::{self, DeckSummary};
use recall::session::SessionManager;
use recall::store::{self, CardStore, DeckStore, FileStore, MemoryStore, Store};
use recall::{deck, web};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match config::parse_args(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("{}", config::USAGE);
            std::process::exit(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => fail(&format!("Could not start runtime: {e}")),
    };

    let result = match command {
        Command::Serve(config) => serve(&rt, &config),
        Command::Drill(config) => drill(&rt, &config),
        Command::Import { config, deck, file } => import(&rt, &config, &deck, &file),
        Command::Decks(config) => list_decks(&rt, &config),
    };
    if let Err(e) = result {
        fail(&e.to_string());
    }
}

fn fail(msg: &str) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

fn serve(rt: &tokio::runtime::Runtime, config: &Config) -> recall::Result<()> {
    let files = FileStore::open(&config.data_dir)?;
    if config.in_memory {
        let (decks, cards) = files.snapshot();
        run_server(rt, Arc::new(MemoryStore::with_data(decks, cards)), config)
    } else {
        run_server(rt, Arc::new(files), config)
    }
}

fn run_server<S: Store>(
    rt: &tokio::runtime::Runtime,
    store: Arc<S>,
    config: &Config,
) -> recall::Result<()> {
    let sessions = SessionManager::new(store, config.due_policy);
    log::info!("Due policy: {:?}", sessions.policy());
    let state = Arc::new(web::AppState::new(sessions, Arc::new(SystemClock)));
    rt.block_on(web::serve(state, config.port))
        .map_err(|e| Error::Store(StoreError::Io(e)))
}

fn summaries(
    rt: &tokio::runtime::Runtime,
    store: &FileStore,
) -> recall::Result<Vec<(Deck, DeckSummary)>> {
    let now = SystemClock.now();
    let decks = rt.block_on(store.list_decks())?;
    let mut out = Vec::with_capacity(decks.len());
    for d in decks {
        let cards = rt.block_on(store.list_cards_by_deck(&d.id))?;
        let summary = select::summarize(&d, &cards, now);
        out.push((d, summary));
    }
    Ok(out)
}

fn list_decks(rt: &tokio::runtime::Runtime, config: &Config) -> recall::Result<()> {
    let store = FileStore::open(&config.data_dir)?;
    let summaries = summaries(rt, &store)?;
    if summaries.is_empty() {
        println!("No decks yet. Add some with `recall import`.");
        return Ok(());
    }
    for (d, s) in &summaries {
        println!(
            "{} ({} due / {} total, count {})",
            s.name, s.due, s.total, d.card_count
        );
    }
    Ok(())
}

fn import(
    rt: &tokio::runtime::Runtime,
    config: &Config,
    deck_name: &str,
    file: &std::path::Path,
) -> recall::Result<()> {
    let store = FileStore::open(&config.data_dir)?;
    let cards = store::file::import_csv(file)?;
    if cards.is_empty() {
        println!("No cards found in {}.", file.display());
        return Ok(());
    }

    let now = SystemClock.now();
    let existing = rt
        .block_on(store.list_decks())?
        .into_iter()
        .find(|d| d.name.eq_ignore_ascii_case(deck_name));
    let target = match existing {
        Some(d) => d,
        None => rt.block_on(deck::create_deck(&store, deck_name, "", now))?,
    };

    let added = rt.block_on(deck::add_cards(&store, &target.id, cards, now))?;
    println!("Imported {} cards into {}.", added.len(), target.name);
    Ok(())
}

fn drill(rt: &tokio::runtime::Runtime, config: &Config) -> recall::Result<()> {
    let store = Arc::new(FileStore::open(&config.data_dir)?);
    let summaries = summaries(rt, &store)?;
    if summaries.is_empty() {
        println!("No decks yet. Add some with `recall import`.");
        return Ok(());
    }

    println!("Decks:");
    for (i, (_, s)) in summaries.iter().enumerate() {
        println!("  {}: {} ({} due / {} total)", i + 1, s.name, s.due, s.total);
    }
    println!();

    let stdin = io::stdin();
    let mut stdin = stdin.lock();
    let chosen = prompt_deck_selection(&mut stdin, summaries.len());
    let deck_id = summaries[chosen].0.id.clone();

    let clock = SystemClock;
    let sessions = SessionManager::new(Arc::clone(&store), config.due_policy);
    let mut view = match rt.block_on(sessions.start_session(&deck_id, clock.now())) {
        Ok(v) => v,
        Err(Error::EmptyDeck(_)) => {
            println!("That deck has no cards.");
            return Ok(());
        }
        Err(Error::NothingDue(_)) => {
            println!("No cards due for review.");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    println!("{} cards to review.\n", view.total);

    let mut buf = String::new();
    while let Some(current) = view.current_card.clone() {
        println!("[{}/{}]", view.current_index + 1, view.total);
        println!();
        println!("{}", card::expand_newlines(&current.front));
        println!();

        print!("Press Enter to reveal...");
        let _ = io::stdout().flush();
        buf.clear();
        if stdin.read_line(&mut buf).unwrap_or(0) == 0 {
            break;
        }

        println!("{}", card::expand_newlines(&current.back));
        println!();

        let feedback = loop {
            print!("Rate (1=again, 2=hard, 3=good): ");
            let _ = io::stdout().flush();
            buf.clear();
            if stdin.read_line(&mut buf).unwrap_or(0) == 0 {
                return Ok(());
            }
            if let Some(f) = buf.trim().chars().next().and_then(Feedback::from_key) {
                break f;
            }
            println!("Please enter 1, 2, or 3.");
        };

        match rt.block_on(sessions.submit_feedback(&view.session_id, feedback, clock.now())) {
            Ok(result) => println!(
                "{} - next review in {} days\n",
                feedback.name(),
                result.interval_days
            ),
            Err(Error::CardRemoved(_)) => {
                println!("That card was deleted elsewhere; skipping it.\n");
            }
            Err(e) if e.is_retryable() => {
                eprintln!("Could not save review ({e}); showing the card again.\n");
            }
            Err(e) => return Err(e),
        }
        view = sessions.session_state(&view.session_id)?;
    }

    let tally = view.tally;
    println!("Session complete!");
    println!(
        "  Good: {}, Hard: {}, Again: {}",
        tally.correct, tally.hard, tally.again
    );
    Ok(())
}

fn prompt_deck_selection(stdin: &mut impl BufRead, count: usize) -> usize {
    loop {
        print!("Select a deck (1-{count}): ");
        let _ = io::stdout().flush();
        let mut buf = String::new();
        if stdin.read_line(&mut buf).unwrap_or(0) == 0 {
            std::process::exit(0);
        }
        match buf.trim().parse::<usize>() {
            Ok(n) if n >= 1 && n <= count => return n - 1,
            _ => println!("Invalid selection. Try again."),
        }
    }
}
