//! Driver binary: perft, divide and a one-shot `play` command.
//!
//! Deliberately not a UCI (or any other) protocol loop — that state
//! machine lives outside this crate. `play` calls
//! [`vantage::facade::play`] directly so book/tablebase precedence is
//! decided in exactly one place.

use std::str::FromStr;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use vantage::board::Board;
use vantage::book::PolyglotBook;
use vantage::config::EngineConfig;
use vantage::facade::{Book, play};
use vantage::moves::magic::loader::load_magic_tables;
use vantage::moves::perft::{perft, perft_divide};
use vantage::search::nnue::NnueWeights;

fn main() {
    vantage::logger::init_logging("logs/vantage.log", "info");

    let args: Vec<String> = std::env::args().collect();

    // Seed the Zobrist key table once, before any subcommand gets a chance
    // to build a `Board` — the table is a process-wide singleton, so this
    // must run first for `--seed` to actually govern hashing.
    let seed = parse_seed(&args[1..]).unwrap_or(EngineConfig::default().seed);
    vantage::hash::zobrist::init_zobrist_keys(seed);

    match args.get(1).map(String::as_str) {
        Some("perft") => cmd_perft(&args[2..]),
        Some("divide") => cmd_divide(&args[2..]),
        Some("play") => cmd_play(&args[2..], seed),
        _ => print_usage(),
    }
}

fn print_usage() {
    println!("usage:");
    println!("  vantage perft <depth> [fen]");
    println!("  vantage divide <depth> [fen]");
    println!("  vantage play <depth|movetime_ms> [fen] [--book <path>] [--nnue <path>] [--seed <n>]");
}

fn parse_seed(args: &[String]) -> Option<u64> {
    args.iter()
        .position(|a| a == "--seed")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_board(fen: Option<&String>) -> Board {
    match fen {
        Some(f) if f != "startpos" => Board::from_str(f).expect("invalid FEN"),
        _ => Board::new(),
    }
}

fn cmd_perft(args: &[String]) {
    let depth: u32 = args.first().expect("depth required").parse().expect("bad depth");
    let mut board = parse_board(args.get(1));
    let tables = load_magic_tables();

    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner} perft depth {msg}").unwrap());
    bar.set_message(depth.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));

    let start = Instant::now();
    let nodes = perft(&mut board, &tables, depth);
    bar.finish_and_clear();

    println!("nodes: {nodes}");
    println!("time: {:?}", start.elapsed());
}

fn cmd_divide(args: &[String]) {
    let depth: u32 = args.first().expect("depth required").parse().expect("bad depth");
    let mut board = parse_board(args.get(1));
    let tables = load_magic_tables();
    perft_divide(&mut board, &tables, depth);
}

fn cmd_play(args: &[String], seed: u64) {
    let limit_arg = args.first().expect("depth or movetime_ms required");
    let mut board = parse_board(args.get(1));
    let tables = load_magic_tables();
    let mut config = EngineConfig {
        seed,
        ..EngineConfig::default()
    };

    let book_path = args
        .iter()
        .position(|a| a == "--book")
        .and_then(|i| args.get(i + 1));
    let loaded_book = book_path.and_then(|p| PolyglotBook::load(p).ok());
    let book_ref: Option<&dyn Book> = loaded_book.as_ref().map(|b| b as &dyn Book);

    let nnue_path = args
        .iter()
        .position(|a| a == "--nnue")
        .and_then(|i| args.get(i + 1));
    let nnue_weights = nnue_path.and_then(|p| match NnueWeights::load(p) {
        Ok(weights) => Some(weights),
        Err(err) => {
            eprintln!("nnue load failed: {err}");
            None
        }
    });
    config.use_nnue = nnue_weights.is_some();

    // A plain integer is a depth; anything suffixed with `ms` is a time limit.
    let (max_depth, time_limit) = if let Some(ms) = limit_arg.strip_suffix("ms") {
        (64, Some(Duration::from_millis(ms.parse().expect("bad movetime"))))
    } else {
        (limit_arg.parse().expect("bad depth"), None)
    };

    let result = play(
        &mut board,
        &tables,
        &config,
        book_ref,
        None,
        nnue_weights.as_ref(),
        max_depth,
        time_limit,
    );

    println!("bestmove {}", result.best_move_uci);
    println!("score_cp {}", result.score_cp);
    println!("win_prob {:.3}", result.win_prob);
    println!("depth {} nodes {} time_ms {}", result.depth, result.nodes, result.time_ms);
    println!("pv {}", result.pv.join(" "));
    if let Some(err) = result.error {
        eprintln!("error: {err}");
    }
}
