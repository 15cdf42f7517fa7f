//! Entry point for obtaining a `MagicTables` value at engine start-up.
//!
//! Under `load_magic`, a precomputed table is deserialized from disk
//! (`magic_tables.bin`, next to the binary) if present — the tables are
//! `serde`-derived precisely so this round trip is possible. Otherwise (the
//! default) the tables are generated on the fly via magic-number search,
//! seeded deterministically under `deterministic_magic` so perft/search
//! output is reproducible across runs.

use std::fs::File;
use std::io::BufReader;

use super::precompute::{MagicTableSeed, generate_magic_tables};
use super::structs::MagicTables;

const MAGIC_TABLE_PATH: &str = "magic_tables.bin";

fn generate() -> MagicTables {
    #[cfg(feature = "deterministic_magic")]
    let seed = MagicTableSeed::Fixed(0x51A1_CBEE_F000_0045);
    #[cfg(not(feature = "deterministic_magic"))]
    let seed = MagicTableSeed::Random;

    generate_magic_tables(seed).expect("magic-number search failed")
}

#[cfg(feature = "load_magic")]
fn load_from_disk() -> Option<MagicTables> {
    let file = File::open(MAGIC_TABLE_PATH).ok()?;
    bincode::deserialize_from(BufReader::new(file)).ok()
}

#[cfg(not(feature = "load_magic"))]
fn load_from_disk() -> Option<MagicTables> {
    None
}

pub fn load_magic_tables() -> MagicTables {
    load_from_disk().unwrap_or_else(generate)
}
