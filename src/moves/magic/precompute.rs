//! Magic-number search and table construction for sliding-piece attacks.
//! Invoked once at engine-context construction; attack tables are a
//! process-wide singleton turned into an explicit, constructed-once
//! collaborator, never re-run during search.

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::attacks::{
    bishop_attacks_per_square, get_bishop_attack_bitboards, get_rook_attack_bitboards,
    rook_attacks_per_square,
};
use super::search::find_magic_number_for_square;
use super::structs::{BishopMagicTables, MagicEntry, MagicTables, RookMagicTables};

pub enum MagicTableSeed {
    /// Deterministic seed, used by tests and the `deterministic_magic` feature.
    Fixed(u64),
    /// Seeded from process entropy.
    Random,
}

fn rook_mask(square: usize) -> u64 {
    let rank = square / 8;
    let file = square % 8;
    let mut mask = 0u64;
    for r in 1..7 {
        if r != rank {
            mask |= 1u64 << (r * 8 + file);
        }
    }
    for f in 1..7 {
        if f != file {
            mask |= 1u64 << (rank * 8 + f);
        }
    }
    mask
}

fn bishop_mask(square: usize) -> u64 {
    let rank = square as isize / 8;
    let file = square as isize % 8;
    let mut mask = 0u64;
    for (dr, df) in [(1, 1), (1, -1), (-1, 1), (-1, -1)] {
        let mut r = rank + dr;
        let mut f = file + df;
        while (1..7).contains(&r) && (1..7).contains(&f) {
            mask |= 1u64 << (r * 8 + f);
            r += dr;
            f += df;
        }
    }
    mask
}

/// Enumerate every blocker subset of `mask` via the carry-rippler trick.
fn blocker_subsets(mask: u64) -> Vec<u64> {
    let mut subsets = Vec::with_capacity(1 << mask.count_ones());
    let mut subset = 0u64;
    loop {
        subsets.push(subset);
        subset = subset.wrapping_sub(mask) & mask;
        if subset == 0 {
            break;
        }
    }
    subsets
}

fn build_entry<R: rand::RngCore>(
    square: usize,
    mask: u64,
    attacks_for: impl Fn(usize, u64) -> u64,
    rng: &mut R,
) -> Result<MagicEntry, String> {
    let blockers = blocker_subsets(mask);
    let attacks: Vec<u64> = blockers.iter().map(|&b| attacks_for(square, b)).collect();
    let shift = 64 - mask.count_ones();

    let magic = find_magic_number_for_square(&blockers, &attacks, shift, rng)?;

    let table_size = 1usize << mask.count_ones();
    let mut table = vec![0u64; table_size];
    for (i, &b) in blockers.iter().enumerate() {
        let index = ((b.wrapping_mul(magic)) >> shift) as usize;
        table[index] = attacks[i];
    }

    Ok(MagicEntry {
        magic,
        shift,
        mask,
        table: table.into_boxed_slice(),
    })
}

pub fn generate_magic_tables(seed: MagicTableSeed) -> Result<MagicTables, String> {
    let mut rng = match seed {
        MagicTableSeed::Fixed(s) => StdRng::seed_from_u64(s),
        MagicTableSeed::Random => StdRng::from_rng(&mut rand::rng()),
    };

    let mut rook_entries = Vec::with_capacity(64);
    let mut bishop_entries = Vec::with_capacity(64);

    for square in 0..64 {
        let rmask = rook_mask(square);
        rook_entries.push(build_entry(square, rmask, rook_attacks_per_square, &mut rng)?);

        let bmask = bishop_mask(square);
        bishop_entries.push(build_entry(
            square,
            bmask,
            bishop_attacks_per_square,
            &mut rng,
        )?);
    }

    // Silence "unused" if a future refactor drops the batch helpers; kept for
    // parity with the scan-based batch generators used by magic-search tests.
    let _ = get_rook_attack_bitboards(0, &[0]);
    let _ = get_bishop_attack_bitboards(0, &[0]);

    Ok(MagicTables {
        rook: RookMagicTables {
            entries: rook_entries,
        },
        bishop: BishopMagicTables {
            entries: bishop_entries,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_seed_is_deterministic() {
        let a = generate_magic_tables(MagicTableSeed::Fixed(0x45)).unwrap();
        let b = generate_magic_tables(MagicTableSeed::Fixed(0x45)).unwrap();
        for sq in 0..64 {
            assert_eq!(a.rook.entries[sq].magic, b.rook.entries[sq].magic);
            assert_eq!(a.bishop.entries[sq].magic, b.bishop.entries[sq].magic);
        }
    }

    #[test]
    fn rook_mask_excludes_edges() {
        let mask = rook_mask(0); // a1
        assert_eq!(mask & 0x8000_0000_0000_0001, 0);
    }
}
