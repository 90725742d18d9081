//! Seeded generators for test and benchmark inputs.
//!
//! Every generator is deterministic in its seed so failures reproduce.

use annex_core::Bitset;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// `rows x dim` values drawn uniformly from `[-1, 1)`, row-major.
pub fn gen_dataset(rows: usize, dim: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..rows * dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

/// A mask over `n` rows with exactly `excluded` rows set, chosen at random.
///
/// `excluded` is clamped to `n`.
pub fn gen_random_bitset(n: usize, excluded: usize, seed: u64) -> Bitset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bitset = Bitset::new(n);
    for row in sample(&mut rng, n, excluded.min(n)) {
        bitset.set(row);
    }
    bitset
}

/// Write `n x dim` vectors as a raw data file: `u32 n`, `u32 dim`, then the
/// values as little-endian `f32`.
pub fn write_raw_data(path: &Path, data: &[f32], n: usize, dim: usize) -> io::Result<()> {
    if data.len() != n * dim {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} values do not form {} rows of {}", data.len(), n, dim),
        ));
    }
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&(n as u32).to_le_bytes())?;
    writer.write_all(&(dim as u32).to_le_bytes())?;
    for value in data {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    tracing::debug!(path = %path.display(), n, dim, "wrote raw data file");
    Ok(())
}
