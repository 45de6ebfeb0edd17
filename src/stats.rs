//! Summary statistics: genome table, sampled coverage and identity.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::alignment::Alignment;
use crate::error::Result;
use crate::liftover::lift_range;
use crate::mapped_segment::MapOptions;
use crate::tree::GenomeId;

#[derive(Debug, Clone)]
pub struct GenomeStats {
    pub name: String,
    pub num_children: usize,
    pub length: u64,
    pub num_sequences: usize,
    pub num_top_segments: usize,
    pub num_bottom_segments: usize,
}

pub fn genome_table(aln: &Alignment) -> Vec<GenomeStats> {
    aln.tree()
        .ids()
        .map(|id| {
            let g = aln.genome(id);
            GenomeStats {
                name: g.name().to_string(),
                num_children: aln.tree().num_children(id),
                length: g.length(),
                num_sequences: g.num_sequences(),
                num_top_segments: g.num_top_segments(),
                num_bottom_segments: g.num_bottom_segments(),
            }
        })
        .collect()
}

impl fmt::Display for GenomeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}, {}, {}",
            self.name,
            self.num_children,
            self.length,
            self.num_sequences,
            self.num_top_segments,
            self.num_bottom_segments
        )
    }
}

/// Fraction of `num_samples` random reference positions with at least one
/// homolog in `target`.
pub fn sampled_coverage(
    aln: &Alignment,
    reference: GenomeId,
    target: GenomeId,
    num_samples: u64,
    seed: u64,
) -> Result<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let len = aln.genome(reference).length();
    if len == 0 || num_samples == 0 {
        return Ok(0.0);
    }
    let opts = MapOptions::default();
    let mut covered = 0u64;
    for _ in 0..num_samples {
        let pos = rng.gen_range(0..len) as i64;
        if !lift_range(aln, reference, pos, 1, target, &opts)?.is_empty() {
            covered += 1;
        }
    }
    Ok(covered as f64 / num_samples as f64)
}

/// Fraction of sampled aligned bases whose characters agree between
/// reference and target (orientation-aware). Returns `None` when no
/// sampled position aligns.
pub fn sampled_identity(
    aln: &Alignment,
    reference: GenomeId,
    target: GenomeId,
    num_samples: u64,
    seed: u64,
) -> Result<Option<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let len = aln.genome(reference).length();
    if len == 0 || num_samples == 0 {
        return Ok(None);
    }
    let opts = MapOptions::default();
    let mut aligned = 0u64;
    let mut same = 0u64;
    for _ in 0..num_samples {
        let pos = rng.gen_range(0..len) as i64;
        for seg in lift_range(aln, reference, pos, 1, target, &opts)? {
            let src = seg.source().string()?;
            let tgt = seg.target().string()?;
            for (a, b) in src.chars().zip(tgt.chars()) {
                aligned += 1;
                if a.eq_ignore_ascii_case(&b) {
                    same += 1;
                }
            }
        }
    }
    if aligned == 0 {
        Ok(None)
    } else {
        Ok(Some(same as f64 / aligned as f64))
    }
}
