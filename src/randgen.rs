//! Seeded random alignment generation.
//!
//! Builds arbitrary well-formed alignments for tests and benchmarks: a
//! random tree, a random segmentation per branch point, and random
//! inversions, deletions, and duplications (with proper paralogy rings)
//! on every branch. The same seed always produces the same file.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::alignment::Alignment;
use crate::error::Result;
use crate::segment::NULL_INDEX;
use crate::sequence::SequenceInfo;
use crate::tree::GenomeId;

#[derive(Debug, Clone)]
pub struct RandGenOptions {
    pub max_genomes: usize,
    /// Average number of children per internal node.
    pub mean_degree: f64,
    pub max_branch_length: f64,
    pub min_segments: usize,
    pub max_segments: usize,
    pub min_segment_length: u64,
    pub max_segment_length: u64,
    pub inversion_prob: f64,
    pub deletion_prob: f64,
    pub duplication_prob: f64,
    pub seed: u64,
}

impl Default for RandGenOptions {
    fn default() -> Self {
        RandGenOptions {
            max_genomes: 5,
            mean_degree: 2.0,
            max_branch_length: 0.1,
            min_segments: 2,
            max_segments: 10,
            min_segment_length: 2,
            max_segment_length: 20,
            inversion_prob: 0.1,
            deletion_prob: 0.05,
            duplication_prob: 0.05,
            seed: 0,
        }
    }
}

const BASES: [char; 4] = ['A', 'C', 'G', 'T'];

fn random_dna(rng: &mut StdRng, len: u64) -> String {
    (0..len).map(|_| BASES[rng.gen_range(0..4)]).collect()
}

/// Populate an empty alignment with random but well-formed content.
pub fn create_random_alignment(aln: &mut Alignment, opts: &RandGenOptions) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(opts.seed);

    // random tree, breadth-first
    aln.add_root_genome("Genome_0")?;
    let mut frontier = vec!["Genome_0".to_string()];
    let mut count = 1usize;
    while count < opts.max_genomes && !frontier.is_empty() {
        let parent = frontier.remove(0);
        let max_kids = (2.0 * opts.mean_degree).ceil() as usize;
        let mut kids = rng.gen_range(0..=max_kids.max(1));
        if count == 1 {
            kids = kids.max(1); // never leave the root childless
        }
        for _ in 0..kids {
            if count >= opts.max_genomes {
                break;
            }
            let name = format!("Genome_{count}");
            let branch = rng.gen_range(0.0..opts.max_branch_length.max(f64::MIN_POSITIVE));
            aln.add_leaf_genome(&name, &parent, branch)?;
            frontier.push(name);
            count += 1;
        }
    }
    debug!("random tree: {}", aln.newick());

    // root segmentation
    let root = aln.root_id()?;
    let num_segments = rng.gen_range(opts.min_segments..=opts.max_segments).max(1);
    let lengths: Vec<u64> = (0..num_segments)
        .map(|_| rng.gen_range(opts.min_segment_length..=opts.max_segment_length).max(1))
        .collect();
    let total: u64 = lengths.iter().sum();
    let root_name = aln.genome(root).name().to_string();
    let root_bottoms = if aln.tree().num_children(root) > 0 {
        num_segments as u64
    } else {
        0
    };
    aln.set_genome_dimensions(
        &root_name,
        &[SequenceInfo::new("rootseq", total, 0, root_bottoms)],
    )?;
    {
        let g = aln.genome_mut(root)?;
        let dna = random_dna(&mut rng, total);
        g.set_string(&dna)?;
        let mut start = 0i64;
        for i in 0..root_bottoms as usize {
            let b = g.bottom_mut(i);
            b.start = start;
            b.length = lengths[i];
            start += lengths[i] as i64;
        }
    }

    // evolve each child from its parent's bottom segmentation
    let order: Vec<GenomeId> = breadth_first(aln, root);
    for &gid in &order[1..] {
        evolve_child(aln, gid, opts, &mut rng)?;
    }
    Ok(())
}

fn breadth_first(aln: &Alignment, root: GenomeId) -> Vec<GenomeId> {
    let mut order = vec![root];
    let mut i = 0;
    while i < order.len() {
        order.extend_from_slice(aln.tree().children(order[i]));
        i += 1;
    }
    order
}

/// Copy fate for one parent segment on one branch.
enum Fate {
    Deleted,
    Copies(Vec<bool>), // one reversed flag per copy; >1 means duplication
}

fn evolve_child(
    aln: &mut Alignment,
    gid: GenomeId,
    opts: &RandGenOptions,
    rng: &mut StdRng,
) -> Result<()> {
    let parent_id = aln.tree().parent(gid).expect("child genome has a parent");
    let slot = aln.tree().child_slot(parent_id, gid)?;
    let name = aln.genome(gid).name().to_string();
    let num_children = aln.tree().num_children(gid);

    // plan the branch
    let parent_segments: Vec<(u64, usize)> = aln
        .genome(parent_id)
        .bottoms()
        .iter()
        .enumerate()
        .map(|(i, b)| (b.length, i))
        .collect();
    let mut fates: Vec<Fate> = Vec::with_capacity(parent_segments.len());
    let mut num_tops = 0usize;
    let mut child_len = 0u64;
    for &(len, _) in &parent_segments {
        let fate = if rng.gen_bool(opts.deletion_prob) {
            Fate::Deleted
        } else {
            let copies = if rng.gen_bool(opts.duplication_prob) {
                rng.gen_range(2..=3)
            } else {
                1
            };
            Fate::Copies(
                (0..copies)
                    .map(|_| rng.gen_bool(opts.inversion_prob))
                    .collect(),
            )
        };
        if let Fate::Copies(copies) = &fate {
            num_tops += copies.len();
            child_len += len * copies.len() as u64;
        }
        fates.push(fate);
    }
    if num_tops == 0 {
        // a genome can't be empty; keep one copy of the first segment
        fates[0] = Fate::Copies(vec![false]);
        num_tops = 1;
        child_len = parent_segments[0].0;
    }

    // ancestors get their own bottom segmentation over the same length
    let bottom_lengths: Vec<u64> = if num_children > 0 {
        let mut lens = Vec::new();
        let mut remaining = child_len;
        while remaining > 0 {
            let hi = opts.max_segment_length.min(remaining);
            let lo = opts.min_segment_length.min(hi);
            let len = rng.gen_range(lo..=hi).max(1);
            lens.push(len);
            remaining -= len;
        }
        lens
    } else {
        Vec::new()
    };

    aln.set_genome_dimensions(
        &name,
        &[SequenceInfo::new(
            format!("{name}_seq"),
            child_len,
            num_tops as u64,
            bottom_lengths.len() as u64,
        )],
    )?;

    // write the child's arrays
    let dna = random_dna(rng, child_len);
    {
        let g = aln.genome_mut(gid)?;
        g.set_string(&dna)?;
        let mut start = 0i64;
        for (i, &len) in bottom_lengths.iter().enumerate() {
            let b = g.bottom_mut(i);
            b.start = start;
            b.length = len;
            start += len as i64;
        }
    }

    let mut top_idx = 0usize;
    let mut start = 0i64;
    for (pi, fate) in fates.iter().enumerate() {
        let len = parent_segments[pi].0;
        match fate {
            Fate::Deleted => {
                let parent = aln.genome_mut(parent_id)?;
                parent.bottom_mut(pi).children[slot] = crate::segment::ChildRef::NULL;
            }
            Fate::Copies(copies) => {
                let first = top_idx as i64;
                for (c, &reversed) in copies.iter().enumerate() {
                    let g = aln.genome_mut(gid)?;
                    let t = g.top_mut(top_idx);
                    t.start = start;
                    t.length = len;
                    t.parent_index = pi as i64;
                    t.parent_reversed = reversed;
                    t.next_paralogy_index = if copies.len() > 1 {
                        first + ((c as i64 + 1) % copies.len() as i64)
                    } else {
                        NULL_INDEX
                    };
                    start += len as i64;
                    top_idx += 1;
                }
                let canonical_reversed = copies[0];
                let parent = aln.genome_mut(parent_id)?;
                let link = &mut parent.bottom_mut(pi).children[slot];
                link.index = first;
                link.reversed = canonical_reversed;
            }
        }
    }

    aln.genome_mut(gid)?.rebuild_parse_indices();
    Ok(())
}
