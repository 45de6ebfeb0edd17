//! Structural validation of an alignment.
//!
//! Checks the invariants a well-formed file must satisfy: segment tiling,
//! parent/child reciprocity, paralogy-ring closure, parse consistency,
//! tree consistency, and DNA length. Validation failures are
//! `InvariantViolation` errors naming the offending genome and segment.

use std::collections::HashSet;

use log::debug;

use crate::alignment::Alignment;
use crate::error::{HalError, Result};
use crate::segment::NULL_INDEX;
use crate::tree::GenomeId;

/// Validate every genome; first failure wins.
pub fn validate(aln: &Alignment) -> Result<()> {
    for id in aln.tree().ids() {
        validate_genome(aln, id)?;
    }
    debug!("validated {} genomes", aln.num_genomes());
    Ok(())
}

pub fn validate_genome(aln: &Alignment, id: GenomeId) -> Result<()> {
    let tree = aln.tree();
    let genome = aln.genome(id);
    let name = genome.name();

    // sequences tile [0, length) in insertion order
    let mut expect = 0i64;
    for seq in genome.sequences() {
        if seq.start != expect {
            return Err(HalError::InvariantViolation(format!(
                "genome {name}: sequence {} starts at {} instead of {expect}",
                seq.name, seq.start
            )));
        }
        expect += seq.length as i64;
    }
    if expect as u64 != genome.length() {
        return Err(HalError::InvariantViolation(format!(
            "genome {name}: sequences cover {expect} of {} bases",
            genome.length()
        )));
    }
    if genome.dna().len() != genome.length() {
        return Err(HalError::InvariantViolation(format!(
            "genome {name}: dna array holds {} bases, genome length is {}",
            genome.dna().len(),
            genome.length()
        )));
    }

    if tree.parent(id).is_none() && genome.num_top_segments() > 0 {
        return Err(HalError::InvariantViolation(format!(
            "genome {name} has no parent but carries top segments"
        )));
    }
    if tree.num_children(id) != genome.num_child_slots() && genome.num_bottom_segments() > 0 {
        return Err(HalError::InvariantViolation(format!(
            "genome {name}: {} child slots vs {} tree children",
            genome.num_child_slots(),
            tree.num_children(id)
        )));
    }

    validate_tiling(aln, id)?;
    validate_reciprocity(aln, id)?;
    validate_paralogy_rings(aln, id)?;
    validate_parse_indices(aln, id)?;

    for &child in tree.children(id) {
        if tree.branch_length(child) < 0.0 {
            return Err(HalError::InvariantViolation(format!(
                "negative branch length above {}",
                tree.name(child)
            )));
        }
    }
    Ok(())
}

/// Consecutive segments tile `[0, len)` with no gap or overlap.
fn validate_tiling(aln: &Alignment, id: GenomeId) -> Result<()> {
    let genome = aln.genome(id);
    let name = genome.name();
    let mut check = |side: &str, segs: Vec<(i64, u64)>| -> Result<()> {
        if segs.is_empty() {
            return Ok(());
        }
        let mut expect = 0i64;
        for (i, (start, length)) in segs.iter().enumerate() {
            if *start != expect {
                return Err(HalError::InvariantViolation(format!(
                    "genome {name}: {side} segment {i} starts at {start}, expected {expect}"
                )));
            }
            if *length == 0 {
                return Err(HalError::InvariantViolation(format!(
                    "genome {name}: {side} segment {i} has zero length"
                )));
            }
            expect += *length as i64;
        }
        if expect as u64 != genome.length() {
            return Err(HalError::InvariantViolation(format!(
                "genome {name}: {side} segments cover {expect} of {} bases",
                genome.length()
            )));
        }
        Ok(())
    };
    check(
        "top",
        genome.tops().iter().map(|t| (t.start, t.length)).collect(),
    )?;
    check(
        "bottom",
        genome.bottoms().iter().map(|b| (b.start, b.length)).collect(),
    )
}

/// Parent links are mutual (through the paralogy ring) and lengths
/// match; child links point back at segments naming this parent index.
fn validate_reciprocity(aln: &Alignment, id: GenomeId) -> Result<()> {
    let tree = aln.tree();
    let genome = aln.genome(id);
    let name = genome.name();

    if let Some(parent_id) = tree.parent(id) {
        let parent = aln.genome(parent_id);
        let slot = tree.child_slot(parent_id, id)?;
        for (i, top) in genome.tops().iter().enumerate() {
            if !top.has_parent() {
                continue;
            }
            if top.parent_index < 0 || top.parent_index as usize >= parent.num_bottom_segments() {
                return Err(HalError::InvariantViolation(format!(
                    "genome {name}: top segment {i} parent index {} out of range",
                    top.parent_index
                )));
            }
            let bottom = parent.bottom(top.parent_index as usize);
            if bottom.length != top.length {
                return Err(HalError::InvariantViolation(format!(
                    "genome {name}: top segment {i} length {} != parent segment length {}",
                    top.length, bottom.length
                )));
            }
            let canonical = bottom.children[slot].index;
            if canonical == NULL_INDEX {
                return Err(HalError::InvariantViolation(format!(
                    "genome {name}: top segment {i} maps to a parent segment with no link back"
                )));
            }
            // the canonical member must be on segment i's paralogy ring
            if canonical != i as i64 {
                let mut cur = top.next_paralogy_index;
                let mut steps = 0usize;
                let mut found = false;
                while cur != NULL_INDEX && cur != i as i64 {
                    if cur == canonical {
                        found = true;
                        break;
                    }
                    cur = genome.top(cur as usize).next_paralogy_index;
                    steps += 1;
                    if steps > genome.num_top_segments() {
                        break;
                    }
                }
                if !found {
                    return Err(HalError::InvariantViolation(format!(
                        "genome {name}: top segment {i} is not on its canonical paralog's ring"
                    )));
                }
            } else if bottom.children[slot].reversed != top.parent_reversed {
                return Err(HalError::InvariantViolation(format!(
                    "genome {name}: top segment {i} disagrees with parent about orientation"
                )));
            }
        }
    }

    for (slot, &child_id) in tree.children(id).iter().enumerate() {
        let child = aln.genome(child_id);
        for (i, bottom) in genome.bottoms().iter().enumerate() {
            let link = bottom.children[slot];
            if link.index == NULL_INDEX {
                continue;
            }
            if link.index < 0 || link.index as usize >= child.num_top_segments() {
                return Err(HalError::InvariantViolation(format!(
                    "genome {name}: bottom segment {i} child index {} out of range",
                    link.index
                )));
            }
            let top = child.top(link.index as usize);
            if top.parent_index != i as i64 {
                return Err(HalError::InvariantViolation(format!(
                    "genome {name}: bottom segment {i} names child segment {} which points to {}",
                    link.index, top.parent_index
                )));
            }
            if top.length != bottom.length {
                return Err(HalError::InvariantViolation(format!(
                    "genome {name}: bottom segment {i} length {} != child segment length {}",
                    bottom.length, top.length
                )));
            }
        }
    }
    Ok(())
}

/// Every ring closes, members share one parent, and exactly one
/// member is canonical.
fn validate_paralogy_rings(aln: &Alignment, id: GenomeId) -> Result<()> {
    let tree = aln.tree();
    let genome = aln.genome(id);
    let name = genome.name();
    let Some(parent_id) = tree.parent(id) else {
        return Ok(());
    };
    let parent = aln.genome(parent_id);
    let slot = tree.child_slot(parent_id, id)?;

    let mut seen: HashSet<i64> = HashSet::new();
    for (i, top) in genome.tops().iter().enumerate() {
        if !top.has_next_paralogy() || seen.contains(&(i as i64)) {
            continue;
        }
        let anchor = i as i64;
        let parent_index = top.parent_index;
        let mut canonical_count = 0usize;
        let mut cur = anchor;
        let mut steps = 0usize;
        loop {
            seen.insert(cur);
            let rec = genome.top(cur as usize);
            if rec.parent_index != parent_index {
                return Err(HalError::InvariantViolation(format!(
                    "genome {name}: paralogy ring through {anchor} mixes parent segments"
                )));
            }
            if parent.bottom(parent_index as usize).children[slot].index == cur {
                canonical_count += 1;
            }
            cur = rec.next_paralogy_index;
            if cur == NULL_INDEX {
                return Err(HalError::InvariantViolation(format!(
                    "genome {name}: paralogy ring through {anchor} is not a cycle"
                )));
            }
            if cur == anchor {
                break;
            }
            steps += 1;
            if steps > genome.num_top_segments() {
                return Err(HalError::InvariantViolation(format!(
                    "genome {name}: paralogy ring through {anchor} never returns"
                )));
            }
        }
        if canonical_count != 1 {
            return Err(HalError::InvariantViolation(format!(
                "genome {name}: paralogy ring through {anchor} has {canonical_count} canonical members"
            )));
        }
    }
    Ok(())
}

/// Parse indices on both sides point at the
/// segment of the other side covering their start position.
fn validate_parse_indices(aln: &Alignment, id: GenomeId) -> Result<()> {
    let genome = aln.genome(id);
    let name = genome.name();
    let both = genome.num_top_segments() > 0 && genome.num_bottom_segments() > 0;
    for (i, top) in genome.tops().iter().enumerate() {
        if !both {
            if top.bottom_parse_index != NULL_INDEX {
                return Err(HalError::InvariantViolation(format!(
                    "genome {name}: top segment {i} has a parse index but no bottom segments"
                )));
            }
            continue;
        }
        let b = top.bottom_parse_index;
        if b < 0 || b as usize >= genome.num_bottom_segments() {
            return Err(HalError::InvariantViolation(format!(
                "genome {name}: top segment {i} parse index {b} out of range"
            )));
        }
        let bottom = genome.bottom(b as usize);
        if top.start < bottom.start || top.start >= bottom.start + bottom.length as i64 {
            return Err(HalError::InvariantViolation(format!(
                "genome {name}: top segment {i} parse index {b} does not cover its start"
            )));
        }
    }
    for (i, bottom) in genome.bottoms().iter().enumerate() {
        if !both {
            if bottom.top_parse_index != NULL_INDEX {
                return Err(HalError::InvariantViolation(format!(
                    "genome {name}: bottom segment {i} has a parse index but no top segments"
                )));
            }
            continue;
        }
        let t = bottom.top_parse_index;
        if t < 0 || t as usize >= genome.num_top_segments() {
            return Err(HalError::InvariantViolation(format!(
                "genome {name}: bottom segment {i} parse index {t} out of range"
            )));
        }
        let top = genome.top(t as usize);
        if bottom.start < top.start || bottom.start >= top.start + top.length as i64 {
            return Err(HalError::InvariantViolation(format!(
                "genome {name}: bottom segment {i} parse index {t} does not cover its start"
            )));
        }
    }
    Ok(())
}
