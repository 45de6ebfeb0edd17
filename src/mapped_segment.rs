//! Homology mapping between arbitrary genomes.
//!
//! A mapped segment pairs a source slice with the homologous target slice;
//! the engine walks source segments up to the MRCA, expands paralogs up to
//! the coalescence limit, and walks back down to the target, composing
//! orientation at every step and keeping the output pairwise-disjoint in
//! target coordinates.

use std::cmp::Ordering;

use crate::error::{HalError, Result};
use crate::genome::Genome;
use crate::segment_iter::SegmentIterator;
use crate::tree::GenomeId;

#[derive(Clone, Copy, Debug)]
pub struct MappedSegment<'a> {
    source: SegmentIterator<'a>,
    target: SegmentIterator<'a>,
}

/// Knobs for `map_segments`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapOptions {
    /// Follow paralogy rings, reporting duplications.
    pub do_dupes: bool,
    /// Drop mappings shorter than this many bases.
    pub min_length: u64,
    /// Report paralogs whose coalescence is at or below this ancestor;
    /// defaults to the MRCA of source and target.
    pub coalescence_limit: Option<GenomeId>,
    /// Precomputed MRCA, if the caller already knows it.
    pub mrca: Option<GenomeId>,
}

impl<'a> MappedSegment<'a> {
    pub fn new(source: SegmentIterator<'a>, target: SegmentIterator<'a>) -> Self {
        debug_assert_eq!(source.length(), target.length());
        MappedSegment { source, target }
    }

    pub fn source(&self) -> &SegmentIterator<'a> {
        &self.source
    }

    pub fn target(&self) -> &SegmentIterator<'a> {
        &self.target
    }

    pub fn genome(&self) -> &'a Genome {
        self.target.genome()
    }

    pub fn length(&self) -> u64 {
        debug_assert_eq!(self.source.length(), self.target.length());
        self.target.length()
    }

    pub fn start_position(&self) -> i64 {
        self.target.start_position()
    }

    pub fn end_position(&self) -> i64 {
        self.target.end_position()
    }

    pub fn reversed(&self) -> bool {
        self.target.reversed()
    }

    /// Swap which side counts as source.
    pub fn flip(&mut self) {
        std::mem::swap(&mut self.source, &mut self.target);
    }

    /// Reverse both sides, keeping the pairing.
    pub fn full_reverse(&mut self) {
        self.source
            .slice(self.source.end_offset(), self.source.start_offset());
        self.source.to_reverse();
        self.target
            .slice(self.target.end_offset(), self.target.start_offset());
        self.target.to_reverse();
        debug_assert_eq!(self.source.length(), self.target.length());
    }

    /// Slice the target; the source narrows by the same deltas so both
    /// sides stay equal length.
    pub fn slice(&mut self, start_offset: u64, end_offset: u64) {
        let start_delta = start_offset as i64 - self.target.start_offset() as i64;
        let end_delta = end_offset as i64 - self.target.end_offset() as i64;
        self.target.slice(start_offset, end_offset);
        self.source.slice(
            (self.source.start_offset() as i64 + start_delta) as u64,
            (self.source.end_offset() as i64 + end_delta) as u64,
        );
        debug_assert_eq!(self.source.length(), self.target.length());
    }
}

/// Compare two slices of the same genome by normalized (min, max)
/// positions. Orientation is ignored; only the interval matters.
fn comp_iter(a: &SegmentIterator<'_>, b: &SegmentIterator<'_>) -> Ordering {
    debug_assert_eq!(a.genome_id(), b.genome_id());
    let (mut sa, mut ea) = (a.start_position(), a.end_position());
    if a.reversed() {
        std::mem::swap(&mut sa, &mut ea);
    }
    let (mut sb, mut eb) = (b.start_position(), b.end_position());
    if b.reversed() {
        std::mem::swap(&mut sb, &mut eb);
    }
    sa.cmp(&sb).then(ea.cmp(&eb))
}

/// Source-major order: the view the public API returns.
pub fn cmp_by_source(a: &MappedSegment<'_>, b: &MappedSegment<'_>) -> Ordering {
    comp_iter(&a.source, &b.source).then_with(|| comp_iter(&a.target, &b.target))
}

/// Target-major order, used internally during overlap breaking.
fn cmp_by_target(a: &MappedSegment<'_>, b: &MappedSegment<'_>) -> Ordering {
    comp_iter(&a.target, &b.target).then_with(|| comp_iter(&a.source, &b.source))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OverlapCat {
    Disjoint,
    Same,
    AContainsB,
    BContainsA,
    AOverlapsLeftOfB,
    BOverlapsLeftOfA,
}

fn target_bounds(seg: &MappedSegment<'_>) -> (i64, i64) {
    let (mut s, mut e) = (seg.start_position(), seg.end_position());
    if s > e {
        std::mem::swap(&mut s, &mut e);
    }
    (s, e)
}

fn slow_overlap(a: &MappedSegment<'_>, b: &MappedSegment<'_>) -> OverlapCat {
    let (start_a, end_a) = target_bounds(a);
    let (start_b, end_b) = target_bounds(b);
    if end_a < start_b || start_a > end_b {
        OverlapCat::Disjoint
    } else if start_a == start_b && end_a == end_b {
        OverlapCat::Same
    } else if start_a >= start_b && end_a <= end_b {
        OverlapCat::BContainsA
    } else if start_b >= start_a && end_b <= end_a {
        OverlapCat::AContainsB
    } else if start_a <= start_b && end_a < end_b {
        OverlapCat::AOverlapsLeftOfB
    } else {
        debug_assert!(start_b <= start_a && end_b < end_a);
        OverlapCat::BOverlapsLeftOfA
    }
}

/// Cut `seg_a` at its intersection points with `seg_b`. `seg_a` keeps its
/// leftmost piece; any middle/right pieces are returned.
fn clip_a_against_b<'a>(
    seg_a: &mut MappedSegment<'a>,
    seg_b: &MappedSegment<'a>,
    cat: OverlapCat,
) -> Vec<MappedSegment<'a>> {
    debug_assert!(matches!(
        cat,
        OverlapCat::AContainsB | OverlapCat::AOverlapsLeftOfB | OverlapCat::BOverlapsLeftOfA
    ));
    let (start_a, end_a) = target_bounds(seg_a);
    let (start_b, end_b) = target_bounds(seg_b);

    let start_o = seg_a.target.start_offset() as i64;
    let end_o = seg_a.target.end_offset() as i64;
    let length = seg_a.length() as i64;
    let left_size = (start_b - start_a).max(0);
    let right_size = (end_a - end_b).max(0);
    let middle_size = length - left_size - right_size;
    debug_assert!(left_size >= 0 && right_size >= 0 && middle_size >= 0);

    let mut out = Vec::new();
    let template = *seg_a;

    let apply = |seg: &mut MappedSegment<'a>, left_slice: i64, right_slice: i64| {
        let (mut ls, mut rs) = (left_slice, right_slice);
        if seg.reversed() {
            std::mem::swap(&mut ls, &mut rs);
        }
        seg.slice((start_o + ls) as u64, (end_o + rs) as u64);
    };

    if left_size > 0 {
        apply(seg_a, 0, length - left_size);
        debug_assert_eq!(seg_a.length() as i64, left_size);
        let mut middle = template;
        apply(&mut middle, left_size, right_size);
        debug_assert_eq!(middle.length() as i64, middle_size);
        out.push(middle);
    } else {
        // no left part; seg_a itself becomes the middle
        apply(seg_a, left_size, right_size);
        debug_assert_eq!(seg_a.length() as i64, middle_size);
    }

    if right_size > 0 {
        let mut right = template;
        apply(&mut right, left_size + middle_size, 0);
        debug_assert_eq!(right.length() as i64, right_size);
        out.push(right);
    }
    out
}

/// Insert `seg` into `results`, clipping both the newcomer and any
/// existing members at their intersection points so target intervals stay
/// pairwise-disjoint (equal intervals from distinct sources may coexist).
fn insert_and_break_overlaps<'a>(seg: MappedSegment<'a>, results: &mut Vec<MappedSegment<'a>>) {
    // 1) cut the newcomer by everything already present
    let mut work = vec![seg];
    let mut inputs: Vec<MappedSegment<'a>> = Vec::new();
    while let Some(mut s) = work.pop() {
        let mut cut = false;
        for res in results.iter() {
            let oc = slow_overlap(&s, res);
            if matches!(
                oc,
                OverlapCat::AContainsB
                    | OverlapCat::AOverlapsLeftOfB
                    | OverlapCat::BOverlapsLeftOfA
            ) {
                let extra = clip_a_against_b(&mut s, res, oc);
                work.extend(extra);
                work.push(s);
                cut = true;
                break;
            }
        }
        if !cut {
            inputs.push(s);
        }
    }

    // 2) cut existing members that fully contain a new piece
    let mut existing = std::mem::take(results);
    while let Some(mut res) = existing.pop() {
        let mut cut = false;
        for inp in &inputs {
            let oc = slow_overlap(&res, inp);
            if oc == OverlapCat::AContainsB {
                let extra = clip_a_against_b(&mut res, inp, oc);
                existing.extend(extra);
                existing.push(res);
                cut = true;
                break;
            }
        }
        if !cut {
            results.push(res);
        }
    }

    // 3) adopt the new pieces
    results.extend(inputs);
    results.sort_by(cmp_by_target);
}

fn dedup_sorted<'a>(list: &mut Vec<MappedSegment<'a>>) {
    list.dedup_by(|a, b| cmp_by_source(a, b) == Ordering::Equal);
}

/// Map one sliced segment to `tgt_genome`, producing the deduplicated,
/// source-major-ordered set of homologous range pairs. An empty or
/// out-of-range source yields an empty set; an unreachable target is a
/// tree-mismatch error.
pub fn map_segments<'a>(
    source: &SegmentIterator<'a>,
    tgt_genome: GenomeId,
    opts: &MapOptions,
) -> Result<Vec<MappedSegment<'a>>> {
    let aln = source.alignment();
    let tree = aln.tree();
    if !source.in_range() || source.length() == 0 {
        return Ok(Vec::new());
    }

    let mrca = match opts.mrca {
        Some(m) => m,
        None => tree.mrca(source.genome_id(), tgt_genome)?,
    };
    let coalescence_limit = opts.coalescence_limit.unwrap_or(mrca);

    let start = MappedSegment::new(*source, *source);
    let mut up_results = vec![start];
    if source.genome_id() != mrca {
        up_results = map_recursive_up(vec![start], mrca, opts.min_length)?;
    }

    let mut paralog_results = up_results;
    if mrca != coalescence_limit && opts.do_dupes {
        paralog_results = map_recursive_paralogies(
            source.genome_id(),
            paralog_results,
            coalescence_limit,
            opts.min_length,
        )?;
    }

    let mut output = paralog_results;
    if tgt_genome != mrca {
        output = map_recursive_down(output, tgt_genome, opts.do_dupes, opts.min_length)?;
    }

    let mut results: Vec<MappedSegment<'a>> = Vec::new();
    for seg in output {
        insert_and_break_overlaps(seg, &mut results);
    }
    results.sort_by(cmp_by_source);
    dedup_sorted(&mut results);
    Ok(results)
}

/// Map everything in `input` up to `tgt_genome`, one parent hop per level.
fn map_recursive_up<'a>(
    input: Vec<MappedSegment<'a>>,
    tgt_genome: GenomeId,
    min_length: u64,
) -> Result<Vec<MappedSegment<'a>>> {
    let Some(first) = input.first() else {
        return Ok(input);
    };
    let cur_genome = first.target.genome_id();
    if cur_genome == tgt_genome {
        return Ok(input);
    }
    let aln = first.target.alignment();
    let next_genome = aln.tree().parent(cur_genome).ok_or_else(|| {
        HalError::TreeMismatch(format!(
            "reached top of tree when mapping up from {} to {}",
            aln.genome(cur_genome).name(),
            aln.genome(tgt_genome).name()
        ))
    })?;

    let mut output = Vec::new();
    for seg in input {
        debug_assert_eq!(seg.target.genome_id(), cur_genome);
        map_up(seg, &mut output, true, min_length)?;
    }

    if next_genome != tgt_genome {
        output = map_recursive_up(output, tgt_genome, min_length)?;
    }
    output.sort_by(cmp_by_source);
    dedup_sorted(&mut output);
    Ok(output)
}

/// Map everything in `input` down to `tgt_genome`, choosing at each level
/// the child whose subtree holds the target.
fn map_recursive_down<'a>(
    input: Vec<MappedSegment<'a>>,
    tgt_genome: GenomeId,
    do_dupes: bool,
    min_length: u64,
) -> Result<Vec<MappedSegment<'a>>> {
    let Some(first) = input.first() else {
        return Ok(input);
    };
    let cur_genome = first.target.genome_id();
    if cur_genome == tgt_genome {
        return Ok(input);
    }
    let aln = first.target.alignment();
    let tree = aln.tree();
    let next_genome = tree.child_toward(cur_genome, tgt_genome).map_err(|_| {
        HalError::TreeMismatch(format!(
            "could not find the child that leads from {} to {}",
            aln.genome(cur_genome).name(),
            aln.genome(tgt_genome).name()
        ))
    })?;
    let child_slot = tree.child_slot(cur_genome, next_genome)?;

    let mut output = Vec::new();
    for seg in input {
        debug_assert_eq!(seg.target.genome_id(), cur_genome);
        map_down(seg, child_slot, &mut output, min_length)?;
    }

    if do_dupes {
        let staged = std::mem::take(&mut output);
        for seg in staged {
            map_self(seg, &mut output, min_length)?;
        }
    }

    if next_genome != tgt_genome {
        output = map_recursive_down(output, tgt_genome, do_dupes, min_length)?;
    }
    output.sort_by(cmp_by_source);
    dedup_sorted(&mut output);
    Ok(output)
}

/// Expand to paralogs that coalesce in or below `coalescence_limit`,
/// mapping each one back down to the source genome for source tracking.
fn map_recursive_paralogies<'a>(
    src_genome: GenomeId,
    input: Vec<MappedSegment<'a>>,
    coalescence_limit: GenomeId,
    min_length: u64,
) -> Result<Vec<MappedSegment<'a>>> {
    let Some(first) = input.first() else {
        return Ok(input);
    };
    let cur_genome = first.target.genome_id();
    if cur_genome == coalescence_limit {
        return Ok(input);
    }
    let aln = first.target.alignment();
    let next_genome = aln.tree().parent(cur_genome).ok_or_else(|| {
        HalError::TreeMismatch("hit root genome when attempting to map paralogies".into())
    })?;

    let mut paralogs = Vec::new();
    for seg in &input {
        map_self(*seg, &mut paralogs, min_length)?;
    }

    let mut results = Vec::new();
    if next_genome != coalescence_limit {
        let mut next_segments = Vec::new();
        for seg in input {
            map_up(seg, &mut next_segments, true, min_length)?;
        }
        results =
            map_recursive_paralogies(src_genome, next_segments, coalescence_limit, min_length)?;
    }

    let mapped_to_src = map_recursive_down(paralogs, src_genome, false, min_length)?;
    results.extend(mapped_to_src);
    results.sort_by(cmp_by_source);
    dedup_sorted(&mut results);
    Ok(results)
}

/// One hop toward the parent. A top target converts directly; a bottom
/// target is first broken at top-parse boundaries, propagating the offset
/// deltas back into the source slice.
fn map_up<'a>(
    mut seg: MappedSegment<'a>,
    results: &mut Vec<MappedSegment<'a>>,
    do_dupes: bool,
    min_length: u64,
) -> Result<usize> {
    let mut added = 0;
    if seg.target.is_top() {
        let top = seg.target;
        if top.has_parent()
            && top.length() >= min_length
            && (do_dupes || top.is_canonical_paralog()?)
        {
            seg.target = SegmentIterator::parent_of(&top)?;
            results.push(seg);
            added += 1;
        }
    } else {
        let right_cutoff = seg.end_position();
        let bottom = seg.target;
        let start_offset = bottom.start_offset() as i64;
        let end_offset = bottom.end_offset() as i64;
        let mut top = SegmentIterator::parse_up(&bottom)?;
        loop {
            let top_new = top;

            // map the parse slice back to see how the offsets changed;
            // the deltas narrow the source slice to the matching piece
            let bottom_back = SegmentIterator::parse_down(&top_new)?;
            let start_back = bottom_back.start_offset() as i64;
            let end_back = bottom_back.end_offset() as i64;
            debug_assert!(start_back >= start_offset);
            debug_assert!(end_back >= end_offset);
            let start_delta = start_back - start_offset;
            let end_delta = end_back - end_offset;
            let mut new_source = seg.source;
            debug_assert!((new_source.length() as i64) > start_delta + end_delta);
            new_source.slice(
                (new_source.start_offset() as i64 + start_delta) as u64,
                (new_source.end_offset() as i64 + end_delta) as u64,
            );

            let new_seg = MappedSegment::new(new_source, top_new);
            added += map_up(new_seg, results, do_dupes, min_length)?;

            if top.end_position() != right_cutoff {
                top.to_right(Some(right_cutoff));
            } else {
                break;
            }
        }
    }
    Ok(added)
}

/// One hop toward child slot `child_slot`; mirror of `map_up`.
fn map_down<'a>(
    mut seg: MappedSegment<'a>,
    child_slot: usize,
    results: &mut Vec<MappedSegment<'a>>,
    min_length: u64,
) -> Result<usize> {
    let mut added = 0;
    if !seg.target.is_top() {
        let bottom = seg.target;
        if bottom.has_child(child_slot) && bottom.length() >= min_length {
            seg.target = SegmentIterator::child_of(&bottom, child_slot)?;
            results.push(seg);
            added += 1;
        }
    } else {
        let right_cutoff = seg.end_position();
        let top = seg.target;
        let start_offset = top.start_offset() as i64;
        let end_offset = top.end_offset() as i64;
        let mut bottom = SegmentIterator::parse_down(&top)?;
        loop {
            let bottom_new = bottom;

            let top_back = SegmentIterator::parse_up(&bottom_new)?;
            let start_back = top_back.start_offset() as i64;
            let end_back = top_back.end_offset() as i64;
            debug_assert!(start_back >= start_offset);
            debug_assert!(end_back >= end_offset);
            let start_delta = start_back - start_offset;
            let end_delta = end_back - end_offset;
            let mut new_source = seg.source;
            debug_assert!((new_source.length() as i64) > start_delta + end_delta);
            new_source.slice(
                (new_source.start_offset() as i64 + start_delta) as u64,
                (new_source.end_offset() as i64 + end_delta) as u64,
            );

            let new_seg = MappedSegment::new(new_source, bottom_new);
            added += map_down(new_seg, child_slot, results, min_length)?;

            if bottom.end_position() != right_cutoff {
                bottom.to_right(Some(right_cutoff));
            } else {
                break;
            }
        }
    }
    Ok(added)
}

/// Expand within one genome: a top target walks its paralogy ring (the
/// original segment rides along); a bottom target is parsed up first.
/// The ring walk terminates against the anchor segment's index.
fn map_self<'a>(
    seg: MappedSegment<'a>,
    results: &mut Vec<MappedSegment<'a>>,
    min_length: u64,
) -> Result<usize> {
    let mut added = 0;
    if seg.target.is_top() {
        let anchor = seg.target;
        let mut cursor = anchor;
        loop {
            results.push(MappedSegment::new(seg.source, cursor));
            added += 1;
            if cursor.has_next_paralogy() {
                cursor.to_next_paralogy()?;
            }
            if !cursor.has_next_paralogy()
                || cursor.length() < min_length
                || cursor.array_index() == anchor.array_index()
            {
                break;
            }
        }
    } else if seg.target.alignment().tree().parent(seg.target.genome_id()).is_some() {
        let right_cutoff = seg.end_position();
        let bottom = seg.target;
        let start_offset = bottom.start_offset() as i64;
        let end_offset = bottom.end_offset() as i64;
        let mut top = SegmentIterator::parse_up(&bottom)?;
        loop {
            let top_new = top;

            let bottom_back = SegmentIterator::parse_down(&top_new)?;
            let start_delta = bottom_back.start_offset() as i64 - start_offset;
            let end_delta = bottom_back.end_offset() as i64 - end_offset;
            let mut new_source = seg.source;
            new_source.slice(
                (new_source.start_offset() as i64 + start_delta) as u64,
                (new_source.end_offset() as i64 + end_delta) as u64,
            );

            let new_seg = MappedSegment::new(new_source, top_new);
            added += map_self(new_seg, results, min_length)?;

            if top.end_position() != right_cutoff {
                top.to_right(Some(right_cutoff));
            } else {
                break;
            }
        }
    }
    Ok(added)
}
