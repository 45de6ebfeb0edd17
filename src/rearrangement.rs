//! Gapped segment iteration and rearrangement classification.
//!
//! A gapped iterator coalesces a run of top segments that maps to the
//! parent as one block, absorbing unaligned or slightly-offset segments
//! shorter than a caller-provided threshold. Classifying a block against
//! its flanks yields the rearrangement that produced it.

use crate::error::Result;
use crate::segment_iter::SegmentIterator;
use crate::tree::GenomeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rearrangement {
    /// Plain aligned block, same order and strand as the parent.
    Identity,
    Inversion,
    Insertion,
    Deletion,
    Duplication,
    Translocation,
    Complex,
}

/// A maximal run of top segments `[left, right]` (inclusive array
/// indices) that maps to the parent as one block through gaps of at most
/// `gap_threshold` bases.
pub struct GappedTopIterator<'a> {
    left: SegmentIterator<'a>,
    right: SegmentIterator<'a>,
    gap_threshold: u64,
}

impl<'a> GappedTopIterator<'a> {
    /// Build the block starting at `start`'s segment, extending right.
    pub fn new(start: SegmentIterator<'a>, gap_threshold: u64) -> Self {
        debug_assert!(start.is_top());
        let mut it = GappedTopIterator {
            left: start,
            right: start,
            gap_threshold,
        };
        if start.in_range() {
            it.extend();
        }
        it
    }

    pub fn get_left(&self) -> &SegmentIterator<'a> {
        &self.left
    }

    pub fn get_right(&self) -> &SegmentIterator<'a> {
        &self.right
    }

    pub fn num_segments(&self) -> usize {
        (self.right.array_index() - self.left.array_index() + 1) as usize
    }

    pub fn length(&self) -> u64 {
        (self.right.end_position() - self.left.start_position() + 1) as u64
    }

    /// First aligned member of the block, if any.
    pub fn first_aligned(&self) -> Option<SegmentIterator<'a>> {
        let mut cur = self.left;
        loop {
            if cur.has_parent() {
                return Some(cur);
            }
            if cur.array_index() == self.right.array_index() {
                return None;
            }
            cur.to_right(None);
        }
    }

    pub fn has_parent(&self) -> bool {
        self.first_aligned().is_some()
    }

    /// Advance to the block after this one; false at the end of the
    /// genome.
    pub fn to_right(&mut self) -> bool {
        let mut next = self.right;
        next.to_right(None);
        if !next.in_range() {
            return false;
        }
        self.left = next;
        self.right = next;
        self.extend();
        true
    }

    fn extend(&mut self) {
        loop {
            let mut next = self.right;
            next.to_right(None);
            if !next.in_range() || !self.merges_with(&next) {
                return;
            }
            self.right = next;
        }
    }

    /// A candidate joins the block when it is a short unaligned gap, or
    /// aligned on the same strand with its parent within the gap
    /// threshold of where the block's parent run continues.
    fn merges_with(&self, next: &SegmentIterator<'a>) -> bool {
        if !next.has_parent() {
            return next.length() <= self.gap_threshold;
        }
        let Some(last) = self.last_aligned() else {
            // block so far is pure gap; adopt the first aligned segment
            return true;
        };
        if next.parent_reversed() != last.parent_reversed() {
            return false;
        }
        let (Ok(parent_last), Ok(parent_next)) = (
            SegmentIterator::parent_of(&last),
            SegmentIterator::parent_of(next),
        ) else {
            return false;
        };
        if parent_last.sequence().ok().map(|s| s.start)
            != parent_next.sequence().ok().map(|s| s.start)
        {
            return false;
        }
        // gap between where the parent run ends and where it resumes
        let gap = if !last.parent_reversed() {
            parent_next.start_position() - parent_last.end_position() - 1
        } else {
            parent_last.end_position() - parent_next.start_position() - 1
        };
        gap >= 0 && gap as u64 <= self.gap_threshold
    }

    fn last_aligned(&self) -> Option<SegmentIterator<'a>> {
        let mut cur = self.right;
        loop {
            if cur.has_parent() {
                return Some(cur);
            }
            if cur.array_index() == self.left.array_index() {
                return None;
            }
            cur.to_left(None);
        }
    }
}

/// Bottom-side counterpart of `GappedTopIterator`: a run of bottom
/// segments whose links into one child slot continue as a block.
pub struct GappedBottomIterator<'a> {
    left: SegmentIterator<'a>,
    right: SegmentIterator<'a>,
    child_slot: usize,
    gap_threshold: u64,
}

impl<'a> GappedBottomIterator<'a> {
    pub fn new(start: SegmentIterator<'a>, child_slot: usize, gap_threshold: u64) -> Self {
        debug_assert!(!start.is_top());
        let mut it = GappedBottomIterator {
            left: start,
            right: start,
            child_slot,
            gap_threshold,
        };
        if start.in_range() {
            it.extend();
        }
        it
    }

    pub fn get_left(&self) -> &SegmentIterator<'a> {
        &self.left
    }

    pub fn get_right(&self) -> &SegmentIterator<'a> {
        &self.right
    }

    pub fn num_segments(&self) -> usize {
        (self.right.array_index() - self.left.array_index() + 1) as usize
    }

    pub fn has_child(&self) -> bool {
        let mut cur = self.left;
        loop {
            if cur.has_child(self.child_slot) {
                return true;
            }
            if cur.array_index() == self.right.array_index() {
                return false;
            }
            cur.to_right(None);
        }
    }

    pub fn to_right(&mut self) -> bool {
        let mut next = self.right;
        next.to_right(None);
        if !next.in_range() {
            return false;
        }
        self.left = next;
        self.right = next;
        self.extend();
        true
    }

    fn extend(&mut self) {
        loop {
            let mut next = self.right;
            next.to_right(None);
            if !next.in_range() || !self.merges_with(&next) {
                return;
            }
            self.right = next;
        }
    }

    fn merges_with(&self, next: &SegmentIterator<'a>) -> bool {
        if !next.has_child(self.child_slot) {
            return next.length() <= self.gap_threshold;
        }
        let last = {
            let mut cur = self.right;
            loop {
                if cur.has_child(self.child_slot) {
                    break Some(cur);
                }
                if cur.array_index() == self.left.array_index() {
                    break None;
                }
                cur.to_left(None);
            }
        };
        let Some(last) = last else {
            return true;
        };
        if next.child_reversed(self.child_slot) != last.child_reversed(self.child_slot) {
            return false;
        }
        let (Ok(child_last), Ok(child_next)) = (
            SegmentIterator::child_of(&last, self.child_slot),
            SegmentIterator::child_of(next, self.child_slot),
        ) else {
            return false;
        };
        if child_last.sequence().ok().map(|s| s.start)
            != child_next.sequence().ok().map(|s| s.start)
        {
            return false;
        }
        let gap = if !last.child_reversed(self.child_slot) {
            child_next.start_position() - child_last.end_position() - 1
        } else {
            child_last.end_position() - child_next.start_position() - 1
        };
        gap >= 0 && gap as u64 <= self.gap_threshold
    }
}

/// Walks a genome's top segmentation block by block, labeling each block
/// with the rearrangement that separates it from its left flank.
pub struct RearrangementScanner<'a> {
    block: GappedTopIterator<'a>,
    gap_threshold: u64,
    done: bool,
}

impl<'a> RearrangementScanner<'a> {
    pub fn new(
        aln: &'a crate::alignment::Alignment,
        genome_id: GenomeId,
        gap_threshold: u64,
    ) -> Self {
        let start = SegmentIterator::top(aln, genome_id, 0);
        let done = !start.in_range();
        RearrangementScanner {
            block: GappedTopIterator::new(start, gap_threshold),
            gap_threshold,
            done,
        }
    }

    /// Classify the current block; `(kind, left index, right index)`.
    pub fn next_block(&mut self) -> Result<Option<(Rearrangement, i64, i64)>> {
        if self.done {
            return Ok(None);
        }
        let kind = self.classify()?;
        let bounds = (
            self.block.get_left().array_index(),
            self.block.get_right().array_index(),
        );
        if !self.block.to_right() {
            self.done = true;
        }
        Ok(Some((kind, bounds.0, bounds.1)))
    }

    fn classify(&self) -> Result<Rearrangement> {
        let Some(aligned) = self.block.first_aligned() else {
            // nothing in the block maps to the parent
            return Ok(Rearrangement::Insertion);
        };

        if aligned.has_next_paralogy() && !aligned.is_canonical_paralog()? {
            return Ok(Rearrangement::Duplication);
        }

        // left flank: nearest aligned segment before the block
        let mut flank = *self.block.get_left();
        let flank = loop {
            if flank.array_index() == 0 {
                break None;
            }
            flank.to_left(None);
            if !flank.in_range() {
                break None;
            }
            if flank.has_parent() {
                break Some(flank);
            }
        };
        let Some(flank) = flank else {
            return Ok(if aligned.parent_reversed() {
                Rearrangement::Inversion
            } else {
                Rearrangement::Identity
            });
        };

        if aligned.parent_reversed() != flank.parent_reversed() {
            return Ok(Rearrangement::Inversion);
        }

        let parent_block = SegmentIterator::parent_of(&aligned)?;
        let parent_flank = SegmentIterator::parent_of(&flank)?;
        if parent_block.sequence()?.start != parent_flank.sequence()?.start {
            return Ok(Rearrangement::Translocation);
        }

        let gap = if !aligned.parent_reversed() {
            parent_block.start_position() - parent_flank.end_position() - 1
        } else {
            parent_flank.end_position() - parent_block.start_position() - 1
        };
        if gap < 0 {
            // parent order runs backwards relative to the child order
            return Ok(Rearrangement::Complex);
        }
        if gap as u64 > self.gap_threshold {
            return Ok(Rearrangement::Deletion);
        }
        Ok(Rearrangement::Identity)
    }
}
