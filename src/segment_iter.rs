//! Sliced segment iterator.
//!
//! The iterator *is* the bundle: array index + start/end offsets +
//! orientation, borrowing the alignment. There is no separate heap
//! segment object. The observed range of a forward iterator is
//! `[seg.start + start_offset, seg.start + seg.length - end_offset - 1]`;
//! reversing swaps which end counts as the logical start.

use crate::alignment::Alignment;
use crate::dna::reverse_complement;
use crate::error::{HalError, Result};
use crate::genome::Genome;
use crate::segment::{Side, NULL_INDEX};
use crate::sequence::Sequence;
use crate::tree::GenomeId;

#[derive(Clone, Copy)]
pub struct SegmentIterator<'a> {
    aln: &'a Alignment,
    genome_id: GenomeId,
    side: Side,
    index: i64,
    start_offset: u64,
    end_offset: u64,
    reversed: bool,
}

impl<'a> std::fmt::Debug for SegmentIterator<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_struct("SegmentIterator");
        d.field("genome", &self.genome().name())
            .field("side", &self.side)
            .field("idx", &self.index);
        if self.in_range() {
            d.field("start", &self.start_position())
                .field("end", &self.end_position())
                .field("len", &self.length())
                .field("off", &(self.start_offset, self.end_offset))
                .field("rev", &self.reversed);
        }
        d.finish()
    }
}

impl<'a> SegmentIterator<'a> {
    pub fn top(aln: &'a Alignment, genome_id: GenomeId, index: i64) -> Self {
        SegmentIterator {
            aln,
            genome_id,
            side: Side::Top,
            index,
            start_offset: 0,
            end_offset: 0,
            reversed: false,
        }
    }

    pub fn bottom(aln: &'a Alignment, genome_id: GenomeId, index: i64) -> Self {
        SegmentIterator {
            aln,
            genome_id,
            side: Side::Bottom,
            index,
            start_offset: 0,
            end_offset: 0,
            reversed: false,
        }
    }

    pub fn alignment(&self) -> &'a Alignment {
        self.aln
    }

    pub fn genome_id(&self) -> GenomeId {
        self.genome_id
    }

    pub fn genome(&self) -> &'a Genome {
        self.aln.genome(self.genome_id)
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn is_top(&self) -> bool {
        self.side == Side::Top
    }

    pub fn array_index(&self) -> i64 {
        self.index
    }

    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    pub fn end_offset(&self) -> u64 {
        self.end_offset
    }

    pub fn reversed(&self) -> bool {
        self.reversed
    }

    pub fn num_segments(&self) -> usize {
        match self.side {
            Side::Top => self.genome().num_top_segments(),
            Side::Bottom => self.genome().num_bottom_segments(),
        }
    }

    pub fn in_range(&self) -> bool {
        self.index >= 0 && (self.index as usize) < self.num_segments()
    }

    fn seg_start(&self) -> i64 {
        match self.side {
            Side::Top => self.genome().top(self.index as usize).start,
            Side::Bottom => self.genome().bottom(self.index as usize).start,
        }
    }

    fn seg_length(&self) -> u64 {
        match self.side {
            Side::Top => self.genome().top(self.index as usize).length,
            Side::Bottom => self.genome().bottom(self.index as usize).length,
        }
    }

    /// First observed position in iteration order; for a reversed
    /// iterator this is the rightmost genome coordinate of the slice.
    pub fn start_position(&self) -> i64 {
        debug_assert!(self.in_range());
        if !self.reversed {
            self.seg_start() + self.start_offset as i64
        } else {
            self.seg_start() + self.seg_length() as i64 - self.start_offset as i64 - 1
        }
    }

    pub fn end_position(&self) -> i64 {
        if !self.reversed {
            self.start_position() + self.length() as i64 - 1
        } else {
            self.start_position() - (self.length() as i64 - 1)
        }
    }

    pub fn length(&self) -> u64 {
        debug_assert!(self.in_range());
        self.seg_length() - self.end_offset - self.start_offset
    }

    pub fn left_of(&self, pos: i64) -> bool {
        if !self.reversed {
            self.start_position() + self.length() as i64 <= pos
        } else {
            self.start_position() < pos
        }
    }

    pub fn right_of(&self, pos: i64) -> bool {
        if !self.reversed {
            self.start_position() > pos
        } else {
            self.start_position() - self.length() as i64 >= pos
        }
    }

    pub fn overlaps(&self, pos: i64) -> bool {
        !self.left_of(pos) && !self.right_of(pos)
    }

    pub fn sequence(&self) -> Result<&'a Sequence> {
        self.genome().sequence_by_site(self.seg_start())
    }

    /// Same genome, side and array index (offsets don't matter).
    pub fn equals(&self, other: &SegmentIterator<'_>) -> bool {
        self.genome_id == other.genome_id && self.side == other.side && self.index == other.index
    }

    pub fn slice(&mut self, start_offset: u64, end_offset: u64) {
        debug_assert!(start_offset < self.seg_length());
        debug_assert!(end_offset < self.seg_length());
        self.start_offset = start_offset;
        self.end_offset = end_offset;
    }

    pub fn to_reverse(&mut self) {
        debug_assert!(self.in_range());
        self.reversed = !self.reversed;
    }

    /// Reverse while keeping the observed genome range identical.
    pub fn to_reverse_in_place(&mut self) {
        self.reversed = !self.reversed;
        std::mem::swap(&mut self.start_offset, &mut self.end_offset);
    }

    /// Move one segment left in genome coordinates (right for a reversed
    /// iterator), consuming any start offset first, and clip the new
    /// slice at `cutoff` if it overlaps it.
    pub fn to_left(&mut self, cutoff: Option<i64>) {
        if !self.reversed {
            if self.start_offset == 0 {
                self.index -= 1;
                self.end_offset = 0;
            } else {
                self.end_offset = self.seg_length() - self.start_offset;
                self.start_offset = 0;
            }
            if let Some(cut) = cutoff {
                if self.index >= 0 && self.in_range() && self.overlaps(cut) {
                    debug_assert!(self.seg_start() <= cut);
                    self.start_offset = (cut - self.seg_start()) as u64;
                }
            }
        } else {
            if self.start_offset == 0 {
                self.index += 1;
                self.end_offset = 0;
            } else {
                self.end_offset = self.seg_length() - self.start_offset;
                self.start_offset = 0;
            }
            if let Some(cut) = cutoff {
                if self.in_range() && self.overlaps(cut) {
                    self.start_offset =
                        (self.seg_start() + self.seg_length() as i64 - 1 - cut) as u64;
                }
            }
        }
        debug_assert!(
            !self.in_range() || self.start_offset + self.end_offset <= self.seg_length()
        );
    }

    /// Mirror of `to_left`.
    pub fn to_right(&mut self, cutoff: Option<i64>) {
        if !self.reversed {
            if self.end_offset == 0 {
                self.index += 1;
                self.start_offset = 0;
            } else {
                self.start_offset = self.seg_length() - self.end_offset;
                self.end_offset = 0;
            }
            if let Some(cut) = cutoff {
                if self.in_range() && self.overlaps(cut) {
                    self.end_offset =
                        (self.seg_start() + self.seg_length() as i64 - cut - 1) as u64;
                }
            }
        } else {
            if self.end_offset == 0 {
                self.index -= 1;
                self.start_offset = 0;
            } else {
                self.start_offset = self.seg_length() - self.end_offset;
                self.end_offset = 0;
            }
            if let Some(cut) = cutoff {
                if self.index >= 0 && self.in_range() && self.overlaps(cut) {
                    self.end_offset = (cut - self.seg_start()) as u64;
                }
            }
        }
        debug_assert!(
            !self.in_range() || self.start_offset + self.end_offset <= self.seg_length()
        );
    }

    /// Position the iterator on the segment covering `pos` using
    /// length-weighted bisection; optionally slice it to just that base.
    /// Out-of-range positions park the index outside the array.
    pub fn to_site(&mut self, pos: i64, slice_to_site: bool) {
        let genome = self.genome();
        let len = genome.length() as i64;
        let nseg = self.num_segments() as i64;
        debug_assert!(len != 0 && nseg != 0);

        self.start_offset = 0;
        self.end_offset = 0;
        if pos < 0 {
            self.index = NULL_INDEX;
            return;
        } else if pos >= len {
            self.index = nseg;
            return;
        }

        // initial hint assumes uniform segment length, refined below
        let avg_len = len as f64 / nseg as f64;
        self.index = ((pos as f64 / avg_len) as i64).clamp(0, nseg - 1);

        let mut left: i64 = 0;
        let mut left_start: i64 = 0;
        let mut right: i64 = nseg - 1;
        let mut right_start: i64 = len - 1;
        while !self.overlaps(pos) {
            debug_assert!(left != right);
            if self.right_of(pos) {
                right = self.index;
                right_start = self.seg_start();
                let avg = (right_start - left_start) as f64 / (right - left) as f64;
                let delta = (((right_start - pos) as f64 / avg).max(1.0) as i64).min(self.index);
                self.index -= delta;
                debug_assert!(self.index >= 0 && self.index < nseg);
            } else {
                debug_assert!(self.left_of(pos));
                left = self.index;
                left_start = self.seg_start();
                let avg = (right_start - left_start) as f64 / (right - left) as f64;
                let delta =
                    (((pos - left_start) as f64 / avg).max(1.0) as i64).min(nseg - 1 - self.index);
                self.index += delta;
                debug_assert!(self.index >= 0 && self.index < nseg);
            }
        }
        debug_assert!(self.overlaps(pos));

        if slice_to_site {
            self.start_offset = (pos - self.seg_start()) as u64;
            self.end_offset =
                (self.seg_start() + self.seg_length() as i64 - pos - 1) as u64;
        }
    }

    /// Materialize the observed DNA, reverse-complemented when reversed.
    pub fn string(&self) -> Result<String> {
        debug_assert!(self.in_range());
        let lo = self.seg_start() as u64
            + if !self.reversed {
                self.start_offset
            } else {
                self.end_offset
            };
        let mut out = String::new();
        self.genome().get_substring(&mut out, lo, self.length())?;
        if self.reversed {
            reverse_complement(&mut out);
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // top-side accessors
    // ------------------------------------------------------------------

    fn top_rec(&self) -> &'a crate::segment::TopSegmentData {
        debug_assert_eq!(self.side, Side::Top);
        self.genome().top(self.index as usize)
    }

    fn bottom_rec(&self) -> &'a crate::segment::BottomSegmentData {
        debug_assert_eq!(self.side, Side::Bottom);
        self.genome().bottom(self.index as usize)
    }

    pub fn parent_index(&self) -> i64 {
        self.top_rec().parent_index
    }

    pub fn has_parent(&self) -> bool {
        self.is_top() && self.top_rec().has_parent()
    }

    pub fn parent_reversed(&self) -> bool {
        self.top_rec().parent_reversed
    }

    pub fn bottom_parse_index(&self) -> i64 {
        self.top_rec().bottom_parse_index
    }

    pub fn has_parse_down(&self) -> bool {
        self.is_top() && self.top_rec().bottom_parse_index != NULL_INDEX
    }

    pub fn next_paralogy_index(&self) -> i64 {
        self.top_rec().next_paralogy_index
    }

    pub fn has_next_paralogy(&self) -> bool {
        self.is_top() && self.top_rec().has_next_paralogy()
    }

    /// True when the parent's child slot names this very segment (the
    /// ring member every other paralog is a duplicate of).
    pub fn is_canonical_paralog(&self) -> Result<bool> {
        if !self.has_parent() {
            return Ok(false);
        }
        let tree = self.aln.tree();
        let parent_id = tree.parent(self.genome_id).ok_or_else(|| {
            HalError::TreeMismatch(format!("genome {} has no parent", self.genome().name()))
        })?;
        let slot = tree.child_slot(parent_id, self.genome_id)?;
        let pb = self.aln.genome(parent_id).bottom(self.parent_index() as usize);
        Ok(pb.children[slot].index == self.index)
    }

    // ------------------------------------------------------------------
    // bottom-side accessors
    // ------------------------------------------------------------------

    pub fn child_index(&self, slot: usize) -> i64 {
        self.bottom_rec().children[slot].index
    }

    pub fn child_reversed(&self, slot: usize) -> bool {
        self.bottom_rec().children[slot].reversed
    }

    pub fn has_child(&self, slot: usize) -> bool {
        !self.is_top() && self.bottom_rec().has_child(slot)
    }

    pub fn top_parse_index(&self) -> i64 {
        self.bottom_rec().top_parse_index
    }

    pub fn has_parse_up(&self) -> bool {
        !self.is_top() && self.bottom_rec().top_parse_index != NULL_INDEX
    }

    // ------------------------------------------------------------------
    // transitions
    // ------------------------------------------------------------------

    /// Bottom iterator over the parent segment homologous to this top
    /// slice; orientation composes with the stored parent-reversed bit.
    pub fn parent_of(top: &SegmentIterator<'a>) -> Result<SegmentIterator<'a>> {
        debug_assert!(top.is_top());
        let tree = top.aln.tree();
        let parent_id = tree.parent(top.genome_id).ok_or_else(|| {
            HalError::TreeMismatch(format!("genome {} has no parent", top.genome().name()))
        })?;
        let mut it = SegmentIterator {
            aln: top.aln,
            genome_id: parent_id,
            side: Side::Bottom,
            index: top.parent_index(),
            start_offset: top.start_offset,
            end_offset: top.end_offset,
            reversed: top.reversed,
        };
        if top.parent_reversed() {
            it.to_reverse();
        }
        Ok(it)
    }

    /// Top iterator over child slot `slot`'s segment homologous to this
    /// bottom slice.
    pub fn child_of(bottom: &SegmentIterator<'a>, slot: usize) -> Result<SegmentIterator<'a>> {
        debug_assert!(!bottom.is_top());
        let tree = bottom.aln.tree();
        let child_id = tree.children(bottom.genome_id)[slot];
        let mut it = SegmentIterator {
            aln: bottom.aln,
            genome_id: child_id,
            side: Side::Top,
            index: bottom.child_index(slot),
            start_offset: bottom.start_offset,
            end_offset: bottom.end_offset,
            reversed: bottom.reversed,
        };
        if bottom.child_reversed(slot) {
            it.to_reverse();
        }
        Ok(it)
    }

    /// `child_of` with the slot found by genome.
    pub fn child_toward(
        bottom: &SegmentIterator<'a>,
        child_genome: GenomeId,
    ) -> Result<SegmentIterator<'a>> {
        let slot = bottom
            .aln
            .tree()
            .child_slot(bottom.genome_id, child_genome)?;
        SegmentIterator::child_of(bottom, slot)
    }

    /// Top iterator of the same genome covering this bottom slice's
    /// start; offsets select the intersection of the two ranges.
    pub fn parse_up(bottom: &SegmentIterator<'a>) -> Result<SegmentIterator<'a>> {
        debug_assert!(!bottom.is_top());
        debug_assert!(bottom.in_range());
        let mut it = SegmentIterator {
            aln: bottom.aln,
            genome_id: bottom.genome_id,
            side: Side::Top,
            index: bottom.top_parse_index(),
            start_offset: 0,
            end_offset: 0,
            reversed: bottom.reversed,
        };
        if it.index == NULL_INDEX {
            return Err(HalError::InvariantViolation(format!(
                "bottom segment {} of {} has no top parse index",
                bottom.index,
                bottom.genome().name()
            )));
        }
        let start_pos = bottom.start_position();
        while start_pos >= it.seg_start() + it.seg_length() as i64 {
            it.index += 1;
        }
        if !it.reversed {
            it.start_offset = (start_pos - it.seg_start()) as u64;
            let top_end = it.seg_start() + it.seg_length() as i64;
            let bot_end = bottom.start_position() + bottom.length() as i64;
            it.end_offset = (top_end - bot_end).max(0) as u64;
        } else {
            it.start_offset = (it.seg_start() + it.seg_length() as i64 - 1 - start_pos) as u64;
            let top_end = it.seg_start();
            let bot_end = bottom.start_position() - bottom.length() as i64 + 1;
            it.end_offset = (bot_end - top_end).max(0) as u64;
        }
        debug_assert!(it.start_offset + it.end_offset <= it.seg_length());
        debug_assert!(it.in_range());
        Ok(it)
    }

    /// Bottom iterator of the same genome covering this top slice's
    /// start; mirror of `parse_up`.
    pub fn parse_down(top: &SegmentIterator<'a>) -> Result<SegmentIterator<'a>> {
        debug_assert!(top.is_top());
        debug_assert!(top.in_range());
        let mut it = SegmentIterator {
            aln: top.aln,
            genome_id: top.genome_id,
            side: Side::Bottom,
            index: top.bottom_parse_index(),
            start_offset: 0,
            end_offset: 0,
            reversed: top.reversed,
        };
        if it.index == NULL_INDEX {
            return Err(HalError::InvariantViolation(format!(
                "top segment {} of {} has no bottom parse index",
                top.index,
                top.genome().name()
            )));
        }
        let start_pos = top.start_position();
        while start_pos >= it.seg_start() + it.seg_length() as i64 {
            it.index += 1;
        }
        if !it.reversed {
            it.start_offset = (start_pos - it.seg_start()) as u64;
            let bot_end = it.seg_start() + it.seg_length() as i64;
            let top_end = top.start_position() + top.length() as i64;
            it.end_offset = (bot_end - top_end).max(0) as u64;
        } else {
            it.start_offset = (it.seg_start() + it.seg_length() as i64 - 1 - start_pos) as u64;
            let bot_end = it.seg_start();
            let top_end = top.start_position() - top.length() as i64 + 1;
            it.end_offset = (top_end - bot_end).max(0) as u64;
        }
        debug_assert!(it.start_offset + it.end_offset <= it.seg_length());
        debug_assert!(it.in_range());
        Ok(it)
    }

    /// Follow the paralogy ring to the next member, flipping orientation
    /// when the member's parent strand differs.
    pub fn to_next_paralogy(&mut self) -> Result<()> {
        let next = self.next_paralogy_index();
        if next == NULL_INDEX {
            return Err(HalError::InvariantViolation(format!(
                "top segment {} of {} has no paralogy ring",
                self.index,
                self.genome().name()
            )));
        }
        debug_assert!(next != self.index);
        let was_reversed = self.parent_reversed();
        self.index = next;
        if self.parent_reversed() != was_reversed {
            self.to_reverse();
        }
        Ok(())
    }
}
