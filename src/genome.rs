//! One taxonomic unit: metadata, sequences, DNA, and segment arrays.

use indexmap::IndexMap;

use crate::dna::DnaArray;
use crate::error::{HalError, Result};
use crate::segment::{BottomSegmentData, ChildRef, TopSegmentData, NULL_INDEX};
use crate::sequence::{Sequence, SequenceInfo, UpdateInfo};

#[derive(Debug, Clone, Default)]
pub struct Genome {
    name: String,
    sequences: Vec<Sequence>,
    dna: DnaArray,
    total_length: u64,
    tops: Vec<TopSegmentData>,
    bottoms: Vec<BottomSegmentData>,
    /// Width of every bottom record's child array.
    num_child_slots: usize,
    meta: IndexMap<String, String>,
}

impl Genome {
    pub fn new(name: impl Into<String>) -> Self {
        Genome {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&self) -> u64 {
        self.total_length
    }

    pub fn num_sequences(&self) -> usize {
        self.sequences.len()
    }

    pub fn num_top_segments(&self) -> usize {
        self.tops.len()
    }

    pub fn num_bottom_segments(&self) -> usize {
        self.bottoms.len()
    }

    pub fn num_child_slots(&self) -> usize {
        self.num_child_slots
    }

    pub fn meta(&self) -> &IndexMap<String, String> {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut IndexMap<String, String> {
        &mut self.meta
    }

    /// Set the genome's dimensions. Valid once, before any segment data is
    /// written; later adjustments go through `update_top_dimensions` /
    /// `update_bottom_dimensions`.
    pub fn set_dimensions(&mut self, dims: &[SequenceInfo], num_child_slots: usize) -> Result<()> {
        let mut start = 0i64;
        let mut top_start = 0usize;
        let mut bottom_start = 0usize;
        self.sequences.clear();
        for info in dims {
            if info.name.is_empty() {
                return Err(HalError::InvalidArgument("sequence name can't be empty".into()));
            }
            if self.sequences.iter().any(|s| s.name == info.name) {
                return Err(HalError::InvalidArgument(format!(
                    "duplicate sequence name {}",
                    info.name
                )));
            }
            self.sequences.push(Sequence {
                name: info.name.clone(),
                start,
                length: info.length,
                top_start,
                num_tops: info.num_top_segments as usize,
                bottom_start,
                num_bottoms: info.num_bottom_segments as usize,
            });
            start += info.length as i64;
            top_start += info.num_top_segments as usize;
            bottom_start += info.num_bottom_segments as usize;
        }
        self.total_length = start as u64;
        self.dna = DnaArray::new(self.total_length);
        self.num_child_slots = num_child_slots;
        self.tops = vec![TopSegmentData::new(NULL_INDEX, 0); top_start];
        self.bottoms = vec![BottomSegmentData::new(NULL_INDEX, 0, num_child_slots); bottom_start];
        Ok(())
    }

    /// Change per-sequence top-segment counts. Sequence lengths, and hence
    /// the genome length, stay fixed; the top array is reallocated.
    pub fn update_top_dimensions(&mut self, updates: &[UpdateInfo]) -> Result<()> {
        for u in updates {
            let idx = self.sequence_index(&u.name)?;
            self.sequences[idx].num_tops = u.num_segments as usize;
        }
        let mut top_start = 0usize;
        for seq in &mut self.sequences {
            seq.top_start = top_start;
            top_start += seq.num_tops;
        }
        self.tops = vec![TopSegmentData::new(NULL_INDEX, 0); top_start];
        Ok(())
    }

    /// Change per-sequence bottom-segment counts; mirror of
    /// `update_top_dimensions`.
    pub fn update_bottom_dimensions(&mut self, updates: &[UpdateInfo]) -> Result<()> {
        for u in updates {
            let idx = self.sequence_index(&u.name)?;
            self.sequences[idx].num_bottoms = u.num_segments as usize;
        }
        let mut bottom_start = 0usize;
        for seq in &mut self.sequences {
            seq.bottom_start = bottom_start;
            bottom_start += seq.num_bottoms;
        }
        self.bottoms =
            vec![BottomSegmentData::new(NULL_INDEX, 0, self.num_child_slots); bottom_start];
        Ok(())
    }

    /// Widen every bottom record to `n` child slots, padding with NULL.
    pub(crate) fn grow_child_slots(&mut self, n: usize) {
        self.num_child_slots = n;
        for seg in &mut self.bottoms {
            seg.children.resize(n, ChildRef::NULL);
        }
    }

    /// Drop one child slot from every bottom record, shifting later slots
    /// down.
    pub(crate) fn remove_child_slot(&mut self, slot: usize) {
        self.num_child_slots -= 1;
        for seg in &mut self.bottoms {
            seg.children.remove(slot);
        }
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    pub fn sequence(&self, index: usize) -> &Sequence {
        &self.sequences[index]
    }

    fn sequence_index(&self, name: &str) -> Result<usize> {
        self.sequences
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| {
                HalError::NotFound(format!("sequence {name} in genome {}", self.name))
            })
    }

    pub fn sequence_by_name(&self, name: &str) -> Result<&Sequence> {
        Ok(&self.sequences[self.sequence_index(name)?])
    }

    /// Sequence covering genome position `pos`.
    pub fn sequence_by_site(&self, pos: i64) -> Result<&Sequence> {
        if pos < 0 || pos as u64 >= self.total_length {
            return Err(HalError::InvalidArgument(format!(
                "position {pos} outside genome {} of length {}",
                self.name, self.total_length
            )));
        }
        let idx = self
            .sequences
            .partition_point(|s| s.end() <= pos)
            .min(self.sequences.len() - 1);
        debug_assert!(self.sequences[idx].contains(pos));
        Ok(&self.sequences[idx])
    }

    /// Index of the sequence covering `pos`.
    pub fn sequence_index_by_site(&self, pos: i64) -> Result<usize> {
        self.sequence_by_site(pos)?;
        Ok(self.sequences.partition_point(|s| s.end() <= pos))
    }

    pub fn top(&self, index: usize) -> &TopSegmentData {
        &self.tops[index]
    }

    pub fn top_mut(&mut self, index: usize) -> &mut TopSegmentData {
        &mut self.tops[index]
    }

    pub fn bottom(&self, index: usize) -> &BottomSegmentData {
        &self.bottoms[index]
    }

    pub fn bottom_mut(&mut self, index: usize) -> &mut BottomSegmentData {
        &mut self.bottoms[index]
    }

    pub fn tops(&self) -> &[TopSegmentData] {
        &self.tops
    }

    pub fn bottoms(&self) -> &[BottomSegmentData] {
        &self.bottoms
    }

    pub(crate) fn set_arrays(
        &mut self,
        sequences: Vec<Sequence>,
        dna: DnaArray,
        tops: Vec<TopSegmentData>,
        bottoms: Vec<BottomSegmentData>,
        num_child_slots: usize,
    ) {
        self.total_length = sequences.iter().map(|s| s.length).sum();
        self.sequences = sequences;
        self.dna = dna;
        self.tops = tops;
        self.bottoms = bottoms;
        self.num_child_slots = num_child_slots;
    }

    /// Recompute the parse cross-references between the two
    /// segmentations: each top segment points at the bottom segment
    /// covering its start, and vice versa. A no-op unless the genome has
    /// both arrays.
    pub fn rebuild_parse_indices(&mut self) {
        if self.tops.is_empty() || self.bottoms.is_empty() {
            return;
        }
        let mut b = 0usize;
        for i in 0..self.tops.len() {
            let start = self.tops[i].start;
            while self.bottoms[b].start + (self.bottoms[b].length as i64) <= start {
                b += 1;
            }
            self.tops[i].bottom_parse_index = b as i64;
        }
        let mut t = 0usize;
        for i in 0..self.bottoms.len() {
            let start = self.bottoms[i].start;
            while self.tops[t].start + (self.tops[t].length as i64) <= start {
                t += 1;
            }
            self.bottoms[i].top_parse_index = t as i64;
        }
    }

    pub fn dna(&self) -> &DnaArray {
        &self.dna
    }

    pub fn dna_mut(&mut self) -> &mut DnaArray {
        &mut self.dna
    }

    /// Replace the entire DNA string; must match the genome length.
    pub fn set_string(&mut self, s: &str) -> Result<()> {
        if s.len() as u64 != self.total_length {
            return Err(HalError::InvalidArgument(format!(
                "string length {} != genome length {}",
                s.len(),
                self.total_length
            )));
        }
        self.dna.set_substring(s, 0)
    }

    pub fn get_substring(&self, out: &mut String, start: u64, n: u64) -> Result<()> {
        self.dna.substring(out, start, n)
    }

    pub fn set_substring(&mut self, s: &str, start: u64) -> Result<()> {
        self.dna.set_substring(s, start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_seq_genome() -> Genome {
        let mut g = Genome::new("g");
        g.set_dimensions(
            &[
                SequenceInfo::new("chr1", 10, 2, 1),
                SequenceInfo::new("chr2", 6, 1, 1),
            ],
            1,
        )
        .unwrap();
        g
    }

    #[test]
    fn test_dimensions_layout() {
        let g = two_seq_genome();
        assert_eq!(g.length(), 16);
        assert_eq!(g.num_top_segments(), 3);
        assert_eq!(g.num_bottom_segments(), 2);
        let chr2 = g.sequence_by_name("chr2").unwrap();
        assert_eq!(chr2.start, 10);
        assert_eq!(chr2.top_start, 2);
        assert_eq!(chr2.bottom_start, 1);
        assert_eq!(g.sequence_by_site(12).unwrap().name, "chr2");
        assert_eq!(g.sequence_by_site(9).unwrap().name, "chr1");
        assert!(g.sequence_by_site(16).is_err());
    }

    #[test]
    fn test_update_dimensions_keeps_length() {
        let mut g = two_seq_genome();
        g.update_top_dimensions(&[UpdateInfo::new("chr1", 5)]).unwrap();
        assert_eq!(g.length(), 16);
        assert_eq!(g.num_top_segments(), 6);
        assert_eq!(g.sequence_by_name("chr2").unwrap().top_start, 5);
    }

    #[test]
    fn test_child_slot_growth() {
        let mut g = two_seq_genome();
        g.grow_child_slots(3);
        assert_eq!(g.bottom(0).children.len(), 3);
        assert!(!g.bottom(0).has_child(2));
        g.remove_child_slot(1);
        assert_eq!(g.bottom(0).children.len(), 2);
    }

    #[test]
    fn test_dna_round_trip() {
        let mut g = two_seq_genome();
        g.set_string("ACGTACGTACacgtac").unwrap();
        let mut out = String::new();
        g.get_substring(&mut out, 8, 4).unwrap();
        assert_eq!(out, "ACac");
    }
}
