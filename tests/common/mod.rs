//! Shared builders for small hand-laid alignments.

#![allow(dead_code)]

use halign::alignment::Alignment;
use halign::mapped_segment::MappedSegment;
use halign::segment::NULL_INDEX;
use halign::sequence::SequenceInfo;

/// Root `A` and leaf `B`, both one sequence of length 10, aligned by a
/// single full-length segment with the given orientation.
pub fn two_genome(parent_reversed: bool) -> Alignment {
    let mut aln = Alignment::new();
    aln.add_root_genome("A").unwrap();
    aln.add_leaf_genome("B", "A", 0.1).unwrap();
    aln.set_genome_dimensions("A", &[SequenceInfo::new("aseq", 10, 0, 1)])
        .unwrap();
    aln.set_genome_dimensions("B", &[SequenceInfo::new("bseq", 10, 1, 0)])
        .unwrap();

    let a = aln.genome_id("A").unwrap();
    {
        let g = aln.genome_mut(a).unwrap();
        g.set_string("ACGTACGTAC").unwrap();
        let b0 = g.bottom_mut(0);
        b0.start = 0;
        b0.length = 10;
        b0.children[0].index = 0;
        b0.children[0].reversed = parent_reversed;
    }
    let b = aln.genome_id("B").unwrap();
    {
        let g = aln.genome_mut(b).unwrap();
        g.set_string("ACGTACGTAC").unwrap();
        let t0 = g.top_mut(0);
        t0.start = 0;
        t0.length = 10;
        t0.parent_index = 0;
        t0.parent_reversed = parent_reversed;
    }
    aln
}

/// Root `A` of length 3 and leaf `B` of length 9: three copies of A's
/// sole segment, linked in a paralogy cycle 0 -> 1 -> 2 -> 0.
pub fn duplication_fan_out() -> Alignment {
    let mut aln = Alignment::new();
    aln.add_root_genome("A").unwrap();
    aln.add_leaf_genome("B", "A", 0.1).unwrap();
    aln.set_genome_dimensions("A", &[SequenceInfo::new("aseq", 3, 0, 1)])
        .unwrap();
    aln.set_genome_dimensions("B", &[SequenceInfo::new("bseq", 9, 3, 0)])
        .unwrap();

    let a = aln.genome_id("A").unwrap();
    {
        let g = aln.genome_mut(a).unwrap();
        g.set_string("CCC").unwrap();
        let b0 = g.bottom_mut(0);
        b0.start = 0;
        b0.length = 3;
        b0.children[0].index = 0;
        b0.children[0].reversed = false;
    }
    let b = aln.genome_id("B").unwrap();
    {
        let g = aln.genome_mut(b).unwrap();
        g.set_string("CCCCCCCCC").unwrap();
        for i in 0..3i64 {
            let t = g.top_mut(i as usize);
            t.start = i * 3;
            t.length = 3;
            t.parent_index = 0;
            t.parent_reversed = false;
            t.next_paralogy_index = (i + 1) % 3;
        }
    }
    aln
}

/// Root `P` with two children `C1` (reversed) and `C2` (forward), all of
/// length 10, aligned one-to-one.
pub fn two_siblings() -> Alignment {
    let mut aln = Alignment::new();
    aln.add_root_genome("P").unwrap();
    aln.add_leaf_genome("C1", "P", 0.1).unwrap();
    aln.add_leaf_genome("C2", "P", 0.1).unwrap();
    aln.set_genome_dimensions("P", &[SequenceInfo::new("pseq", 10, 0, 1)])
        .unwrap();
    aln.set_genome_dimensions("C1", &[SequenceInfo::new("c1seq", 10, 1, 0)])
        .unwrap();
    aln.set_genome_dimensions("C2", &[SequenceInfo::new("c2seq", 10, 1, 0)])
        .unwrap();

    let p = aln.genome_id("P").unwrap();
    {
        let g = aln.genome_mut(p).unwrap();
        g.set_string("ACGTACGTAC").unwrap();
        let b0 = g.bottom_mut(0);
        b0.start = 0;
        b0.length = 10;
        b0.children[0].index = 0;
        b0.children[0].reversed = true;
        b0.children[1].index = 0;
        b0.children[1].reversed = false;
    }
    for (name, reversed, dna) in [("C1", true, "GTACGTACGT"), ("C2", false, "ACGTACGTAC")] {
        let id = aln.genome_id(name).unwrap();
        let g = aln.genome_mut(id).unwrap();
        g.set_string(dna).unwrap();
        let t0 = g.top_mut(0);
        t0.start = 0;
        t0.length = 10;
        t0.parent_index = 0;
        t0.parent_reversed = reversed;
    }
    aln
}

/// Chain A -> B -> C where A carries a 4-base insertion (bases 5..9) not
/// present in B or C; everything else aligns one-to-one.
pub fn chain_with_insertion() -> Alignment {
    let mut aln = Alignment::new();
    aln.add_root_genome("A").unwrap();
    aln.add_leaf_genome("B", "A", 0.1).unwrap();
    aln.add_leaf_genome("C", "B", 0.1).unwrap();
    aln.set_genome_dimensions("A", &[SequenceInfo::new("aseq", 14, 0, 3)])
        .unwrap();
    aln.set_genome_dimensions("B", &[SequenceInfo::new("bseq", 10, 2, 2)])
        .unwrap();
    aln.set_genome_dimensions("C", &[SequenceInfo::new("cseq", 10, 2, 0)])
        .unwrap();

    let a = aln.genome_id("A").unwrap();
    {
        let g = aln.genome_mut(a).unwrap();
        g.set_string("ACGTAGGGGCGTAC").unwrap();
        for (i, (start, len, child)) in
            [(0i64, 5u64, 0i64), (5, 4, NULL_INDEX), (9, 5, 1)].iter().enumerate()
        {
            let b = g.bottom_mut(i);
            b.start = *start;
            b.length = *len;
            b.children[0].index = *child;
        }
    }
    let b = aln.genome_id("B").unwrap();
    {
        let g = aln.genome_mut(b).unwrap();
        g.set_string("ACGTACGTAC").unwrap();
        for i in 0..2i64 {
            let t = g.top_mut(i as usize);
            t.start = i * 5;
            t.length = 5;
            t.parent_index = if i == 0 { 0 } else { 2 };
            let bm = g.bottom_mut(i as usize);
            bm.start = i * 5;
            bm.length = 5;
            bm.children[0].index = i;
        }
        g.rebuild_parse_indices();
    }
    let c = aln.genome_id("C").unwrap();
    {
        let g = aln.genome_mut(c).unwrap();
        g.set_string("ACGTACGTAC").unwrap();
        for i in 0..2i64 {
            let t = g.top_mut(i as usize);
            t.start = i * 5;
            t.length = 5;
            t.parent_index = i;
        }
    }
    aln
}

/// Normalized `(src_lo, src_hi, tgt_lo, tgt_hi, reversed)` view of a
/// mapped segment; hi bounds are inclusive.
pub fn summarize(seg: &MappedSegment<'_>) -> (i64, i64, i64, i64, bool) {
    let (mut ss, mut se) = (
        seg.source().start_position(),
        seg.source().end_position(),
    );
    if ss > se {
        std::mem::swap(&mut ss, &mut se);
    }
    let (mut ts, mut te) = (seg.start_position(), seg.end_position());
    if ts > te {
        std::mem::swap(&mut ts, &mut te);
    }
    (
        ss,
        se,
        ts,
        te,
        seg.reversed() != seg.source().reversed(),
    )
}
