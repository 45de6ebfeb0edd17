mod common;

use common::{chain_with_insertion, duplication_fan_out, two_genome, two_siblings};
use halign::alignment::Alignment;
use halign::dna::reverse_complement;
use halign::rearrangement::{GappedTopIterator, Rearrangement, RearrangementScanner};
use halign::segment_iter::SegmentIterator;
use halign::sequence::SequenceInfo;
use pretty_assertions::assert_eq;

#[test]
fn test_double_reverse_identity_everywhere() {
    let aln = duplication_fan_out();
    let b = aln.genome_id("B").unwrap();
    for idx in 0..3 {
        let mut it = SegmentIterator::top(&aln, b, idx);
        it.slice(1, 0);
        let before = (it.start_position(), it.end_position(), it.length());
        it.to_reverse();
        it.to_reverse();
        assert_eq!(
            (it.start_position(), it.end_position(), it.length()),
            before
        );
    }
}

#[test]
fn test_string_of_reversed_iterator_is_reverse_complement() {
    let aln = two_siblings();
    let p = aln.genome_id("P").unwrap();
    let mut it = SegmentIterator::bottom(&aln, p, 0);
    it.slice(2, 3);
    let mut forward = it.string().unwrap();
    it.to_reverse_in_place();
    let backward = it.string().unwrap();
    reverse_complement(&mut forward);
    assert_eq!(forward, backward);
}

#[test]
fn test_paralogy_ring_closes() {
    let aln = duplication_fan_out();
    let b = aln.genome_id("B").unwrap();
    let start = SegmentIterator::top(&aln, b, 0);
    let mut cursor = start;
    let mut steps = 0;
    loop {
        assert!(cursor.has_next_paralogy());
        cursor.to_next_paralogy().unwrap();
        steps += 1;
        assert!(steps <= 3, "ring does not close");
        if cursor.array_index() == start.array_index() {
            break;
        }
    }
    assert_eq!(steps, 3);
}

#[test]
fn test_canonical_paralog() {
    let aln = duplication_fan_out();
    let b = aln.genome_id("B").unwrap();
    assert!(SegmentIterator::top(&aln, b, 0)
        .is_canonical_paralog()
        .unwrap());
    assert!(!SegmentIterator::top(&aln, b, 1)
        .is_canonical_paralog()
        .unwrap());
    assert!(!SegmentIterator::top(&aln, b, 2)
        .is_canonical_paralog()
        .unwrap());
}

/// A genome whose top segmentation is one segment [0,9) over bottom
/// segments [0,3), [3,7), [7,10).
fn parse_transition_genome() -> Alignment {
    let mut aln = Alignment::new();
    aln.add_root_genome("R").unwrap();
    aln.add_leaf_genome("M", "R", 0.1).unwrap();
    aln.add_leaf_genome("L", "M", 0.1).unwrap();
    aln.set_genome_dimensions("R", &[SequenceInfo::new("rseq", 10, 0, 2)])
        .unwrap();
    aln.set_genome_dimensions("M", &[SequenceInfo::new("mseq", 10, 2, 3)])
        .unwrap();
    aln.set_genome_dimensions("L", &[SequenceInfo::new("lseq", 10, 3, 0)])
        .unwrap();

    let r = aln.genome_id("R").unwrap();
    {
        let g = aln.genome_mut(r).unwrap();
        g.set_string("ACGTACGTAC").unwrap();
        for (i, (start, len)) in [(0i64, 9u64), (9, 1)].iter().enumerate() {
            let b = g.bottom_mut(i);
            b.start = *start;
            b.length = *len;
            b.children[0].index = i as i64;
        }
    }
    let m = aln.genome_id("M").unwrap();
    {
        let g = aln.genome_mut(m).unwrap();
        g.set_string("ACGTACGTAC").unwrap();
        let t0 = g.top_mut(0);
        t0.start = 0;
        t0.length = 9;
        t0.parent_index = 0;
        let t1 = g.top_mut(1);
        t1.start = 9;
        t1.length = 1;
        t1.parent_index = 1;
        for (i, (start, len)) in [(0i64, 3u64), (3, 4), (7, 3)].iter().enumerate() {
            let b = g.bottom_mut(i);
            b.start = *start;
            b.length = *len;
            b.children[0].index = i as i64;
        }
        g.rebuild_parse_indices();
    }
    let l = aln.genome_id("L").unwrap();
    {
        let g = aln.genome_mut(l).unwrap();
        g.set_string("ACGTACGTAC").unwrap();
        for (i, (start, len)) in [(0i64, 3u64), (3, 4), (7, 3)].iter().enumerate() {
            let t = g.top_mut(i);
            t.start = *start;
            t.length = *len;
            t.parent_index = i as i64;
        }
    }
    aln
}

#[test]
fn test_parse_transition_genome_is_well_formed() {
    halign::validate::validate(&parse_transition_genome()).unwrap();
}

#[test]
fn test_parse_transition_offsets() {
    let aln = parse_transition_genome();
    let m = aln.genome_id("M").unwrap();
    let top = SegmentIterator::top(&aln, m, 0);
    assert_eq!((top.start_position(), top.end_position()), (0, 8));

    // parse down lands on the bottom segment covering the start, sliced
    // to the intersection of the two ranges
    let mut bottom = SegmentIterator::parse_down(&top).unwrap();
    assert_eq!(bottom.array_index(), 0);
    assert_eq!((bottom.start_position(), bottom.end_position()), (0, 2));
    assert_eq!((bottom.start_offset(), bottom.end_offset()), (0, 0));

    // walking right under the top segment's cutoff covers [0,9) exactly;
    // the final piece is clipped with endOffset = 1
    bottom.to_right(Some(8));
    assert_eq!((bottom.start_position(), bottom.end_position()), (3, 6));
    bottom.to_right(Some(8));
    assert_eq!((bottom.start_position(), bottom.end_position()), (7, 8));
    assert_eq!(bottom.end_offset(), 1);

    // and back up: the intersection property in the other direction
    let up = SegmentIterator::parse_up(&bottom).unwrap();
    assert_eq!(up.array_index(), 0);
    assert_eq!((up.start_position(), up.end_position()), (7, 8));
}

#[test]
fn test_parse_up_from_sliced_bottom() {
    let aln = parse_transition_genome();
    let m = aln.genome_id("M").unwrap();
    let mut bottom = SegmentIterator::bottom(&aln, m, 1);
    bottom.slice(1, 1); // [4,5] of the genome
    let top = SegmentIterator::parse_up(&bottom).unwrap();
    assert_eq!(top.array_index(), 0);
    assert_eq!((top.start_position(), top.end_position()), (4, 5));
}

#[test]
fn test_gapped_iterator_coalesces_adjacent_run() {
    // M's two top segments continue the same parent run, so they
    // coalesce into one block
    let aln = parse_transition_genome();
    let m = aln.genome_id("M").unwrap();
    let start = SegmentIterator::top(&aln, m, 0);
    let block = GappedTopIterator::new(start, 2);
    assert_eq!(block.get_left().array_index(), 0);
    assert_eq!(block.get_right().array_index(), 1);
    assert_eq!(block.num_segments(), 2);
    assert_eq!(block.length(), 10);
    assert!(block.has_parent());
}

#[test]
fn test_gapped_bottom_iterator_bridges_unaligned_run() {
    use halign::rearrangement::GappedBottomIterator;
    let aln = chain_with_insertion();
    let a = aln.genome_id("A").unwrap();
    let start = SegmentIterator::bottom(&aln, a, 0);

    // the 4-base unaligned segment fits inside the gap threshold and the
    // child run continues right after it
    let block = GappedBottomIterator::new(start, 0, 4);
    assert_eq!(block.get_left().array_index(), 0);
    assert_eq!(block.get_right().array_index(), 2);
    assert!(block.has_child());

    // a smaller threshold splits at the unaligned segment
    let mut block = GappedBottomIterator::new(start, 0, 2);
    assert_eq!(block.get_right().array_index(), 0);
    assert!(block.to_right());
    assert_eq!(
        (block.get_left().array_index(), block.get_right().array_index()),
        (1, 2)
    );
    assert!(!block.to_right());
}

#[test]
fn test_rearrangement_scan_identity_and_inversion() {
    let aln = two_genome(true);
    let b = aln.genome_id("B").unwrap();
    let mut scanner = RearrangementScanner::new(&aln, b, 0);
    let (kind, left, right) = scanner.next_block().unwrap().unwrap();
    assert_eq!((left, right), (0, 0));
    assert_eq!(kind, Rearrangement::Inversion);
    assert!(scanner.next_block().unwrap().is_none());

    let aln = two_genome(false);
    let b = aln.genome_id("B").unwrap();
    let mut scanner = RearrangementScanner::new(&aln, b, 0);
    let (kind, _, _) = scanner.next_block().unwrap().unwrap();
    assert_eq!(kind, Rearrangement::Identity);
}

#[test]
fn test_rearrangement_scan_duplication() {
    let aln = duplication_fan_out();
    let b = aln.genome_id("B").unwrap();
    let mut scanner = RearrangementScanner::new(&aln, b, 0);
    let mut kinds = Vec::new();
    while let Some((kind, _, _)) = scanner.next_block().unwrap() {
        kinds.push(kind);
    }
    assert!(kinds.contains(&Rearrangement::Duplication), "{kinds:?}");
}

#[test]
fn test_insertion_block_detected() {
    let aln = chain_with_insertion();
    let b = aln.genome_id("B").unwrap();
    // B's two segments align around A's insertion; the deletion of A's
    // inserted bases shows up as a Deletion block boundary
    let mut scanner = RearrangementScanner::new(&aln, b, 1);
    let mut kinds = Vec::new();
    while let Some((kind, _, _)) = scanner.next_block().unwrap() {
        kinds.push(kind);
    }
    assert!(kinds.contains(&Rearrangement::Deletion), "{kinds:?}");
}
