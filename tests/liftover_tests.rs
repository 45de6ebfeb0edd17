mod common;

use common::{duplication_fan_out, summarize, two_genome, two_siblings};
use halign::liftover::{lift_range, liftover_bed, parse_bed_line};
use halign::mapped_segment::MapOptions;
use halign::validate::validate;
use pretty_assertions::assert_eq;

#[test]
fn test_trivial_two_genome_liftover() {
    let aln = two_genome(false);
    validate(&aln).unwrap();
    let b = aln.genome_id("B").unwrap();
    let a = aln.genome_id("A").unwrap();
    let mapped = lift_range(&aln, b, 0, 10, a, &MapOptions::default()).unwrap();
    assert_eq!(mapped.len(), 1);
    assert_eq!(summarize(&mapped[0]), (0, 9, 0, 9, false));
}

#[test]
fn test_inversion_liftover() {
    let aln = two_genome(true);
    validate(&aln).unwrap();
    let b = aln.genome_id("B").unwrap();
    let a = aln.genome_id("A").unwrap();
    // [0,3) of B maps to [7,10) of A, reversed
    let mapped = lift_range(&aln, b, 0, 3, a, &MapOptions::default()).unwrap();
    assert_eq!(mapped.len(), 1);
    assert_eq!(summarize(&mapped[0]), (0, 2, 7, 9, true));
}

#[test]
fn test_duplication_fan_out() {
    let aln = duplication_fan_out();
    validate(&aln).unwrap();
    let a = aln.genome_id("A").unwrap();
    let b = aln.genome_id("B").unwrap();
    let opts = MapOptions {
        do_dupes: true,
        ..Default::default()
    };
    let mapped = lift_range(&aln, a, 0, 3, b, &opts).unwrap();
    let got: Vec<_> = mapped.iter().map(summarize).collect();
    assert_eq!(
        got,
        vec![
            (0, 2, 0, 2, false),
            (0, 2, 3, 5, false),
            (0, 2, 6, 8, false),
        ]
    );

    // without duplicates only the canonical copy is reported
    let mapped = lift_range(&aln, a, 0, 3, b, &MapOptions::default()).unwrap();
    assert_eq!(mapped.len(), 1);
    assert_eq!(summarize(&mapped[0]), (0, 2, 0, 2, false));
}

#[test]
fn test_cross_sibling_mapping() {
    let aln = two_siblings();
    validate(&aln).unwrap();
    let c1 = aln.genome_id("C1").unwrap();
    let c2 = aln.genome_id("C2").unwrap();
    let mapped = lift_range(&aln, c1, 0, 10, c2, &MapOptions::default()).unwrap();
    assert_eq!(mapped.len(), 1);
    assert_eq!(summarize(&mapped[0]), (0, 9, 0, 9, true));
}

#[test]
fn test_round_trip_liftover_covers_input() {
    let aln = two_siblings();
    let c1 = aln.genome_id("C1").unwrap();
    let c2 = aln.genome_id("C2").unwrap();
    let opts = MapOptions::default();
    let forward = lift_range(&aln, c1, 2, 6, c2, &opts).unwrap();
    assert!(!forward.is_empty());

    let mut covered: Vec<bool> = vec![false; 10];
    for seg in &forward {
        let (mut lo, mut hi) = (seg.start_position(), seg.end_position());
        if lo > hi {
            std::mem::swap(&mut lo, &mut hi);
        }
        for back in lift_range(&aln, c2, lo, (hi - lo + 1) as u64, c1, &opts).unwrap() {
            let (_, _, blo, bhi, _) = summarize(&back);
            for p in blo..=bhi {
                covered[p as usize] = true;
            }
        }
    }
    assert!(
        (2..8).all(|p| covered[p]),
        "round trip failed to cover the input range: {covered:?}"
    );
}

#[test]
fn test_partial_range_inversion_arithmetic() {
    let aln = two_siblings();
    let c1 = aln.genome_id("C1").unwrap();
    let c2 = aln.genome_id("C2").unwrap();
    // one base in the middle: position 3 of C1 lands on position 6 of C2
    let mapped = lift_range(&aln, c1, 3, 1, c2, &MapOptions::default()).unwrap();
    assert_eq!(mapped.len(), 1);
    assert_eq!(summarize(&mapped[0]), (3, 3, 6, 6, true));
}

#[test]
fn test_empty_and_invalid_ranges() {
    let aln = two_genome(false);
    let b = aln.genome_id("B").unwrap();
    let a = aln.genome_id("A").unwrap();
    assert!(lift_range(&aln, b, 0, 0, a, &MapOptions::default())
        .unwrap()
        .is_empty());
    assert!(lift_range(&aln, b, 5, 10, a, &MapOptions::default()).is_err());
}

/// Three-level tree R -> A -> B where A holds two copies of R's sole
/// segment in a paralogy ring and B aligns one-to-one with A.
fn three_level_duplication() -> halign::alignment::Alignment {
    use halign::sequence::SequenceInfo;
    let mut aln = halign::alignment::Alignment::new();
    aln.add_root_genome("R").unwrap();
    aln.add_leaf_genome("A", "R", 0.1).unwrap();
    aln.add_leaf_genome("B", "A", 0.1).unwrap();
    aln.set_genome_dimensions("R", &[SequenceInfo::new("rseq", 3, 0, 1)])
        .unwrap();
    aln.set_genome_dimensions("A", &[SequenceInfo::new("aseq", 6, 2, 2)])
        .unwrap();
    aln.set_genome_dimensions("B", &[SequenceInfo::new("bseq", 6, 2, 0)])
        .unwrap();

    let r = aln.genome_id("R").unwrap();
    {
        let g = aln.genome_mut(r).unwrap();
        g.set_string("CCC").unwrap();
        let b0 = g.bottom_mut(0);
        b0.start = 0;
        b0.length = 3;
        b0.children[0].index = 0;
    }
    let a = aln.genome_id("A").unwrap();
    {
        let g = aln.genome_mut(a).unwrap();
        g.set_string("CCCCCC").unwrap();
        for i in 0..2i64 {
            let t = g.top_mut(i as usize);
            t.start = i * 3;
            t.length = 3;
            t.parent_index = 0;
            t.next_paralogy_index = (i + 1) % 2;
            let b = g.bottom_mut(i as usize);
            b.start = i * 3;
            b.length = 3;
            b.children[0].index = i;
        }
        g.rebuild_parse_indices();
    }
    let b = aln.genome_id("B").unwrap();
    {
        let g = aln.genome_mut(b).unwrap();
        g.set_string("CCCCCC").unwrap();
        for i in 0..2i64 {
            let t = g.top_mut(i as usize);
            t.start = i * 3;
            t.length = 3;
            t.parent_index = i;
        }
    }
    aln
}

#[test]
fn test_coalescence_limit_reports_deep_paralogs() {
    let aln = three_level_duplication();
    validate(&aln).unwrap();
    let b = aln.genome_id("B").unwrap();
    let r = aln.genome_id("R").unwrap();

    // by default only homologies coalescing at the MRCA (B itself) show
    let opts = MapOptions {
        do_dupes: true,
        ..Default::default()
    };
    let mapped = lift_range(&aln, b, 0, 3, b, &opts).unwrap();
    assert_eq!(
        mapped.iter().map(summarize).collect::<Vec<_>>(),
        vec![(0, 2, 0, 2, false)]
    );

    // raising the limit to the root exposes the copy that coalesced in R
    let opts = MapOptions {
        do_dupes: true,
        coalescence_limit: Some(r),
        ..Default::default()
    };
    let mapped = lift_range(&aln, b, 0, 3, b, &opts).unwrap();
    assert_eq!(
        mapped.iter().map(summarize).collect::<Vec<_>>(),
        vec![(0, 2, 0, 2, false), (0, 2, 3, 5, false)]
    );
}

#[test]
fn test_liftover_bed_stream() {
    let aln = two_genome(true);
    let b = aln.genome_id("B").unwrap();
    let a = aln.genome_id("A").unwrap();
    let bed = "# comment\nbseq\t0\t3\tfeature1\n";
    let mut out = Vec::new();
    let n = liftover_bed(
        &aln,
        b,
        a,
        bed.as_bytes(),
        &mut out,
        &MapOptions::default(),
    )
    .unwrap();
    assert_eq!(n, 1);
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "aseq\t7\t10\tfeature1\t0\t-\n"
    );
}

#[test]
fn test_parse_bed_line() {
    assert!(parse_bed_line("").unwrap().is_none());
    assert!(parse_bed_line("track name=foo").unwrap().is_none());
    let rec = parse_bed_line("chr1\t5\t20\tx").unwrap().unwrap();
    assert_eq!((rec.chrom.as_str(), rec.start, rec.end), ("chr1", 5, 20));
    assert!(parse_bed_line("chr1\t5").is_err());
}
