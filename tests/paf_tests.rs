mod common;

use common::{chain_with_insertion, two_genome, two_siblings};
use halign::paf_export::{export_paf, PafOptions};
use halign::stats::{genome_table, sampled_coverage, sampled_identity};
use pretty_assertions::assert_eq;

fn export_to_string(
    aln: &halign::alignment::Alignment,
    ref_name: &str,
    tgt_name: &str,
    opts: &PafOptions,
) -> String {
    let r = aln.genome_id(ref_name).unwrap();
    let t = aln.genome_id(tgt_name).unwrap();
    let mut out = Vec::new();
    export_paf(aln, r, &[t], &mut out, opts).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_paf_identity_mapping() {
    let aln = two_genome(false);
    let paf = export_to_string(&aln, "B", "A", &PafOptions::default());
    assert_eq!(
        paf,
        "bseq\t10\t0\t10\t+\taseq\t10\t0\t10\t10\t10\t255\tcg:Z:10M\n"
    );
}

#[test]
fn test_paf_reverse_strand() {
    let aln = two_siblings();
    let paf = export_to_string(&aln, "C1", "C2", &PafOptions::default());
    assert_eq!(
        paf,
        "c1seq\t10\t0\t10\t-\tc2seq\t10\t0\t10\t10\t10\t255\tcg:Z:10M\n"
    );
}

#[test]
fn test_paf_bridges_small_gaps() {
    // B's two blocks flank a 4-base insertion in A; with the gap budget
    // they merge into one record carrying a 4D run
    let aln = chain_with_insertion();
    let paf = export_to_string(
        &aln,
        "B",
        "A",
        &PafOptions {
            max_gap: 10,
            ..Default::default()
        },
    );
    assert_eq!(
        paf,
        "bseq\t10\t0\t10\t+\taseq\t14\t0\t14\t10\t14\t255\tcg:Z:5M4D5M\n"
    );

    // with no gap budget the record splits in two
    let paf = export_to_string(
        &aln,
        "B",
        "A",
        &PafOptions {
            max_gap: 0,
            ..Default::default()
        },
    );
    let lines: Vec<&str> = paf.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("cg:Z:5M"));
    assert!(lines[1].ends_with("cg:Z:5M"));
}

#[test]
fn test_genome_table() {
    let aln = chain_with_insertion();
    let rows = genome_table(&aln);
    assert_eq!(rows.len(), 3);
    let a = rows.iter().find(|r| r.name == "A").unwrap();
    assert_eq!(a.length, 14);
    assert_eq!(a.num_children, 1);
    assert_eq!(a.num_bottom_segments, 3);
    assert_eq!(a.num_top_segments, 0);
    let b = rows.iter().find(|r| r.name == "B").unwrap();
    assert_eq!((b.num_top_segments, b.num_bottom_segments), (2, 2));
}

#[test]
fn test_sampled_coverage_and_identity() {
    let aln = two_genome(false);
    let a = aln.genome_id("A").unwrap();
    let b = aln.genome_id("B").unwrap();
    // fully aligned, identical sequences
    let cov = sampled_coverage(&aln, b, a, 200, 7).unwrap();
    assert!((cov - 1.0).abs() < f64::EPSILON);
    let ident = sampled_identity(&aln, b, a, 200, 7).unwrap().unwrap();
    assert!((ident - 1.0).abs() < f64::EPSILON);

    // the inserted bases of A never map to B
    let aln = chain_with_insertion();
    let a = aln.genome_id("A").unwrap();
    let b = aln.genome_id("B").unwrap();
    let cov = sampled_coverage(&aln, a, b, 500, 7).unwrap();
    assert!(cov < 1.0 && cov > 0.5, "coverage {cov}");
}
