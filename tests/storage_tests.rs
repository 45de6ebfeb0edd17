mod common;

use common::{chain_with_insertion, two_siblings};
use halign::alignment::Alignment;
use halign::randgen::{create_random_alignment, RandGenOptions};
use halign::storage::{detect, AccessMode, BackendKind};
use halign::validate::validate;
use pretty_assertions::assert_eq;
use std::io::Write;

fn round_trip(backend: BackendKind) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aln.hal");

    let source = chain_with_insertion();
    let aln = chain_with_insertion_bound(&path, backend);
    aln.save().unwrap();

    assert_eq!(detect(&path).unwrap(), backend);
    let loaded = Alignment::open(&path, AccessMode::ReadOnly).unwrap();
    validate(&loaded).unwrap();
    assert_eq!(loaded.newick(), source.newick());
    for id in source.tree().ids() {
        let orig = source.genome(id);
        let got = loaded.open_genome(orig.name()).unwrap();
        assert_eq!(got.length(), orig.length());
        assert_eq!(got.tops(), orig.tops());
        assert_eq!(got.bottoms(), orig.bottoms());
        assert_eq!(got.sequences(), orig.sequences());
        let mut a = String::new();
        let mut b = String::new();
        orig.get_substring(&mut a, 0, orig.length()).unwrap();
        got.get_substring(&mut b, 0, got.length()).unwrap();
        assert_eq!(a, b);
    }
}

/// `chain_with_insertion` but bound to a file for saving.
fn chain_with_insertion_bound(path: &std::path::Path, backend: BackendKind) -> Alignment {
    let mut bound = Alignment::create(path, backend).unwrap();
    let template = chain_with_insertion();
    bound.add_root_genome("A").unwrap();
    bound.add_leaf_genome("B", "A", 0.1).unwrap();
    bound.add_leaf_genome("C", "B", 0.1).unwrap();
    for id in template.tree().ids() {
        let src = template.genome(id);
        let dims: Vec<halign::sequence::SequenceInfo> = src
            .sequences()
            .iter()
            .map(|s| {
                halign::sequence::SequenceInfo::new(
                    s.name.clone(),
                    s.length,
                    s.num_tops as u64,
                    s.num_bottoms as u64,
                )
            })
            .collect();
        bound.set_genome_dimensions(src.name(), &dims).unwrap();
        let gid = bound.genome_id(src.name()).unwrap();
        let dst = bound.genome_mut(gid).unwrap();
        let mut dna = String::new();
        src.get_substring(&mut dna, 0, src.length()).unwrap();
        dst.set_string(&dna).unwrap();
        for i in 0..src.num_top_segments() {
            *dst.top_mut(i) = *src.top(i);
        }
        for i in 0..src.num_bottom_segments() {
            *dst.bottom_mut(i) = src.bottom(i).clone();
        }
    }
    bound
}

#[test]
fn test_chunked_round_trip() {
    round_trip(BackendKind::Chunked);
}

#[test]
fn test_mmap_round_trip() {
    round_trip(BackendKind::Mmap);
}

#[test]
fn test_format_detection_rejects_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not_an_alignment");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(b">seq1\nACGT\n").unwrap();
    drop(f);
    assert!(detect(&path).is_err());
    assert!(Alignment::open(&path, AccessMode::ReadOnly).is_err());
}

#[test]
fn test_crashed_writer_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crashed.hal");
    // creating an mmap-backed alignment reserves the file with the dirty
    // bit set; dying before save leaves it that way
    let _aln = Alignment::create(&path, BackendKind::Mmap).unwrap();
    let err = Alignment::open(&path, AccessMode::ReadOnly).unwrap_err();
    assert!(err.to_string().contains("dirty"), "got: {err}");
}

#[test]
fn test_write_denied_on_read_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aln.hal");
    let aln = chain_with_insertion_bound(&path, BackendKind::Chunked);
    aln.save().unwrap();

    let mut loaded = Alignment::open(&path, AccessMode::ReadOnly).unwrap();
    assert!(loaded.add_leaf_genome("D", "B", 0.1).is_err());
    let b = loaded.genome_id("B").unwrap();
    assert!(loaded.genome_mut(b).is_err());
    assert!(loaded.save().is_err());
}

#[test]
fn test_random_alignment_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    for backend in [BackendKind::Chunked, BackendKind::Mmap] {
        let path = dir.path().join(format!("rand_{backend:?}.hal"));
        let mut aln = Alignment::create(&path, backend).unwrap();
        create_random_alignment(
            &mut aln,
            &RandGenOptions {
                max_genomes: 7,
                seed: 1234,
                ..Default::default()
            },
        )
        .unwrap();
        let newick = aln.newick();
        aln.close().unwrap();

        let loaded = Alignment::open(&path, AccessMode::ReadOnly).unwrap();
        validate(&loaded).unwrap();
        assert_eq!(loaded.newick(), newick);
    }
}

#[test]
fn test_genome_substring_io() {
    let aln = two_siblings();
    let p = aln.genome_id("P").unwrap();
    let mut out = String::new();
    aln.genome(p).get_substring(&mut out, 2, 5).unwrap();
    assert_eq!(out, "GTACG");
}

#[test]
fn test_metadata_survives_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meta.hal");
    let mut aln = chain_with_insertion_bound(&path, BackendKind::Chunked);
    aln.meta_mut()
        .insert("assembly".to_string(), "toy-1".to_string());
    let a = aln.genome_id("A").unwrap();
    aln.genome_mut(a)
        .unwrap()
        .meta_mut()
        .insert("ploidy".to_string(), "2".to_string());
    aln.save().unwrap();

    let loaded = Alignment::open(&path, AccessMode::ReadOnly).unwrap();
    assert_eq!(loaded.meta().get("assembly").unwrap(), "toy-1");
    assert!(loaded.meta().contains_key("hal_creation_date"));
    assert_eq!(
        loaded.open_genome("A").unwrap().meta().get("ploidy").unwrap(),
        "2"
    );
}
