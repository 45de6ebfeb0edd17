//! PAF export: alignment blocks anchored at a reference genome.
//!
//! Mapped segments are merged into PAF records while the gaps between
//! consecutive blocks stay small; gaps become I/D cigar runs, aligned
//! stretches become M runs.

use std::fmt;
use std::io::Write;

use log::debug;

use crate::alignment::Alignment;
use crate::error::{HalError, Result};
use crate::liftover::lift_range;
use crate::mapped_segment::{MapOptions, MappedSegment};
use crate::tree::GenomeId;

#[derive(Debug, Clone, Copy)]
pub struct PafOptions {
    /// Report duplications too.
    pub do_dupes: bool,
    /// Largest source+target gap bridged inside one PAF record.
    pub max_gap: u64,
    /// Drop mappings shorter than this.
    pub min_length: u64,
}

impl Default for PafOptions {
    fn default() -> Self {
        PafOptions {
            do_dupes: false,
            max_gap: 100,
            min_length: 0,
        }
    }
}

/// One output row; `Display` renders the tab-separated PAF line.
#[derive(Debug, Clone)]
pub struct PafRecord {
    pub query_name: String,
    pub query_len: u64,
    pub query_start: i64,
    pub query_end: i64,
    pub strand: char,
    pub target_name: String,
    pub target_len: u64,
    pub target_start: i64,
    pub target_end: i64,
    pub matches: u64,
    pub block_len: u64,
    pub quality: u8,
    pub cigar: String,
}

impl fmt::Display for PafRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\tcg:Z:{}",
            self.query_name,
            self.query_len,
            self.query_start,
            self.query_end,
            self.strand,
            self.target_name,
            self.target_len,
            self.target_start,
            self.target_end,
            self.matches,
            self.block_len,
            self.quality,
            self.cigar
        )
    }
}

struct RecordBuilder {
    query_name: String,
    query_len: u64,
    target_name: String,
    target_len: u64,
    strand: char,
    query_start: i64,
    query_end: i64, // inclusive
    target_start: i64,
    target_end: i64, // inclusive
    matches: u64,
    insertions: u64,
    deletions: u64,
    cigar: Vec<(u64, char)>,
}

impl RecordBuilder {
    fn push_op(&mut self, n: u64, op: char) {
        if n == 0 {
            return;
        }
        if let Some(last) = self.cigar.last_mut() {
            if last.1 == op {
                last.0 += n;
                return;
            }
        }
        self.cigar.push((n, op));
    }

    fn finish(self) -> PafRecord {
        let cigar = self
            .cigar
            .iter()
            .map(|(n, op)| format!("{n}{op}"))
            .collect::<String>();
        PafRecord {
            query_name: self.query_name,
            query_len: self.query_len,
            query_start: self.query_start,
            query_end: self.query_end + 1,
            strand: self.strand,
            target_name: self.target_name,
            target_len: self.target_len,
            target_start: self.target_start,
            target_end: self.target_end + 1,
            matches: self.matches,
            block_len: self.matches + self.insertions + self.deletions,
            quality: 255,
            cigar,
        }
    }
}

fn source_bounds(seg: &MappedSegment<'_>) -> (i64, i64) {
    let (mut s, mut e) = (
        seg.source().start_position(),
        seg.source().end_position(),
    );
    if s > e {
        std::mem::swap(&mut s, &mut e);
    }
    (s, e)
}

fn target_bounds(seg: &MappedSegment<'_>) -> (i64, i64) {
    let (mut s, mut e) = (seg.start_position(), seg.end_position());
    if s > e {
        std::mem::swap(&mut s, &mut e);
    }
    (s, e)
}

/// Merge source-ordered mapped segments into PAF records.
fn records_from_segments(
    aln: &Alignment,
    src: GenomeId,
    tgt: GenomeId,
    segments: &[MappedSegment<'_>],
    max_gap: u64,
) -> Result<Vec<PafRecord>> {
    let src_genome = aln.genome(src);
    let tgt_genome = aln.genome(tgt);
    let mut out = Vec::new();
    let mut builder: Option<RecordBuilder> = None;

    for seg in segments {
        let (qs_abs, qe_abs) = source_bounds(seg);
        let (ts_abs, te_abs) = target_bounds(seg);
        let reversed = seg.reversed() != seg.source().reversed();
        let qseq = src_genome.sequence_by_site(qs_abs)?;
        let tseq = tgt_genome.sequence_by_site(ts_abs)?;
        let strand = if reversed { '-' } else { '+' };
        let len = seg.length();
        let (qs, qe) = (qs_abs - qseq.start, qe_abs - qseq.start);
        let (ts, te) = (ts_abs - tseq.start, te_abs - tseq.start);

        let mergeable = match &builder {
            Some(b) => {
                let q_gap = qs - b.query_end - 1;
                let t_gap = if b.strand == '+' {
                    ts - b.target_end - 1
                } else {
                    b.target_start - te - 1
                };
                b.query_name == qseq.name
                    && b.target_name == tseq.name
                    && b.strand == strand
                    && q_gap >= 0
                    && t_gap >= 0
                    && (q_gap as u64 + t_gap as u64) <= max_gap
            }
            None => false,
        };

        if mergeable {
            let b = builder.as_mut().unwrap();
            let q_gap = (qs - b.query_end - 1) as u64;
            let t_gap = if b.strand == '+' {
                (ts - b.target_end - 1) as u64
            } else {
                (b.target_start - te - 1) as u64
            };
            b.push_op(q_gap, 'I');
            b.push_op(t_gap, 'D');
            b.push_op(len, 'M');
            b.matches += len;
            b.insertions += q_gap;
            b.deletions += t_gap;
            b.query_end = qe;
            b.target_start = b.target_start.min(ts);
            b.target_end = b.target_end.max(te);
        } else {
            if let Some(b) = builder.take() {
                out.push(b.finish());
            }
            let mut b = RecordBuilder {
                query_name: qseq.name.clone(),
                query_len: qseq.length,
                target_name: tseq.name.clone(),
                target_len: tseq.length,
                strand,
                query_start: qs,
                query_end: qe,
                target_start: ts,
                target_end: te,
                matches: len,
                insertions: 0,
                deletions: 0,
                cigar: Vec::new(),
            };
            b.push_op(len, 'M');
            builder = Some(b);
        }
    }
    if let Some(b) = builder.take() {
        out.push(b.finish());
    }
    Ok(out)
}

/// Export the mappings from `ref_genome` to every genome in `targets` as
/// PAF lines. Returns the number of records written.
pub fn export_paf<W: Write>(
    aln: &Alignment,
    ref_genome: GenomeId,
    targets: &[GenomeId],
    output: &mut W,
    opts: &PafOptions,
) -> Result<u64> {
    let map_opts = MapOptions {
        do_dupes: opts.do_dupes,
        min_length: opts.min_length,
        ..Default::default()
    };
    let mut written = 0u64;
    for &tgt in targets {
        if tgt == ref_genome {
            continue;
        }
        let genome = aln.genome(ref_genome);
        for seq in genome.sequences() {
            let segments = lift_range(aln, ref_genome, seq.start, seq.length, tgt, &map_opts)?;
            debug!(
                "paf: {} -> {}: {} mapped segments on {}",
                genome.name(),
                aln.genome(tgt).name(),
                segments.len(),
                seq.name
            );
            for rec in records_from_segments(aln, ref_genome, tgt, &segments, opts.max_gap)? {
                writeln!(output, "{rec}").map_err(|e| HalError::io("<paf output>", e))?;
                written += 1;
            }
        }
    }
    Ok(written)
}
