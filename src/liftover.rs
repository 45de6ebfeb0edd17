//! BED interval liftover between any two genomes of one alignment.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use noodles::bgzf;

use crate::alignment::Alignment;
use crate::error::{HalError, Result};
use crate::mapped_segment::{map_segments, MapOptions, MappedSegment};
use crate::segment_iter::SegmentIterator;
use crate::tree::GenomeId;

/// Map `[start, start+length)` of `src_genome` (genome coordinates) into
/// `tgt_genome`, walking every segment the range touches.
pub fn lift_range<'a>(
    aln: &'a Alignment,
    src_genome: GenomeId,
    start: i64,
    length: u64,
    tgt_genome: GenomeId,
    opts: &MapOptions,
) -> Result<Vec<MappedSegment<'a>>> {
    let genome = aln.genome(src_genome);
    if length == 0 {
        return Ok(Vec::new());
    }
    if start < 0 || start as u64 + length > genome.length() {
        return Err(HalError::InvalidArgument(format!(
            "range [{start}, {}) outside genome {} of length {}",
            start + length as i64,
            genome.name(),
            genome.length()
        )));
    }
    let end = start + length as i64 - 1;

    let mut it = if genome.num_top_segments() > 0 {
        SegmentIterator::top(aln, src_genome, 0)
    } else {
        SegmentIterator::bottom(aln, src_genome, 0)
    };
    it.to_site(start, false);

    let mut results = Vec::new();
    while it.in_range() && !it.right_of(end) {
        let seg_start = it.start_position();
        let seg_end = it.end_position();
        let lo = seg_start.max(start);
        let hi = seg_end.min(end);
        it.slice((lo - seg_start) as u64, (seg_end - hi) as u64);
        results.extend(map_segments(&it, tgt_genome, opts)?);
        it.slice(0, 0);
        it.to_right(None);
    }
    results.sort_by(crate::mapped_segment::cmp_by_source);
    Ok(results)
}

/// Minimal BED record; extra columns ride along unparsed.
#[derive(Debug, Clone)]
pub struct BedRecord {
    pub chrom: String,
    pub start: i64,
    pub end: i64,
    pub name: Option<String>,
}

pub fn parse_bed_line(line: &str) -> Result<Option<BedRecord>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("track") {
        return Ok(None);
    }
    let fields: Vec<&str> = trimmed.split('\t').collect();
    if fields.len() < 3 {
        return Err(HalError::InvalidArgument(format!(
            "BED line has fewer than 3 fields: {trimmed:?}"
        )));
    }
    Ok(Some(BedRecord {
        chrom: fields[0].to_string(),
        start: fields[1]
            .parse()
            .map_err(|_| HalError::InvalidArgument(format!("bad BED start {:?}", fields[1])))?,
        end: fields[2]
            .parse()
            .map_err(|_| HalError::InvalidArgument(format!("bad BED end {:?}", fields[2])))?,
        name: fields.get(3).map(|s| s.to_string()),
    }))
}

/// Open a BED input, transparently decoding bgzip by extension.
pub fn open_bed_input(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = std::fs::File::open(path).map_err(|e| HalError::io(path, e))?;
    let is_compressed = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == "gz" || ext == "bgz")
        .unwrap_or(false);
    if is_compressed {
        Ok(Box::new(BufReader::new(bgzf::io::reader::Reader::new(
            file,
        ))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Lift every record of a BED stream from `src` to `tgt`, writing the
/// mapped intervals as BED6 (name inherited, score 0, strand from
/// orientation).
pub fn liftover_bed<R: BufRead, W: Write>(
    aln: &Alignment,
    src: GenomeId,
    tgt: GenomeId,
    input: R,
    output: &mut W,
    opts: &MapOptions,
) -> Result<u64> {
    let src_genome = aln.genome(src);
    let tgt_genome = aln.genome(tgt);
    let mut lifted = 0u64;
    for line in input.lines() {
        let line = line.map_err(|e| HalError::io("<bed input>", e))?;
        let Some(rec) = parse_bed_line(&line)? else {
            continue;
        };
        let seq = src_genome.sequence_by_name(&rec.chrom)?;
        if rec.start < 0 || rec.end <= rec.start || rec.end as u64 > seq.length {
            return Err(HalError::InvalidArgument(format!(
                "BED interval {}:{}-{} outside sequence of length {}",
                rec.chrom, rec.start, rec.end, seq.length
            )));
        }
        let abs_start = seq.start + rec.start;
        let mapped = lift_range(
            aln,
            src,
            abs_start,
            (rec.end - rec.start) as u64,
            tgt,
            opts,
        )?;
        let name = rec.name.as_deref().unwrap_or(".");
        for seg in &mapped {
            let (mut lo, mut hi) = (seg.start_position(), seg.end_position());
            if lo > hi {
                std::mem::swap(&mut lo, &mut hi);
            }
            let tseq = tgt_genome.sequence_by_site(lo)?;
            writeln!(
                output,
                "{}\t{}\t{}\t{}\t0\t{}",
                tseq.name,
                lo - tseq.start,
                hi - tseq.start + 1,
                name,
                if seg.reversed() { '-' } else { '+' }
            )
            .map_err(|e| HalError::io("<bed output>", e))?;
            lifted += 1;
        }
    }
    Ok(lifted)
}
