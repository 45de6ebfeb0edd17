//! Column iterator: a synchronized walk over every genome producing the
//! columns of the implicit multiple alignment, anchored at a reference.
//!
//! Each column is built by a deterministic stack walk from the reference
//! base through parent, child, and paralogy-ring transitions. A local
//! visited set stops cycles through duplications within one column; a
//! global sharded cache deduplicates across columns in `unique` mode.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use crate::alignment::Alignment;
use crate::dna::DnaIterator;
use crate::error::Result;
use crate::position_cache::PositionCache;
use crate::segment_iter::SegmentIterator;
use crate::tree::GenomeId;

#[derive(Debug, Clone, Default)]
pub struct ColumnOptions {
    /// Restrict output (not traversal) to these genomes.
    pub targets: Option<HashSet<GenomeId>>,
    /// Emit unaligned runs on non-reference sequences as insertion
    /// columns when their length is at most this; 0 cuts them all.
    pub max_insert_length: u64,
    /// Stop all paralog expansion.
    pub no_dupes: bool,
    /// Each target position appears in at most one column.
    pub unique: bool,
    /// Restrict to canonical paralogs.
    pub only_orthologs: bool,
    /// Hide ancestor positions from columns while still walking them.
    pub no_ancestors: bool,
    /// Advance the reference right-to-left.
    pub reverse_walk: bool,
}

/// One homologous site in a column.
#[derive(Debug, Clone, Copy)]
pub struct ColumnEntry<'a> {
    pub genome_id: GenomeId,
    pub sequence_index: usize,
    pub position: i64,
    pub reversed: bool,
    pub dna: DnaIterator<'a>,
}

/// A column: every visited sequence position homologous to one reference
/// base, with a DNA iterator on the correct strand for each.
pub struct Column<'a> {
    aln: &'a Alignment,
    /// Anchor position in the reference, absent for insertion columns.
    pub ref_position: Option<i64>,
    pub entries: Vec<ColumnEntry<'a>>,
}

impl<'a> Column<'a> {
    pub fn entries_for(&self, genome_id: GenomeId, sequence_index: usize) -> Vec<&ColumnEntry<'a>> {
        self.entries
            .iter()
            .filter(|e| e.genome_id == genome_id && e.sequence_index == sequence_index)
            .collect()
    }

    pub fn genomes(&self) -> HashSet<GenomeId> {
        self.entries.iter().map(|e| e.genome_id).collect()
    }
}

impl fmt::Display for Column<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            let genome = self.aln.genome(e.genome_id);
            let seq = genome.sequence(e.sequence_index);
            write!(
                f,
                "{}.{}:{}:{}{}",
                genome.name(),
                seq.name,
                e.position - seq.start,
                if e.reversed { '-' } else { '+' },
                e.dna.base()
            )?;
        }
        Ok(())
    }
}

impl fmt::Debug for Column<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Column[{}]", self)
    }
}

pub struct ColumnIterator<'a> {
    aln: &'a Alignment,
    ref_genome: GenomeId,
    cur_pos: i64,
    last_pos: i64,
    opts: ColumnOptions,
    global_cache: HashMap<GenomeId, PositionCache>,
    last_visited: HashMap<GenomeId, i64>,
    pending: VecDeque<Column<'a>>,
}

impl<'a> ColumnIterator<'a> {
    /// Walk `[start, end]` (inclusive, genome coordinates) of the
    /// reference genome.
    pub fn new(
        aln: &'a Alignment,
        ref_genome: GenomeId,
        start: i64,
        end: i64,
        opts: ColumnOptions,
    ) -> Self {
        let (cur, last) = if opts.reverse_walk {
            (end, start)
        } else {
            (start, end)
        };
        ColumnIterator {
            aln,
            ref_genome,
            cur_pos: cur,
            last_pos: last,
            opts,
            global_cache: HashMap::new(),
            last_visited: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    /// Walk the whole reference genome.
    pub fn over_genome(aln: &'a Alignment, ref_genome: GenomeId, opts: ColumnOptions) -> Self {
        let len = aln.genome(ref_genome).length() as i64;
        ColumnIterator::new(aln, ref_genome, 0, len - 1, opts)
    }

    fn ref_exhausted(&self) -> bool {
        if self.opts.reverse_walk {
            self.cur_pos < self.last_pos
        } else {
            self.cur_pos > self.last_pos
        }
    }

    /// True when no further column will be produced. Advancing past the
    /// end is not an error; `next_column` just returns `None`.
    pub fn at_end(&self) -> bool {
        self.ref_exhausted() && self.pending.is_empty()
    }

    pub fn next_column(&mut self) -> Result<Option<Column<'a>>> {
        loop {
            if let Some(col) = self.pending.pop_front() {
                return Ok(Some(col));
            }
            if self.ref_exhausted() {
                return Ok(None);
            }
            let pos = self.cur_pos;
            self.cur_pos += if self.opts.reverse_walk { -1 } else { 1 };
            self.build_column(pos)?;
            // unique mode can drain a column empty; keep walking
        }
    }

    /// Visit every position homologous to reference `pos`, queueing any
    /// insertion columns first and then the anchored column.
    fn build_column(&mut self, pos: i64) -> Result<()> {
        let tree = self.aln.tree();
        let mut local: HashMap<GenomeId, PositionCache> = HashMap::new();
        let mut stack: Vec<(GenomeId, i64, bool)> = vec![(self.ref_genome, pos, false)];
        let mut entries: Vec<ColumnEntry<'a>> = Vec::new();

        while let Some((g, p, rev)) = stack.pop() {
            let genome = self.aln.genome(g);
            if p < 0 || p as u64 >= genome.length() {
                continue;
            }
            if !local.entry(g).or_default().insert(p as u64) {
                continue;
            }

            let mut emit = true;
            if self.opts.no_ancestors && !tree.is_leaf(g) {
                emit = false;
            }
            if let Some(targets) = &self.opts.targets {
                if g != self.ref_genome && !targets.contains(&g) {
                    emit = false;
                }
            }
            if self.opts.unique && emit {
                emit = self.global_cache.entry(g).or_default().insert(p as u64);
            }
            if emit {
                entries.push(ColumnEntry {
                    genome_id: g,
                    sequence_index: genome.sequence_index_by_site(p)?,
                    position: p,
                    reversed: rev,
                    dna: DnaIterator::new(genome.dna(), p, rev),
                });
            }

            // ascend through the top segmentation
            if genome.num_top_segments() > 0 {
                let mut top = SegmentIterator::top(self.aln, g, 0);
                top.to_site(p, true);
                if top.has_parent() {
                    let parent = SegmentIterator::parent_of(&top)?;
                    stack.push((
                        parent.genome_id(),
                        parent.start_position(),
                        rev ^ parent.reversed(),
                    ));
                }
                if !self.opts.no_dupes && !self.opts.only_orthologs && top.has_next_paralogy() {
                    let mut cursor = top;
                    loop {
                        cursor.to_next_paralogy()?;
                        if cursor.array_index() == top.array_index() {
                            break;
                        }
                        stack.push((g, cursor.start_position(), rev ^ cursor.reversed()));
                    }
                }
            }

            // descend into every aligned child
            if genome.num_bottom_segments() > 0 {
                let mut bottom = SegmentIterator::bottom(self.aln, g, 0);
                bottom.to_site(p, true);
                for slot in 0..genome.num_child_slots() {
                    if bottom.has_child(slot) {
                        let child = SegmentIterator::child_of(&bottom, slot)?;
                        stack.push((
                            child.genome_id(),
                            child.start_position(),
                            rev ^ child.reversed(),
                        ));
                    }
                }
            }
        }

        entries.sort_by_key(|e| (e.genome_id, e.position, e.reversed));
        self.queue_insertions(&entries);
        for e in &entries {
            if e.genome_id != self.ref_genome && !e.reversed {
                self.last_visited
                    .entry(e.genome_id)
                    .and_modify(|last| *last = (*last).max(e.position))
                    .or_insert(e.position);
            }
        }
        if !entries.is_empty() {
            self.pending.push_back(Column {
                aln: self.aln,
                ref_position: Some(pos),
                entries,
            });
        }
        Ok(())
    }

    /// Forward-strand gaps since the previous visit of a non-reference
    /// sequence, up to the insert budget, come out as single-sequence
    /// columns ahead of the anchored one; anything longer is cut.
    fn queue_insertions(&mut self, entries: &[ColumnEntry<'a>]) {
        if self.opts.max_insert_length == 0 || self.opts.reverse_walk {
            return;
        }
        let mut seen: HashSet<GenomeId> = HashSet::new();
        for e in entries {
            if e.genome_id == self.ref_genome || e.reversed || !seen.insert(e.genome_id) {
                continue;
            }
            let Some(&last) = self.last_visited.get(&e.genome_id) else {
                continue;
            };
            let gap = e.position - last - 1;
            if gap < 1 || gap as u64 > self.opts.max_insert_length {
                continue;
            }
            let genome = self.aln.genome(e.genome_id);
            for q in last + 1..e.position {
                let Ok(sequence_index) = genome.sequence_index_by_site(q) else {
                    continue;
                };
                if sequence_index != e.sequence_index {
                    continue;
                }
                self.pending.push_back(Column {
                    aln: self.aln,
                    ref_position: None,
                    entries: vec![ColumnEntry {
                        genome_id: e.genome_id,
                        sequence_index,
                        position: q,
                        reversed: false,
                        dna: DnaIterator::new(genome.dna(), q, false),
                    }],
                });
            }
        }
    }
}
