//! Sequence directory: named views into a genome's coordinate space.

/// A named, half-open range of a genome's coordinates, with the index
/// ranges of the segments that fall inside it. Sequences are views, not
/// owners: the genome holds the bases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub name: String,
    /// First genome coordinate of the sequence.
    pub start: i64,
    pub length: u64,
    /// Index of the first top segment inside the sequence.
    pub top_start: usize,
    pub num_tops: usize,
    /// Index of the first bottom segment inside the sequence.
    pub bottom_start: usize,
    pub num_bottoms: usize,
}

impl Sequence {
    pub fn end(&self) -> i64 {
        self.start + self.length as i64
    }

    pub fn contains(&self, pos: i64) -> bool {
        pos >= self.start && pos < self.end()
    }
}

/// Dimensions used to lay a genome out: one entry per sequence, in order.
#[derive(Debug, Clone)]
pub struct SequenceInfo {
    pub name: String,
    pub length: u64,
    pub num_top_segments: u64,
    pub num_bottom_segments: u64,
}

impl SequenceInfo {
    pub fn new(
        name: impl Into<String>,
        length: u64,
        num_top_segments: u64,
        num_bottom_segments: u64,
    ) -> Self {
        SequenceInfo {
            name: name.into(),
            length,
            num_top_segments,
            num_bottom_segments,
        }
    }
}

/// Per-sequence segment-count update for `update_top_dimensions` /
/// `update_bottom_dimensions`.
#[derive(Debug, Clone)]
pub struct UpdateInfo {
    pub name: String,
    pub num_segments: u64,
}

impl UpdateInfo {
    pub fn new(name: impl Into<String>, num_segments: u64) -> Self {
        UpdateInfo {
            name: name.into(),
            num_segments,
        }
    }
}
