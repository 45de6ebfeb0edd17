//! Dense per-genome segment records.
//!
//! A genome with a parent carries an array of top segments pointing up; a
//! genome with children carries an array of bottom segments pointing down
//! to every child slot. Stored indices use `NULL_INDEX` for "no link";
//! cyclic structure (the paralogy ring) is index-based, never pointer-based.

/// Stored null for segment and parse indices.
pub const NULL_INDEX: i64 = -1;

/// Side of the segmentation an iterator or record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Top,
    Bottom,
}

/// Record in a genome that has a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopSegmentData {
    pub start: i64,
    pub length: u64,
    /// Index into the parent genome's bottom array, or NULL_INDEX.
    pub parent_index: i64,
    pub parent_reversed: bool,
    /// Index of the bottom segment of this same genome containing `start`,
    /// or NULL_INDEX when the genome has no children.
    pub bottom_parse_index: i64,
    /// Next member of the paralogy ring, or NULL_INDEX when unique.
    pub next_paralogy_index: i64,
}

impl TopSegmentData {
    pub fn new(start: i64, length: u64) -> Self {
        TopSegmentData {
            start,
            length,
            parent_index: NULL_INDEX,
            parent_reversed: false,
            bottom_parse_index: NULL_INDEX,
            next_paralogy_index: NULL_INDEX,
        }
    }

    pub fn has_parent(&self) -> bool {
        self.parent_index != NULL_INDEX
    }

    pub fn has_next_paralogy(&self) -> bool {
        self.next_paralogy_index != NULL_INDEX
    }
}

/// Link from a bottom segment to one child slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildRef {
    /// Index into that child's top array, or NULL_INDEX.
    pub index: i64,
    pub reversed: bool,
}

impl ChildRef {
    pub const NULL: ChildRef = ChildRef {
        index: NULL_INDEX,
        reversed: false,
    };
}

impl Default for ChildRef {
    fn default() -> Self {
        ChildRef::NULL
    }
}

/// Record in a genome that has at least one child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BottomSegmentData {
    pub start: i64,
    pub length: u64,
    /// Index of the top segment of this same genome containing `start`,
    /// or NULL_INDEX when the genome has no parent.
    pub top_parse_index: i64,
    /// One entry per child slot of the genome.
    pub children: Vec<ChildRef>,
}

impl BottomSegmentData {
    pub fn new(start: i64, length: u64, num_children: usize) -> Self {
        BottomSegmentData {
            start,
            length,
            top_parse_index: NULL_INDEX,
            children: vec![ChildRef::NULL; num_children],
        }
    }

    pub fn has_child(&self, slot: usize) -> bool {
        self.children[slot].index != NULL_INDEX
    }
}
