//! The alignment: a tree of genomes plus file-level metadata.
//!
//! The alignment exclusively owns its genomes, kept in an arena parallel
//! to the tree nodes; everything else borrows. Construction grows the tree
//! through explicit operations that keep the parent's child-slot arrays in
//! step with the tree shape.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::debug;

use crate::error::{HalError, Result};
use crate::genome::Genome;
use crate::sequence::SequenceInfo;
use crate::storage::{self, AccessMode, BackendKind};
use crate::tree::{GenomeId, Tree};

/// Semantic format version written into new files. A file with a greater
/// major version than this is refused on open.
pub const FORMAT_VERSION: &str = "1.0";

#[derive(Debug)]
pub struct Alignment {
    tree: Tree,
    genomes: Vec<Genome>,
    meta: IndexMap<String, String>,
    mode: AccessMode,
    backend: BackendKind,
    path: Option<PathBuf>,
}

impl Alignment {
    /// Create a new empty alignment not yet bound to a file.
    pub fn new() -> Self {
        let mut meta = IndexMap::new();
        meta.insert(
            "hal_creation_date".to_string(),
            chrono::Utc::now().to_rfc3339(),
        );
        Alignment {
            tree: Tree::new(),
            genomes: Vec::new(),
            meta,
            mode: AccessMode::Create,
            backend: BackendKind::Chunked,
            path: None,
        }
    }

    /// Create a new alignment bound to `path`; the file is written on
    /// `save`/`close`.
    pub fn create(path: impl Into<PathBuf>, backend: BackendKind) -> Result<Self> {
        let mut aln = Alignment::new();
        aln.path = Some(path.into());
        aln.backend = backend;
        if aln.backend == BackendKind::Mmap {
            // the dirty bit has to cover the whole session
            storage::mark_created(aln.path.as_ref().unwrap())?;
        }
        Ok(aln)
    }

    /// Open an existing alignment, sniffing the backend from the magic.
    pub fn open(path: impl AsRef<Path>, mode: AccessMode) -> Result<Self> {
        if mode == AccessMode::Create {
            return Err(HalError::InvalidArgument(
                "use Alignment::create for CREATE access".into(),
            ));
        }
        let path = path.as_ref();
        let (tree, genomes, meta, backend) = storage::load(path, mode)?;
        debug!(
            "opened {} ({} genomes, {:?} backend)",
            path.display(),
            genomes.len(),
            backend
        );
        Ok(Alignment {
            tree,
            genomes,
            meta,
            mode,
            backend,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn meta(&self) -> &IndexMap<String, String> {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut IndexMap<String, String> {
        &mut self.meta
    }

    pub fn newick(&self) -> String {
        self.tree.to_newick()
    }

    pub fn num_genomes(&self) -> usize {
        self.genomes.len()
    }

    pub fn genome(&self, id: GenomeId) -> &Genome {
        &self.genomes[id]
    }

    pub fn genome_mut(&mut self, id: GenomeId) -> Result<&mut Genome> {
        self.require_writable()?;
        Ok(&mut self.genomes[id])
    }

    pub fn genome_id(&self, name: &str) -> Result<GenomeId> {
        self.tree.require(name)
    }

    pub fn open_genome(&self, name: &str) -> Result<&Genome> {
        Ok(&self.genomes[self.tree.require(name)?])
    }

    pub fn root_id(&self) -> Result<GenomeId> {
        self.tree
            .root()
            .ok_or_else(|| HalError::TreeMismatch("alignment has no root genome".into()))
    }

    pub fn root_name(&self) -> Result<&str> {
        Ok(self.tree.name(self.root_id()?))
    }

    fn require_writable(&self) -> Result<()> {
        if self.mode == AccessMode::ReadOnly {
            let name = self
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "alignment".to_string());
            return Err(HalError::WriteDenied(name));
        }
        Ok(())
    }

    /// Add the root genome; only valid on an empty alignment.
    pub fn add_root_genome(&mut self, name: &str) -> Result<GenomeId> {
        self.require_writable()?;
        if !self.genomes.is_empty() {
            return Err(HalError::TreeMismatch(
                "root genome must be added to an empty alignment".into(),
            ));
        }
        let id = self.tree.add_root(name)?;
        self.genomes.push(Genome::new(name));
        debug_assert_eq!(id, self.genomes.len() - 1);
        Ok(id)
    }

    /// Attach a new leaf genome under `parent`. The parent's existing
    /// bottom segments grow a NULL child slot for the newcomer.
    pub fn add_leaf_genome(
        &mut self,
        name: &str,
        parent: &str,
        branch_length: f64,
    ) -> Result<GenomeId> {
        self.require_writable()?;
        let id = self.tree.add_leaf(name, parent, branch_length)?;
        self.genomes.push(Genome::new(name));
        debug_assert_eq!(id, self.genomes.len() - 1);
        let pid = self.tree.parent(id).unwrap();
        let slots = self.tree.num_children(pid);
        self.genomes[pid].grow_child_slots(slots);
        Ok(id)
    }

    /// Splice a new genome into the edge between `parent` and `child`.
    /// Branch lengths split so the old total is preserved. The new genome
    /// keeps the child's slot in the parent; its own arrays start empty.
    pub fn insert_genome(
        &mut self,
        name: &str,
        parent: &str,
        child: &str,
        upper_branch_length: f64,
    ) -> Result<GenomeId> {
        self.require_writable()?;
        let id = self.tree.insert(name, parent, child, upper_branch_length)?;
        self.genomes.push(Genome::new(name));
        debug_assert_eq!(id, self.genomes.len() - 1);
        Ok(id)
    }

    /// Remove a leaf genome. The parent's bottom segments are rewritten in
    /// place without the removed child slot.
    pub fn remove_genome(&mut self, name: &str) -> Result<()> {
        self.require_writable()?;
        let id = self.tree.require(name)?;
        if let Some(pid) = self.tree.parent(id) {
            let slot = self.tree.child_slot(pid, id)?;
            self.genomes[pid].remove_child_slot(slot);
        }
        let (removed, moved) = self.tree.remove_leaf(name)?;
        self.genomes.swap_remove(removed);
        debug_assert!(moved.is_none() || moved == Some(self.genomes.len()));
        Ok(())
    }

    pub fn branch_length(&self, parent: &str, child: &str) -> Result<f64> {
        let pid = self.tree.require(parent)?;
        let cid = self.tree.require(child)?;
        if self.tree.parent(cid) != Some(pid) {
            return Err(HalError::TreeMismatch(format!(
                "no edge between {parent} and {child}"
            )));
        }
        Ok(self.tree.branch_length(cid))
    }

    pub fn update_branch_length(&mut self, parent: &str, child: &str, length: f64) -> Result<()> {
        self.require_writable()?;
        let pid = self.tree.require(parent)?;
        let cid = self.tree.require(child)?;
        if self.tree.parent(cid) != Some(pid) {
            return Err(HalError::TreeMismatch(format!(
                "no edge between {parent} and {child}"
            )));
        }
        self.tree.set_branch_length(cid, length);
        Ok(())
    }

    /// Re-parse and replace the phylogeny. Every genome must appear in the
    /// new tree under the same name with the same parent and child order;
    /// only branch lengths may differ.
    pub fn replace_newick_tree(&mut self, newick: &str) -> Result<()> {
        self.require_writable()?;
        let new_tree = Tree::from_newick(newick)?;
        if new_tree.len() != self.tree.len() {
            return Err(HalError::TreeMismatch(format!(
                "new tree has {} genomes, alignment has {}",
                new_tree.len(),
                self.tree.len()
            )));
        }
        for id in self.tree.ids() {
            let name = self.tree.name(id);
            let new_id = new_tree
                .lookup(name)
                .ok_or_else(|| HalError::TreeMismatch(format!("genome {name} missing from new tree")))?;
            let old_parent = self.tree.parent(id).map(|p| self.tree.name(p));
            let new_parent = new_tree.parent(new_id).map(|p| new_tree.name(p));
            if old_parent != new_parent {
                return Err(HalError::TreeMismatch(format!(
                    "genome {name} changed parent in new tree"
                )));
            }
            let old_kids: Vec<&str> =
                self.tree.children(id).iter().map(|&c| self.tree.name(c)).collect();
            let new_kids: Vec<&str> =
                new_tree.children(new_id).iter().map(|&c| new_tree.name(c)).collect();
            if old_kids != new_kids {
                return Err(HalError::TreeMismatch(format!(
                    "genome {name} changed children in new tree"
                )));
            }
        }
        // Same shape: permute the genome arena into the new id order.
        let mut slots: Vec<Option<Genome>> = self.genomes.drain(..).map(Some).collect();
        let mut genomes: Vec<Genome> = Vec::with_capacity(slots.len());
        for new_id in new_tree.ids() {
            let old_id = self.tree.require(new_tree.name(new_id))?;
            genomes.push(slots[old_id].take().expect("genome moved twice"));
        }
        self.genomes = genomes;
        self.tree = new_tree;
        Ok(())
    }

    /// Set a genome's dimensions, validating segment-array presence
    /// against the tree: top segments require a parent, bottom segments
    /// require children.
    pub fn set_genome_dimensions(&mut self, name: &str, dims: &[SequenceInfo]) -> Result<()> {
        self.require_writable()?;
        let id = self.tree.require(name)?;
        let has_parent = self.tree.parent(id).is_some();
        let num_children = self.tree.num_children(id);
        let tops: u64 = dims.iter().map(|d| d.num_top_segments).sum();
        let bottoms: u64 = dims.iter().map(|d| d.num_bottom_segments).sum();
        if tops > 0 && !has_parent {
            return Err(HalError::InvalidArgument(format!(
                "genome {name} has no parent but {tops} top segments requested"
            )));
        }
        if bottoms > 0 && num_children == 0 {
            return Err(HalError::InvalidArgument(format!(
                "genome {name} has no children but {bottoms} bottom segments requested"
            )));
        }
        self.genomes[id].set_dimensions(dims, num_children)
    }

    /// Checkpoint the session to disk without closing; nothing is durable
    /// before this or `close`.
    pub fn flush(&self) -> Result<()> {
        self.save()
    }

    /// Write the alignment to its file. Dirty pages, the phylogeny and all
    /// metadata land together.
    pub fn save(&self) -> Result<()> {
        self.require_writable()?;
        let path = self.path.as_ref().ok_or_else(|| {
            HalError::InvalidArgument("alignment is not bound to a file".into())
        })?;
        storage::save(self, path, self.backend)
    }

    /// Flush and release. Clears the mmap dirty bit; a session that drops
    /// without closing leaves it set.
    pub fn close(self) -> Result<()> {
        if self.mode != AccessMode::ReadOnly && self.path.is_some() {
            self.save()?;
        }
        Ok(())
    }
}

impl Default for Alignment {
    fn default() -> Self {
        Alignment::new()
    }
}
