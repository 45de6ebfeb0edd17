//! Rooted phylogeny of genome names with branch lengths.
//!
//! Nodes live in an arena and are addressed by index; the child order of a
//! node defines the child-slot numbering used by bottom segments.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::char,
    combinator::opt,
    multi::separated_list1,
    number::complete::double,
    sequence::{delimited, preceded},
    IResult,
};

use crate::error::{HalError, Result};

pub type GenomeId = usize;

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub name: String,
    pub parent: Option<GenomeId>,
    pub children: Vec<GenomeId>,
    /// Length of the branch to the parent; 0 for the root.
    pub branch_length: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: Vec<TreeNode>,
    root: Option<GenomeId>,
    name_map: HashMap<String, GenomeId>,
}

impl Tree {
    pub fn new() -> Self {
        Tree::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> Option<GenomeId> {
        self.root
    }

    pub fn node(&self, id: GenomeId) -> &TreeNode {
        &self.nodes[id]
    }

    pub fn lookup(&self, name: &str) -> Option<GenomeId> {
        self.name_map.get(name).copied()
    }

    pub fn require(&self, name: &str) -> Result<GenomeId> {
        self.lookup(name)
            .ok_or_else(|| HalError::NotFound(format!("genome {name}")))
    }

    pub fn name(&self, id: GenomeId) -> &str {
        &self.nodes[id].name
    }

    pub fn parent(&self, id: GenomeId) -> Option<GenomeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: GenomeId) -> &[GenomeId] {
        &self.nodes[id].children
    }

    pub fn num_children(&self, id: GenomeId) -> usize {
        self.nodes[id].children.len()
    }

    pub fn is_leaf(&self, id: GenomeId) -> bool {
        self.nodes[id].children.is_empty()
    }

    pub fn branch_length(&self, id: GenomeId) -> f64 {
        self.nodes[id].branch_length
    }

    pub fn set_branch_length(&mut self, id: GenomeId, length: f64) {
        self.nodes[id].branch_length = length;
    }

    /// Slot of `child` in its parent's child list.
    pub fn child_slot(&self, parent: GenomeId, child: GenomeId) -> Result<usize> {
        self.nodes[parent]
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or_else(|| {
                HalError::TreeMismatch(format!(
                    "{} is not a child of {}",
                    self.name(child),
                    self.name(parent)
                ))
            })
    }

    pub fn ids(&self) -> impl Iterator<Item = GenomeId> + '_ {
        0..self.nodes.len()
    }

    fn check_new_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(HalError::InvalidArgument("genome name can't be empty".into()));
        }
        if self.name_map.contains_key(name) {
            return Err(HalError::InvalidArgument(format!(
                "genome {name} already exists"
            )));
        }
        Ok(())
    }

    /// Add the root node; only valid on an empty tree.
    pub fn add_root(&mut self, name: &str) -> Result<GenomeId> {
        self.check_new_name(name)?;
        if self.root.is_some() {
            return Err(HalError::TreeMismatch(
                "alignment already has a root genome".into(),
            ));
        }
        let id = self.push_node(name, None, 0.0);
        self.root = Some(id);
        Ok(id)
    }

    /// Attach a new leaf under `parent`.
    pub fn add_leaf(&mut self, name: &str, parent: &str, branch_length: f64) -> Result<GenomeId> {
        self.check_new_name(name)?;
        if branch_length < 0.0 {
            return Err(HalError::InvalidArgument(
                "branch length must be non-negative".into(),
            ));
        }
        let pid = self.require(parent)?;
        let id = self.push_node(name, Some(pid), branch_length);
        self.nodes[pid].children.push(id);
        Ok(id)
    }

    /// Splice a new node into the edge between `parent` and `child`. The
    /// new node takes the child's slot; the old edge length is preserved
    /// as `upper + lower`.
    pub fn insert(
        &mut self,
        name: &str,
        parent: &str,
        child: &str,
        upper_branch_length: f64,
    ) -> Result<GenomeId> {
        self.check_new_name(name)?;
        let pid = self.require(parent)?;
        let cid = self.require(child)?;
        if self.nodes[cid].parent != Some(pid) {
            return Err(HalError::TreeMismatch(format!(
                "no edge between {parent} and {child}"
            )));
        }
        let existing = self.nodes[cid].branch_length;
        if upper_branch_length < 0.0 || upper_branch_length > existing {
            return Err(HalError::InvalidArgument(format!(
                "upper branch length {upper_branch_length} outside [0, {existing}]"
            )));
        }
        let id = self.push_node(name, Some(pid), upper_branch_length);
        let slot = self.child_slot(pid, cid)?;
        self.nodes[pid].children[slot] = id;
        self.nodes[id].children.push(cid);
        self.nodes[cid].parent = Some(id);
        self.nodes[cid].branch_length = existing - upper_branch_length;
        Ok(id)
    }

    /// Remove a leaf. Returns `(removed, moved)` where `moved` is the old
    /// id of the node compacted into the removed slot, if any; callers
    /// keeping parallel arrays mirror the same swap-remove.
    pub fn remove_leaf(&mut self, name: &str) -> Result<(GenomeId, Option<GenomeId>)> {
        let id = self.require(name)?;
        if !self.nodes[id].children.is_empty() {
            return Err(HalError::TreeMismatch(format!("genome {name} has a child")));
        }
        if let Some(pid) = self.nodes[id].parent {
            let slot = self.child_slot(pid, id)?;
            self.nodes[pid].children.remove(slot);
        } else {
            self.root = None;
        }
        self.name_map.remove(name);
        let last = self.nodes.len() - 1;
        self.nodes.swap_remove(id);
        let moved = if id != last {
            // Re-point references to the node that slid into `id`.
            self.name_map.insert(self.nodes[id].name.clone(), id);
            if let Some(pid) = self.nodes[id].parent {
                let slot = self.child_slot(pid, last).unwrap_or_else(|_| unreachable!());
                self.nodes[pid].children[slot] = id;
            } else {
                self.root = Some(id);
            }
            let kids: Vec<GenomeId> = self.nodes[id].children.clone();
            for k in kids {
                self.nodes[k].parent = Some(id);
            }
            Some(last)
        } else {
            None
        };
        Ok((id, moved))
    }

    fn push_node(&mut self, name: &str, parent: Option<GenomeId>, branch_length: f64) -> GenomeId {
        let id = self.nodes.len();
        self.nodes.push(TreeNode {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            branch_length,
        });
        self.name_map.insert(name.to_string(), id);
        id
    }

    /// The child of `ancestor` whose subtree contains `descendant`.
    pub fn child_toward(&self, ancestor: GenomeId, descendant: GenomeId) -> Result<GenomeId> {
        let mut cur = descendant;
        while let Some(parent) = self.nodes[cur].parent {
            if parent == ancestor {
                return Ok(cur);
            }
            cur = parent;
        }
        Err(HalError::TreeMismatch(format!(
            "{} is not a descendant of {}",
            self.name(descendant),
            self.name(ancestor)
        )))
    }

    /// Most recent common ancestor of two genomes.
    pub fn mrca(&self, a: GenomeId, b: GenomeId) -> Result<GenomeId> {
        let mut ancestors = HashSet::new();
        let mut cur = Some(a);
        while let Some(id) = cur {
            ancestors.insert(id);
            cur = self.nodes[id].parent;
        }
        let mut cur = Some(b);
        while let Some(id) = cur {
            if ancestors.contains(&id) {
                return Ok(id);
            }
            cur = self.nodes[id].parent;
        }
        Err(HalError::TreeMismatch(format!(
            "{} and {} share no ancestor",
            self.name(a),
            self.name(b)
        )))
    }

    /// All genomes on the minimal subtree spanning `inputs`.
    pub fn spanning_set(&self, inputs: &[GenomeId]) -> Result<HashSet<GenomeId>> {
        let mut out = HashSet::new();
        let Some(&first) = inputs.first() else {
            return Ok(out);
        };
        let mut mrca = first;
        for &id in &inputs[1..] {
            mrca = self.mrca(mrca, id)?;
        }
        out.insert(mrca);
        for &id in inputs {
            let mut cur = id;
            while cur != mrca {
                out.insert(cur);
                cur = self.nodes[cur].parent.ok_or_else(|| {
                    HalError::TreeMismatch("disconnected tree node".into())
                })?;
            }
        }
        Ok(out)
    }

    /// Render the tree as a Newick string (with branch lengths, no final
    /// newline).
    pub fn to_newick(&self) -> String {
        let mut out = String::new();
        if let Some(root) = self.root {
            self.write_newick(root, &mut out);
        }
        out.push(';');
        out
    }

    fn write_newick(&self, id: GenomeId, out: &mut String) {
        let node = &self.nodes[id];
        if !node.children.is_empty() {
            out.push('(');
            for (i, &c) in node.children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                self.write_newick(c, out);
                let _ = write!(out, ":{}", self.nodes[c].branch_length);
            }
            out.push(')');
        }
        out.push_str(&node.name);
    }

    /// Parse a Newick string into a tree. Every node must be labeled with
    /// a unique genome name.
    pub fn from_newick(newick: &str) -> Result<Tree> {
        let trimmed = newick.trim();
        let (rest, parsed) = newick_tree(trimmed)
            .map_err(|e| HalError::Format(format!("bad newick string: {e}")))?;
        if !rest.trim().is_empty() {
            return Err(HalError::Format(format!(
                "trailing characters after newick tree: {rest:?}"
            )));
        }
        let mut tree = Tree::new();
        tree.adopt(&parsed, None)?;
        Ok(tree)
    }

    fn adopt(&mut self, node: &NewickNode, parent: Option<GenomeId>) -> Result<()> {
        self.check_new_name(&node.name)?;
        if node.branch_length < 0.0 {
            return Err(HalError::Format(format!(
                "negative branch length on {}",
                node.name
            )));
        }
        let id = self.push_node(&node.name, parent, node.branch_length);
        match parent {
            Some(pid) => self.nodes[pid].children.push(id),
            None => self.root = Some(id),
        }
        for child in &node.children {
            self.adopt(child, Some(id))?;
        }
        Ok(())
    }
}

struct NewickNode {
    name: String,
    branch_length: f64,
    children: Vec<NewickNode>,
}

fn newick_label(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !"(),:;".contains(c) && !c.is_whitespace())(input)
}

fn newick_branch(input: &str) -> IResult<&str, NewickNode> {
    let (input, mut node) = newick_subtree(input)?;
    let (input, length) = opt(preceded(char(':'), double))(input)?;
    node.branch_length = length.unwrap_or(0.0);
    Ok((input, node))
}

fn newick_internal(input: &str) -> IResult<&str, NewickNode> {
    let (input, children) = delimited(
        char('('),
        separated_list1(char(','), newick_branch),
        char(')'),
    )(input)?;
    let (input, name) = opt(newick_label)(input)?;
    Ok((
        input,
        NewickNode {
            name: name.unwrap_or("").to_string(),
            branch_length: 0.0,
            children,
        },
    ))
}

fn newick_leaf(input: &str) -> IResult<&str, NewickNode> {
    let (input, name) = newick_label(input)?;
    Ok((
        input,
        NewickNode {
            name: name.to_string(),
            branch_length: 0.0,
            children: Vec::new(),
        },
    ))
}

fn newick_subtree(input: &str) -> IResult<&str, NewickNode> {
    alt((newick_internal, newick_leaf))(input)
}

fn newick_tree(input: &str) -> IResult<&str, NewickNode> {
    let (input, node) = newick_subtree(input)?;
    let (input, _) = char(';')(input)?;
    Ok((input, node))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newick_round_trip() {
        let tree = Tree::from_newick("((son1:0.1,son2:0.2)dad:0.5,uncle:0.7)grandpa;").unwrap();
        assert_eq!(tree.len(), 5);
        let root = tree.root().unwrap();
        assert_eq!(tree.name(root), "grandpa");
        let dad = tree.lookup("dad").unwrap();
        assert_eq!(tree.parent(dad), Some(root));
        assert_eq!(tree.num_children(dad), 2);
        assert!((tree.branch_length(dad) - 0.5).abs() < 1e-12);
        assert_eq!(
            tree.to_newick(),
            "((son1:0.1,son2:0.2)dad:0.5,uncle:0.7)grandpa;"
        );
    }

    #[test]
    fn test_mrca_and_spanning() {
        let tree = Tree::from_newick("((a:1,b:1)ab:1,(c:1,d:1)cd:1)root;").unwrap();
        let a = tree.lookup("a").unwrap();
        let b = tree.lookup("b").unwrap();
        let c = tree.lookup("c").unwrap();
        let ab = tree.lookup("ab").unwrap();
        let root = tree.root().unwrap();
        assert_eq!(tree.mrca(a, b).unwrap(), ab);
        assert_eq!(tree.mrca(a, c).unwrap(), root);
        assert_eq!(tree.mrca(a, a).unwrap(), a);

        let span = tree.spanning_set(&[a, c]).unwrap();
        assert!(span.contains(&a) && span.contains(&c) && span.contains(&root));
        assert!(span.contains(&ab));
        assert!(!span.contains(&b));
    }

    #[test]
    fn test_insert_preserves_total_length() {
        let mut tree = Tree::from_newick("(child:1.0)root;").unwrap();
        tree.insert("mid", "root", "child", 0.25).unwrap();
        let mid = tree.lookup("mid").unwrap();
        let child = tree.lookup("child").unwrap();
        assert_eq!(tree.parent(child), Some(mid));
        assert!((tree.branch_length(mid) + tree.branch_length(child) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_remove_leaf_compacts() {
        let mut tree = Tree::from_newick("((a:1,b:1)ab:1,c:1)root;").unwrap();
        let (removed, moved) = tree.remove_leaf("a").unwrap();
        assert!(moved.is_some() || removed == tree.len());
        assert!(tree.lookup("a").is_none());
        let ab = tree.lookup("ab").unwrap();
        assert_eq!(tree.num_children(ab), 1);
        assert_eq!(tree.name(tree.children(ab)[0]), "b");
        assert!(tree.remove_leaf("ab").is_err()); // still has b
    }
}
