//! Tree-structured latent variables held by a [`State`](crate::State).
//!
//! [`Tree`] is the contract the state relies on. [`PhyloTree`] is a rooted,
//! time-calibrated tree stored as an arena of [`Node`]s, with leaves
//! carrying taxon numbers that index into an external name table.

use std::any::Any;
use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

use crate::dirty::Dirtiness;
use crate::error::{StateResult, ValidationError};

/// A named structured latent variable owned by exactly one state.
pub trait Tree: fmt::Debug + Send {
    /// Name used for lookups inside the owning state.
    fn name(&self) -> &str;

    /// Strongest marker found anywhere in the tree.
    fn dirtiness(&self) -> Dirtiness;

    /// Marker of every node in a fixed node order.
    fn node_markers(&self) -> Vec<Dirtiness>;

    /// Sets `flag` on every node reachable from the root.
    fn make_dirty(&mut self, flag: Dirtiness);

    /// Structural consistency check. Diagnostic only.
    fn validate(&self) -> Result<(), ValidationError>;

    /// Debug rendering of the root node and everything below it.
    fn render_root(&self) -> String;

    /// Newick rendering; leaf `i` is printed as `labels[i]` when present.
    fn to_newick(&self, labels: &[String]) -> String;

    /// Independent deep copy with identical structure and markers.
    fn copy_boxed(&self) -> StateResult<Box<dyn Tree>>;

    /// Access to the concrete type for tree-specific moves.
    fn as_any(&self) -> &dyn Any;

    /// Mutable access to the concrete type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// One node of a [`PhyloTree`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    parent: Option<usize>,
    children: Vec<usize>,
    height: f64,
    taxon: Option<usize>,
    #[serde(default)]
    dirtiness: Dirtiness,
}

impl Node {
    /// Parent index, `None` for the root.
    #[must_use]
    pub const fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Child indices in insertion order.
    #[must_use]
    pub fn children(&self) -> &[usize] {
        &self.children
    }

    /// Height above the present.
    #[must_use]
    pub const fn height(&self) -> f64 {
        self.height
    }

    /// Taxon number for leaves created at construction.
    #[must_use]
    pub const fn taxon(&self) -> Option<usize> {
        self.taxon
    }

    /// Change marker of this node alone.
    #[must_use]
    pub const fn dirtiness(&self) -> Dirtiness {
        self.dirtiness
    }

    /// True when the node has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Rooted tree with node heights.
///
/// Nodes are addressed by their position in the arena. Passing an index
/// past [`len`](PhyloTree::len) to a node accessor or mutator panics.
///
/// # Examples
///
/// ```
/// use chainstate::{PhyloTree, Tree};
///
/// // ((A,B),C) with tips first, then internal nodes.
/// let tree = PhyloTree::from_parents(
///     "t",
///     vec![Some(3), Some(3), Some(4), Some(4), None],
///     vec![0.0, 0.0, 0.0, 1.0, 3.0],
/// )
/// .unwrap();
/// let labels = vec!["A".to_string(), "B".to_string(), "C".to_string()];
/// assert_eq!(tree.to_newick(&labels), "(C:3,(A:1,B:1):2);");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhyloTree {
    name: String,
    nodes: Vec<Node>,
    root: usize,
}

impl PhyloTree {
    /// Builds a tree from one parent link and one height per node.
    ///
    /// Childless nodes become leaves and receive taxon numbers in index
    /// order. The result is validated before it is returned.
    pub fn from_parents(
        name: impl Into<String>,
        parents: Vec<Option<usize>>,
        heights: Vec<f64>,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if parents.len() != heights.len() {
            return Err(ValidationError::InvalidTreeShape {
                tree: name,
                reason: format!(
                    "{} parent links but {} heights",
                    parents.len(),
                    heights.len()
                ),
            });
        }

        let n = parents.len();
        let mut children = vec![Vec::new(); n];
        for (node, parent) in parents.iter().enumerate() {
            if let Some(p) = *parent {
                if p >= n {
                    return Err(ValidationError::DanglingLink {
                        tree: name,
                        node,
                        target: p,
                    });
                }
                children[p].push(node);
            }
        }

        let roots: Vec<usize> = (0..n).filter(|&i| parents[i].is_none()).collect();
        if roots.len() != 1 {
            return Err(ValidationError::RootCount {
                tree: name,
                count: roots.len(),
            });
        }

        let mut next_taxon = 0;
        let nodes = parents
            .into_iter()
            .zip(heights)
            .zip(children)
            .map(|((parent, height), children)| {
                let taxon = if children.is_empty() {
                    next_taxon += 1;
                    Some(next_taxon - 1)
                } else {
                    None
                };
                Node {
                    parent,
                    children,
                    height,
                    taxon,
                    dirtiness: Dirtiness::Clean,
                }
            })
            .collect();

        let tree = Self {
            name,
            nodes,
            root: roots[0],
        };
        tree.validate()?;
        Ok(tree)
    }

    /// Index of the root node.
    #[must_use]
    pub const fn root(&self) -> usize {
        self.root
    }

    /// Number of nodes, leaves included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the arena holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node at `index`.
    #[must_use]
    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    /// All nodes in arena order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of childless nodes.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Changes a node height and marks the node dirty.
    pub fn set_node_height(&mut self, index: usize, height: f64) {
        let node = &mut self.nodes[index];
        node.height = height;
        node.dirtiness = node.dirtiness.escalate(Dirtiness::Dirty);
    }

    /// Moves the subtree rooted at `child` under `new_parent`.
    ///
    /// The moved node and both the old and new parent are marked gored.
    /// A move that would leave the old parent without children is refused,
    /// since that node has no taxon to print.
    pub fn reattach(&mut self, child: usize, new_parent: usize) -> Result<(), ValidationError> {
        let Some(old_parent) = self.nodes[child].parent else {
            return Err(self.invalid_move("the root cannot be moved"));
        };
        if old_parent != new_parent && self.nodes[old_parent].children.len() < 2 {
            return Err(self.invalid_move("the old parent would be left without children"));
        }
        if self.nodes[new_parent].taxon.is_some() {
            return Err(self.invalid_move("cannot attach below a leaf"));
        }

        let mut cursor = Some(new_parent);
        while let Some(at) = cursor {
            if at == child {
                return Err(self.invalid_move("cannot attach a subtree below itself"));
            }
            cursor = self.nodes[at].parent;
        }

        self.nodes[old_parent].children.retain(|&c| c != child);
        self.nodes[new_parent].children.push(child);
        self.nodes[child].parent = Some(new_parent);
        for index in [child, old_parent, new_parent] {
            self.nodes[index].dirtiness = Dirtiness::Gored;
        }
        Ok(())
    }

    fn invalid_move(&self, reason: &str) -> ValidationError {
        ValidationError::InvalidTreeShape {
            tree: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    fn mark_subtree(&mut self, index: usize, flag: Dirtiness) {
        let mut stack = vec![index];
        while let Some(at) = stack.pop() {
            self.nodes[at].dirtiness = flag;
            stack.extend_from_slice(&self.nodes[at].children);
        }
    }

    /// Writes the subtree below the root in parenthesised form. `leaf`
    /// prints a leaf's label and `suffix` whatever follows any node.
    fn walk<L, S>(&self, f: &mut fmt::Formatter<'_>, leaf: L, suffix: S) -> fmt::Result
    where
        L: Fn(&mut fmt::Formatter<'_>, &Node, usize) -> fmt::Result,
        S: Fn(&mut fmt::Formatter<'_>, &Node, usize) -> fmt::Result,
    {
        if self.nodes.is_empty() {
            return Ok(());
        }
        let mut stack = vec![Step::Enter {
            index: self.root,
            first: true,
        }];
        while let Some(step) = stack.pop() {
            match step {
                Step::Enter { index, first } => {
                    if !first {
                        f.write_char(',')?;
                    }
                    let node = &self.nodes[index];
                    if node.is_leaf() {
                        leaf(f, node, index)?;
                        suffix(f, node, index)?;
                    } else {
                        f.write_char('(')?;
                        stack.push(Step::Exit(index));
                        stack.extend(node.children.iter().enumerate().rev().map(|(k, &child)| {
                            Step::Enter {
                                index: child,
                                first: k == 0,
                            }
                        }));
                    }
                }
                Step::Exit(index) => {
                    f.write_char(')')?;
                    suffix(f, &self.nodes[index], index)?;
                }
            }
        }
        Ok(())
    }
}

/// Pending work in an iterative walk.
enum Step {
    Enter { index: usize, first: bool },
    Exit(usize),
}

/// Debug rendering: `index[height]` after every node.
impl fmt::Display for PhyloTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.walk(
            f,
            |_, _, _| Ok(()),
            |f, node, index| write!(f, "{index}[{}]", node.height),
        )
    }
}

/// Newick rendering borrowed from a tree and a label table.
struct Newick<'a> {
    tree: &'a PhyloTree,
    labels: &'a [String],
}

impl fmt::Display for Newick<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nodes = &self.tree.nodes;
        self.tree.walk(
            f,
            |f, node, index| {
                let taxon = node.taxon.unwrap_or(index);
                match self.labels.get(taxon) {
                    Some(label) => f.write_str(label),
                    None => write!(f, "{taxon}"),
                }
            },
            |f, node, _| match node.parent {
                Some(parent) => write!(f, ":{}", nodes[parent].height - node.height),
                None => Ok(()),
            },
        )?;
        f.write_char(';')
    }
}

impl Tree for PhyloTree {
    fn name(&self) -> &str {
        &self.name
    }

    fn dirtiness(&self) -> Dirtiness {
        self.nodes
            .iter()
            .map(Node::dirtiness)
            .max()
            .unwrap_or(Dirtiness::Clean)
    }

    fn node_markers(&self) -> Vec<Dirtiness> {
        self.nodes.iter().map(Node::dirtiness).collect()
    }

    fn make_dirty(&mut self, flag: Dirtiness) {
        if !self.nodes.is_empty() {
            self.mark_subtree(self.root, flag);
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let n = self.nodes.len();
        let roots = self.nodes.iter().filter(|node| node.parent.is_none()).count();
        if roots != 1 || self.root >= n || self.nodes[self.root].parent.is_some() {
            return Err(ValidationError::RootCount {
                tree: self.name.clone(),
                count: roots,
            });
        }

        for (index, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() != node.taxon.is_some() {
                let reason = if node.is_leaf() {
                    format!("node {index} has no children and no taxon")
                } else {
                    format!("node {index} has children and a taxon")
                };
                return Err(ValidationError::InvalidTreeShape {
                    tree: self.name.clone(),
                    reason,
                });
            }
            if let Some(parent) = node.parent {
                let Some(p) = self.nodes.get(parent) else {
                    return Err(ValidationError::DanglingLink {
                        tree: self.name.clone(),
                        node: index,
                        target: parent,
                    });
                };
                if !p.children.contains(&index) {
                    return Err(ValidationError::BrokenLink {
                        tree: self.name.clone(),
                        parent,
                        child: index,
                    });
                }
                if node.height > p.height {
                    return Err(ValidationError::NegativeBranch {
                        tree: self.name.clone(),
                        parent,
                        child: index,
                        parent_height: p.height,
                        child_height: node.height,
                    });
                }
            }
            for &child in &node.children {
                let Some(c) = self.nodes.get(child) else {
                    return Err(ValidationError::DanglingLink {
                        tree: self.name.clone(),
                        node: index,
                        target: child,
                    });
                };
                if c.parent != Some(index) {
                    return Err(ValidationError::BrokenLink {
                        tree: self.name.clone(),
                        parent: index,
                        child,
                    });
                }
            }
        }

        let mut visited = vec![false; n];
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            if std::mem::replace(&mut visited[index], true) {
                continue;
            }
            stack.extend(self.nodes[index].children.iter().copied());
        }
        if let Some(node) = visited.iter().position(|&seen| !seen) {
            return Err(ValidationError::Unreachable {
                tree: self.name.clone(),
                node,
            });
        }
        Ok(())
    }

    fn render_root(&self) -> String {
        self.to_string()
    }

    fn to_newick(&self, labels: &[String]) -> String {
        Newick { tree: self, labels }.to_string()
    }

    fn copy_boxed(&self) -> StateResult<Box<dyn Tree>> {
        Ok(Box::new(self.clone()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
