use crate::geometry::{nearly_equal, Rect, Size, EPSILON};
use crate::model::RegionId;

pub type NodeId = u32;

/// One rectangle in a region's current partition.
///
/// A node is `empty` until it takes an occupant; splits replace one node
/// with the nodes that tile it, so the list always partitions the region.
/// Merging occupied nodes back never happens within one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionNode {
    pub id: NodeId,
    /// Region-local rectangle, origin at the region's top-left corner.
    pub rect: Rect,
    /// Index of the occupying candidate, if any.
    pub occupant: Option<usize>,
}

/// Ordered partition of one logical region.
#[derive(Debug, Clone)]
pub struct RegionPartition {
    /// Workspace-local index of the host device.
    pub device: usize,
    pub region: RegionId,
    /// Host-region size; invariant across splits.
    pub bounding: Size,
    nodes: Vec<RegionNode>,
    next_id: NodeId,
}

impl RegionPartition {
    pub fn new(device: usize, region: RegionId, bounding: Size) -> Self {
        let mut partition = Self {
            device,
            region,
            bounding,
            nodes: Vec::new(),
            next_id: 0,
        };
        partition.reset();
        partition
    }

    /// Collapse back to a single empty root node covering the region.
    pub fn reset(&mut self) {
        let root = self.make_node(Rect::from_size(self.bounding));
        self.nodes = vec![root];
    }

    fn make_node(&mut self, rect: Rect) -> RegionNode {
        let id = self.next_id;
        self.next_id += 1;
        RegionNode {
            id,
            rect,
            occupant: None,
        }
    }

    pub fn nodes(&self) -> &[RegionNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> &RegionNode {
        &self.nodes[index]
    }

    pub fn position_of(&self, id: NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    /// Replace the node at `index` with `replacements`, returning the index
    /// of the first inserted node. The caller guarantees the replacements
    /// tile the replaced rectangle.
    pub fn splice(
        &mut self,
        partition_index: usize,
        index: usize,
        replacements: &[Rect],
        log: &mut UndoLog,
    ) -> usize {
        let inserted: Vec<RegionNode> = replacements
            .iter()
            .map(|rect| self.make_node(*rect))
            .collect();
        let count = inserted.len();
        let removed: Vec<RegionNode> = self
            .nodes
            .splice(index..index + 1, inserted)
            .collect();
        log.push(UndoOp::Splice {
            partition: partition_index,
            index,
            removed,
            inserted: count,
        });
        index
    }

    pub fn occupy(
        &mut self,
        partition_index: usize,
        index: usize,
        candidate: usize,
        log: &mut UndoLog,
    ) {
        debug_assert!(self.nodes[index].occupant.is_none());
        self.nodes[index].occupant = Some(candidate);
        log.push(UndoOp::Occupy {
            partition: partition_index,
            index,
        });
    }

    fn undo(&mut self, op: UndoOp) {
        match op {
            UndoOp::Splice {
                index,
                removed,
                inserted,
                ..
            } => {
                self.nodes.splice(index..index + inserted, removed);
            }
            UndoOp::Occupy { index, .. } => {
                self.nodes[index].occupant = None;
            }
            UndoOp::Debit { .. } => unreachable!("budget ops are undone by the workspace"),
        }
    }

    pub(super) fn apply_undo(&mut self, op: UndoOp) {
        self.undo(op);
    }

    /// Area not covered by occupied nodes.
    pub fn free_area(&self) -> f64 {
        self.nodes
            .iter()
            .filter(|n| n.occupant.is_none())
            .map(|n| n.rect.area())
            .sum()
    }

    /// Merge pairs of unoccupied nodes around the node with id `placed`.
    ///
    /// Two unoccupied nodes merge when they share the full length of one
    /// edge and have identical lengths along the orthogonal axis. Runs to a
    /// fixpoint over the neighbourhood of the placed node.
    pub fn consolidate_around(&mut self, placed: NodeId) {
        let Some(mut seed_index) = self.position_of(placed) else {
            return;
        };
        loop {
            let seed_rect = self.nodes[seed_index].rect;
            let neighbours: Vec<NodeId> = self
                .nodes
                .iter()
                .filter(|n| n.occupant.is_none() && touches(&seed_rect, &n.rect))
                .map(|n| n.id)
                .collect();

            let mut merged_any = false;
            'outer: for id in neighbours {
                let Some(i) = self.position_of(id) else {
                    continue;
                };
                for j in 0..self.nodes.len() {
                    if i == j || self.nodes[j].occupant.is_some() {
                        continue;
                    }
                    if let Some(merged) = merge_rects(&self.nodes[i].rect, &self.nodes[j].rect) {
                        let keep = i.min(j);
                        let drop = i.max(j);
                        self.nodes.remove(drop);
                        let replacement = self.make_node(merged);
                        self.nodes[keep] = replacement;
                        merged_any = true;
                        break 'outer;
                    }
                }
            }

            if !merged_any {
                return;
            }
            // The placed node may have shifted position.
            match self.position_of(placed) {
                Some(index) => seed_index = index,
                None => return,
            }
        }
    }

    /// True when nodes are ordered by (y, then x) of their origin.
    pub fn is_top_left_ordered(&self) -> bool {
        self.nodes.windows(2).all(|pair| {
            let (a, b) = (&pair[0].rect, &pair[1].rect);
            (a.y, a.x) <= (b.y, b.x)
        })
    }

    pub fn sort_top_left(&mut self) {
        self.nodes.sort_by(|a, b| {
            a.rect
                .y
                .total_cmp(&b.rect.y)
                .then(a.rect.x.total_cmp(&b.rect.x))
        });
    }
}

/// Reversible packing operation; popped in LIFO order on rollback.
#[derive(Debug)]
pub enum UndoOp {
    Splice {
        partition: usize,
        index: usize,
        removed: Vec<RegionNode>,
        inserted: usize,
    },
    Occupy {
        partition: usize,
        index: usize,
    },
    Debit {
        device: usize,
        audio: bool,
        video: bool,
    },
}

/// Stack of reversible ops so an attempted placement commits or rolls back
/// without cloning the node lists.
#[derive(Debug, Default)]
pub struct UndoLog {
    ops: Vec<UndoOp>,
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self) -> usize {
        self.ops.len()
    }

    pub fn push(&mut self, op: UndoOp) {
        self.ops.push(op);
    }

    pub fn drain_to(&mut self, mark: usize) -> Vec<UndoOp> {
        self.ops.split_off(mark)
    }

    /// Drop committed ops; the partition state stays as-is.
    pub fn commit(&mut self, mark: usize) {
        self.ops.truncate(mark);
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

fn touches(a: &Rect, b: &Rect) -> bool {
    let horizontal = (nearly_equal(a.right(), b.x) || nearly_equal(b.right(), a.x))
        && a.y < b.bottom() - EPSILON
        && b.y < a.bottom() - EPSILON;
    let vertical = (nearly_equal(a.bottom(), b.y) || nearly_equal(b.bottom(), a.y))
        && a.x < b.right() - EPSILON
        && b.x < a.right() - EPSILON;
    horizontal || vertical
}

/// Merge two rectangles sharing the full length of one edge.
fn merge_rects(a: &Rect, b: &Rect) -> Option<Rect> {
    // Side by side with identical vertical extent.
    if nearly_equal(a.y, b.y) && nearly_equal(a.height, b.height) {
        if nearly_equal(a.right(), b.x) {
            return Some(Rect::new(a.x, a.y, a.width + b.width, a.height));
        }
        if nearly_equal(b.right(), a.x) {
            return Some(Rect::new(b.x, b.y, a.width + b.width, b.height));
        }
    }
    // Stacked with identical horizontal extent.
    if nearly_equal(a.x, b.x) && nearly_equal(a.width, b.width) {
        if nearly_equal(a.bottom(), b.y) {
            return Some(Rect::new(a.x, a.y, a.width, a.height + b.height));
        }
        if nearly_equal(b.bottom(), a.y) {
            return Some(Rect::new(b.x, b.y, b.width, a.height + b.height));
        }
    }
    None
}
