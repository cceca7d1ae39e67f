//! Move and append
//!
//! Both detach the block together with its folded section, attach the run at
//! the destination in original order, then restore the placement rules at
//! the source. Crossing trees schedules reference recounts for everything
//! that moved and for the source document.

use super::place::{destination, fit_to_parent, prune_emptied};
use super::{invalid, stamp_path, OpContext};
use crate::error::{Result, TxError};
use crate::operation::{Operation, Placement};
use crate::transaction::Transaction;
use crate::tree::heading::folded_run;
use crate::tree::{BlockId, BlockNode, BlockType};
use tracing::{debug, warn};

/// Source side of a relocation
struct Cut {
    src_root: BlockId,
    /// Ancestors of the moved block at the source, nearest first
    ancestors: Vec<BlockId>,
}

impl Cut {
    /// Detach `id` and its folded section, refusing destinations inside them
    fn take(
        tx: &mut Transaction,
        src_root: &str,
        id: &str,
        anchor: Option<&str>,
    ) -> Result<(Self, Vec<BlockNode>)> {
        let tree = tx.tree_mut(src_root)?;
        if !tree.contains(id) {
            return Err(TxError::not_found(id));
        }
        let mut moving = vec![id.to_string()];
        moving.extend(folded_run(tree, id));
        if let Some(target) = anchor.filter(|target| tree.contains(target)) {
            if moving.iter().any(|m| tree.is_self_or_ancestor(m, target)) {
                return Err(TxError::InvalidMove {
                    id: id.to_string(),
                    target: target.to_string(),
                });
            }
        }
        let ancestors = tree.ancestors(id);
        let nodes = moving
            .iter()
            .map(|m| tree.detach(m))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let cut = Self {
            src_root: src_root.to_string(),
            ancestors,
        };
        Ok((cut, nodes))
    }

    /// Record cross-tree bookkeeping, then prune and stamp the source
    fn settle(
        self,
        tx: &mut Transaction,
        ctx: &OpContext<'_>,
        dst_root: &str,
        moved: Vec<(BlockId, Vec<BlockId>)>,
        stamp: &str,
    ) -> Result<()> {
        let crossed = self.src_root != dst_root;
        if crossed {
            tx.effects.ref_defs.insert(self.src_root.clone());
            for (id, defs) in moved {
                tx.effects.ref_defs.insert(id);
                tx.effects.ref_defs.extend(defs);
            }
        }

        let tree = tx.tree_mut(&self.src_root)?;
        let pruned = prune_emptied(tree, self.ancestors.first().cloned(), ctx.later)?;
        if let Some(survivor) = self.ancestors.iter().find(|id| tree.contains(id)) {
            stamp_path(tree, survivor, stamp);
        }
        if !pruned.is_empty() {
            tx.forget_blocks(pruned);
        }

        tx.write_tree(&self.src_root)?;
        if crossed {
            tx.write_tree(dst_root)?;
        }
        Ok(())
    }
}

fn summarize(nodes: &[BlockNode]) -> Vec<(BlockId, Vec<BlockId>)> {
    nodes
        .iter()
        .map(|node| {
            let defs = node
                .referenced_defs()
                .into_iter()
                .map(|(def_id, _)| def_id)
                .collect();
            (node.id.clone(), defs)
        })
        .collect()
}

/// Move a block, with its folded section, to the operation's anchor
pub(crate) fn move_block(tx: &mut Transaction, ctx: &OpContext<'_>, op: &Operation) -> Result<()> {
    let anchor = op
        .anchor()
        .ok_or_else(|| invalid(&op.id, "move without anchor"))?;
    if anchor.id() == op.id {
        debug!(id = %op.id, "move onto itself skipped");
        return Ok(());
    }
    let src_root = tx.load_tree(ctx.services, &op.id)?;
    let dst_root = tx.load_tree(ctx.services, anchor.id())?;
    if tx.tree(&src_root).is_some_and(|tree| tree.root_id() == &op.id) {
        return Err(invalid(&op.id, "cannot move the document root"));
    }
    let stamp = ctx.stamp(op);

    let guard = (src_root == dst_root).then_some(anchor.id());
    let (cut, nodes) = Cut::take(tx, &src_root, &op.id, guard)?;
    let moved = summarize(&nodes);

    let (dst, effects) = tx.edit(&dst_root)?;
    let (parent, index) = destination(dst, anchor, Placement::Prepend)?;
    let nodes = fit_to_parent(dst, &parent, nodes);
    let count = nodes.len();
    for (offset, node) in nodes.into_iter().enumerate() {
        dst.attach(&parent, index + offset, node)?;
    }
    stamp_path(dst, &op.id, &stamp);
    effects.updated.insert(op.id.clone());
    debug!(id = %op.id, %parent, index, count, "block moved");
    cut.settle(tx, ctx, &dst_root, moved, &stamp)
}

/// Move a block to the end of the document `parentID`
///
/// A list item joins a trailing list of its kind or gets a new list.
pub(crate) fn append(tx: &mut Transaction, ctx: &OpContext<'_>, op: &Operation) -> Result<()> {
    if op.parent_id.is_empty() || op.parent_id == op.id {
        warn!(id = %op.id, "append without a distinct target document");
        return Ok(());
    }
    let src_root = tx.load_tree(ctx.services, &op.id)?;
    if src_root == op.id {
        warn!(id = %op.id, "cannot append a document to another document");
        return Ok(());
    }
    let dst_root = tx.load_tree(ctx.services, &op.parent_id)?;
    let stamp = ctx.stamp(op);

    let (cut, nodes) = Cut::take(tx, &src_root, &op.id, None)?;
    let moved = summarize(&nodes);

    let (dst, effects) = tx.edit(&dst_root)?;
    let doc = dst.root_id().clone();
    let mut nodes = nodes.into_iter();
    if let Some(first) = nodes.next() {
        let trailing = match first.kind {
            BlockType::ListItem(kind) => dst
                .children(&doc)
                .last()
                .filter(|last| dst.get(last).is_some_and(|b| b.kind == BlockType::List(kind)))
                .cloned(),
            _ => None,
        };
        match trailing {
            Some(list) => {
                dst.append_child(&list, first)?;
            }
            None => {
                for node in fit_to_parent(dst, &doc, vec![first]) {
                    dst.append_child(&doc, node)?;
                }
            }
        }
    }
    for node in nodes {
        dst.append_child(&doc, node)?;
    }
    stamp_path(dst, &op.id, &stamp);
    effects.updated.insert(op.id.clone());
    debug!(id = %op.id, target = %doc, "block appended");
    cut.settle(tx, ctx, &dst_root, moved, &stamp)
}

#[cfg(test)]
mod tests {
    use crate::error::TxError;
    use crate::operation::{Action, Operation};
    use crate::task::Task;
    use crate::testing::Fixture;
    use crate::tree::{heading, BlockNode, BlockType, Inline, ListKind, RefKind, Tree};

    fn doc() -> Tree {
        let root = BlockNode::document("root")
            .with_child(BlockNode::paragraph("x", "anchor"))
            .with_child(BlockNode::heading("h", 2, "Folded"))
            .with_child(BlockNode::paragraph("a", "a"))
            .with_child(BlockNode::paragraph("b", "b"))
            .with_child(BlockNode::paragraph("c", "c"))
            .with_child(BlockNode::heading("h1", 1, "Top"))
            .with_child(
                BlockNode::new("list", BlockType::List(ListKind::Bullet)).with_child(
                    BlockNode::new("li", BlockType::ListItem(ListKind::Bullet))
                        .with_child(BlockNode::paragraph("li-p", "item")),
                ),
            )
            .with_child(BlockNode::new("q", BlockType::Blockquote).with_child(BlockNode::paragraph("q-p", "quote")));
        let mut tree = Tree::new("box", "/doc.sy", root).unwrap();
        heading::fold(&mut tree, "h");
        tree
    }

    fn other() -> Tree {
        let root = BlockNode::document("other")
            .with_child(BlockNode::paragraph("o1", "o"))
            .with_child(
                BlockNode::new("olist", BlockType::List(ListKind::Bullet)).with_child(
                    BlockNode::new("oli", BlockType::ListItem(ListKind::Bullet))
                        .with_child(BlockNode::paragraph("oli-p", "other item")),
                ),
            );
        Tree::new("box", "/other.sy", root).unwrap()
    }

    #[test]
    fn test_move_folded_heading_carries_section_in_order() {
        let fx = Fixture::new().with_tree(doc());
        fx.run(vec![Operation::new(Action::Move, "h").previous("q")]).unwrap();
        let tree = fx.backend.tree("root").unwrap();
        assert_eq!(tree.children("root"), ["x", "h1", "list", "q", "h", "a", "b", "c"]);
    }

    #[test]
    fn test_move_into_own_section_is_rejected() {
        let fx = Fixture::new().with_tree(doc());
        let before = fx.backend.tree("root").unwrap();
        let err = fx
            .run(vec![Operation::new(Action::Move, "h").previous("b")])
            .unwrap_err();
        assert!(matches!(err, TxError::InvalidMove { .. }));
        let err = fx
            .run(vec![Operation::new(Action::Move, "q").parent("q-p")])
            .unwrap_err();
        assert!(matches!(err, TxError::InvalidMove { .. }));
        assert_eq!(fx.backend.tree("root").unwrap(), before);
    }

    #[test]
    fn test_move_sole_item_out_removes_list_and_wraps_item() {
        let fx = Fixture::new().with_tree(doc());
        fx.run(vec![Operation::new(Action::Move, "li").previous("x")]).unwrap();
        let tree = fx.backend.tree("root").unwrap();
        assert!(!tree.contains("list"));
        let wrapper = tree.parent_id("li").unwrap().clone();
        assert_eq!(tree.get(&wrapper).unwrap().kind, BlockType::List(ListKind::Bullet));
        assert_eq!(tree.children("root")[1], wrapper);
    }

    #[test]
    fn test_move_paragraph_into_list_wraps_in_item() {
        let fx = Fixture::new().with_tree(doc());
        fx.run(vec![Operation::new(Action::Move, "x").previous("li")]).unwrap();
        let tree = fx.backend.tree("root").unwrap();
        let item = tree.parent_id("x").unwrap().clone();
        assert!(tree.get(&item).unwrap().kind.is_list_item());
        assert_eq!(tree.parent_id(&item).map(String::as_str), Some("list"));
    }

    #[test]
    fn test_move_to_parent_prepends() {
        let fx = Fixture::new().with_tree(doc());
        fx.run(vec![Operation::new(Action::Move, "x").parent("q")]).unwrap();
        let tree = fx.backend.tree("root").unwrap();
        assert_eq!(tree.children("q"), ["x", "q-p"]);
    }

    #[test]
    fn test_move_across_trees_schedules_recounts() {
        let mut source = doc();
        source
            .get_mut("x")
            .unwrap()
            .inlines
            .push(Inline::reference("def", "d", RefKind::Static));
        let fx = Fixture::new().with_tree(source).with_tree(other());
        fx.run(vec![Operation::new(Action::Move, "x").previous("o1")]).unwrap();

        assert!(!fx.backend.tree("root").unwrap().contains("x"));
        assert_eq!(fx.backend.tree("other").unwrap().children("other"), ["o1", "x", "olist"]);
        assert_eq!(fx.backend.write_count("root"), 1);
        assert_eq!(fx.backend.write_count("other"), 1);
        let keys = fx.tasks.pending_keys();
        for def in ["x", "def", "root"] {
            assert!(keys.contains(&Task::RefCountRefresh { def_id: def.into() }.key()));
        }
    }

    #[test]
    fn test_append_list_item_merges_into_trailing_list() {
        let fx = Fixture::new().with_tree(doc()).with_tree(other());
        fx.run(vec![Operation::new(Action::Append, "li").parent("other")]).unwrap();
        let other = fx.backend.tree("other").unwrap();
        assert_eq!(other.children("olist"), ["oli", "li"]);
        assert!(!fx.backend.tree("root").unwrap().contains("list"));
    }

    #[test]
    fn test_append_item_wraps_when_no_trailing_list() {
        let fx = Fixture::new().with_tree(doc());
        fx.run(vec![Operation::new(Action::Append, "li").parent("root")]).unwrap();
        let tree = fx.backend.tree("root").unwrap();
        let wrapper = tree.children("root").last().unwrap().clone();
        assert_eq!(tree.children(&wrapper), ["li"]);
        assert!(!tree.contains("list"));
    }

    #[test]
    fn test_append_document_is_noop() {
        let fx = Fixture::new().with_tree(doc()).with_tree(other());
        fx.run(vec![Operation::new(Action::Append, "root").parent("other")]).unwrap();
        assert!(fx.backend.tree("other").unwrap().contains("o1"));
    }
}
