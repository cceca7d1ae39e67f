use super::{stamp_path, OpContext};
use crate::error::{Result, TxError};
use crate::operation::Operation;
use crate::transaction::Transaction;
use crate::tree::heading;
use tracing::{debug, warn};

pub(crate) fn fold_heading(tx: &mut Transaction, ctx: &OpContext<'_>, op: &Operation) -> Result<()> {
    toggle(tx, ctx, op, true)
}

pub(crate) fn unfold_heading(tx: &mut Transaction, ctx: &OpContext<'_>, op: &Operation) -> Result<()> {
    toggle(tx, ctx, op, false)
}

fn toggle(tx: &mut Transaction, ctx: &OpContext<'_>, op: &Operation, folded: bool) -> Result<()> {
    let root = tx.load_tree(ctx.services, &op.id)?;
    let stamp = ctx.stamp(op);
    let tree = tx.tree_mut(&root)?;
    let block = tree.get(&op.id).ok_or_else(|| TxError::not_found(&op.id))?;
    if block.kind.heading_level().is_none() {
        warn!(id = %op.id, "fold target is not a heading");
        return Ok(());
    }
    let section = if folded {
        heading::fold(tree, &op.id)
    } else {
        heading::unfold(tree, &op.id)
    };
    stamp_path(tree, &op.id, &stamp);
    debug!(id = %op.id, folded, section = section.len(), "heading fold toggled");
    tx.write_tree(&root)
}

#[cfg(test)]
mod tests {
    use crate::operation::{Action, Operation};
    use crate::testing::Fixture;
    use crate::tree::{BlockNode, Tree, ATTR_FOLD, ATTR_HEADING_FOLD};

    fn doc() -> Tree {
        let root = BlockNode::document("root")
            .with_child(BlockNode::heading("h", 1, "Title"))
            .with_child(BlockNode::paragraph("a", "a"))
            .with_child(BlockNode::heading("h2", 2, "Sub"))
            .with_child(BlockNode::paragraph("b", "b"));
        Tree::new("box", "/doc.sy", root).unwrap()
    }

    #[test]
    fn test_fold_then_unfold() {
        let fx = Fixture::new().with_tree(doc());
        fx.run(vec![Operation::new(Action::FoldHeading, "h")]).unwrap();
        let tree = fx.backend.tree("root").unwrap();
        assert!(tree.get("h").unwrap().is_folded_heading());
        for id in ["a", "h2", "b"] {
            assert_eq!(tree.get(id).unwrap().attr(ATTR_HEADING_FOLD), Some("1"));
        }

        fx.run(vec![Operation::new(Action::UnfoldHeading, "h")]).unwrap();
        let tree = fx.backend.tree("root").unwrap();
        assert_eq!(tree.get("h").unwrap().attr(ATTR_FOLD), None);
        assert_eq!(tree.get("b").unwrap().attr(ATTR_FOLD), None);
    }

    #[test]
    fn test_fold_non_heading_is_noop() {
        let fx = Fixture::new().with_tree(doc());
        fx.run(vec![Operation::new(Action::FoldHeading, "a")]).unwrap();
        assert_eq!(fx.backend.tree("root").unwrap().get("a").unwrap().attr(ATTR_FOLD), None);
    }
}
