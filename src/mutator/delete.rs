use super::place::prune_emptied;
use super::{invalid, stamp_path, OpContext, Removal};
use crate::error::{Result, TxError};
use crate::operation::Operation;
use crate::transaction::Transaction;
use crate::tree::heading::folded_run;
use tracing::debug;

/// Remove a block with its descendants, and its folded section if it is a
/// folded heading
///
/// A target that no longer resolves is skipped: an earlier operation of the
/// same transaction may already have removed it.
pub(crate) fn delete(tx: &mut Transaction, ctx: &OpContext<'_>, op: &Operation) -> Result<()> {
    let root = match tx.load_tree(ctx.services, &op.id) {
        Ok(root) => root,
        Err(TxError::BlockNotFound { .. }) => {
            debug!(id = %op.id, "delete target already gone");
            return Ok(());
        }
        Err(err) => return Err(err),
    };
    let stamp = ctx.stamp(op);

    let tree = tx.tree_mut(&root)?;
    if !tree.contains(&op.id) {
        debug!(id = %op.id, "delete target already gone");
        return Ok(());
    }
    if tree.root_id() == &op.id {
        return Err(invalid(&op.id, "cannot delete the document root"));
    }

    let mut targets = vec![op.id.clone()];
    targets.extend(folded_run(tree, &op.id));
    let mut removal = Removal::of_subtrees(tree, &targets);
    let ancestors = tree.ancestors(&op.id);

    for id in &targets {
        tree.detach(id)?;
    }
    let pruned = prune_emptied(tree, ancestors.first().cloned(), ctx.later)?;
    removal.ids.extend(pruned);

    let survivor = ancestors.into_iter().find(|id| tree.contains(id));
    if let Some(survivor) = &survivor {
        stamp_path(tree, survivor, &stamp);
    }
    debug!(id = %op.id, removed = removal.ids.len(), "block deleted");

    if let Some(survivor) = survivor {
        tx.effects.updated.insert(survivor);
    }
    removal.apply(tx, ctx)?;
    tx.write_tree(&root)
}
