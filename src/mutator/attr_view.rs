//! Attribute view row operations
//!
//! A binding has two sides that must agree: the row in the view and the view
//! id in the block's `custom-avs` attribute. Views are edited in the
//! transaction's view cache and saved at commit with their groups rebuilt.

use super::{bump_updated, invalid, OpContext};
use crate::av::{KeyType, Value};
use crate::error::{Result, TxError};
use crate::operation::Operation;
use crate::transaction::Transaction;
use tracing::debug;

/// Bind `srcIDs` as rows of `avID`
pub(crate) fn insert_rows(tx: &mut Transaction, ctx: &OpContext<'_>, op: &Operation) -> Result<()> {
    let av_id = required_view(op)?;
    let view = tx.load_view(ctx.services, av_id)?;
    let added = op.src_ids.iter().filter(|id| view.add_row(id)).count();
    let has_relations = view.relation_keys().next().is_some();
    debug!(%av_id, added, "rows bound");

    for block_id in &op.src_ids {
        set_binding(tx, ctx, op, block_id, av_id, true)?;
    }
    if has_relations {
        tx.effects.relation_views.insert(av_id.to_string());
    }
    Ok(())
}

/// Unbind `srcIDs` from `avID`
pub(crate) fn remove_rows(tx: &mut Transaction, ctx: &OpContext<'_>, op: &Operation) -> Result<()> {
    let av_id = required_view(op)?;
    let view = tx.load_view(ctx.services, av_id)?;
    let removed = op
        .src_ids
        .iter()
        .filter(|id| view.remove_row(id).is_some())
        .count();
    debug!(%av_id, removed, "rows unbound");

    for block_id in &op.src_ids {
        match set_binding(tx, ctx, op, block_id, av_id, false) {
            Err(TxError::BlockNotFound { .. }) => {
                debug!(%block_id, "unbound block no longer exists");
            }
            other => other?,
        }
    }
    tx.effects.relation_views.insert(av_id.to_string());
    Ok(())
}

/// Set the cell of key `keyID` in the row of block `id`; `data` is the new
/// value, null clears the cell
pub(crate) fn update_cell(tx: &mut Transaction, ctx: &OpContext<'_>, op: &Operation) -> Result<()> {
    let av_id = required_view(op)?;
    let value = match &op.data {
        None | Some(serde_json::Value::Null) => None,
        Some(data) => Some(
            serde_json::from_value::<Value>(data.clone())
                .map_err(|err| invalid(&op.id, err.to_string()))?,
        ),
    };

    let view = tx.load_view(ctx.services, av_id)?;
    let relation = matches!(
        view.key(&op.key_id).map(|key| &key.kind),
        Some(KeyType::Relation { .. })
    );
    if !view.set_value(&op.id, &op.key_id, value) {
        return Err(TxError::AttributeViewHandlingFailed {
            av_id: av_id.to_string(),
            reason: format!("no settable cell [row={}, key={}]", op.id, op.key_id),
        });
    }
    debug!(%av_id, row = %op.id, key = %op.key_id, "cell updated");
    if relation {
        tx.effects.relation_views.insert(av_id.to_string());
    }
    Ok(())
}

fn required_view(op: &Operation) -> Result<&str> {
    if op.av_id.is_empty() {
        return Err(invalid(&op.id, "missing attribute view id"));
    }
    Ok(&op.av_id)
}

/// Add or remove `av_id` in the `custom-avs` list of `block_id`
fn set_binding(
    tx: &mut Transaction,
    ctx: &OpContext<'_>,
    op: &Operation,
    block_id: &str,
    av_id: &str,
    bound: bool,
) -> Result<()> {
    let root = tx.load_tree(ctx.services, block_id)?;
    let stamp = ctx.stamp(op);
    let tree = tx.tree_mut(&root)?;
    let block = tree
        .get_mut(block_id)
        .ok_or_else(|| TxError::not_found(block_id))?;
    let mut views = block.bound_views();
    let present = views.iter().any(|id| id == av_id);
    match (bound, present) {
        (true, false) => views.push(av_id.to_string()),
        (false, true) => views.retain(|id| id != av_id),
        _ => return Ok(()),
    }
    block.set_bound_views(&views);
    bump_updated(&mut block.attrs, &stamp);
    tx.write_tree(&root)
}

#[cfg(test)]
mod tests {
    use crate::av::{AttributeView, Key, KeyType, Value};
    use crate::error::TxError;
    use crate::operation::{Action, Operation};
    use crate::task::Task;
    use crate::testing::Fixture;
    use crate::tree::{BlockNode, Tree};

    fn doc() -> Tree {
        let root = BlockNode::document("root")
            .with_child(BlockNode::paragraph("b1", "one"))
            .with_child(BlockNode::paragraph("b2", "two"));
        Tree::new("box", "/doc.sy", root).unwrap()
    }

    fn bind(av_id: &str, ids: &[&str]) -> Operation {
        let mut op = Operation::new(Action::InsertAttrViewBlock, "");
        op.av_id = av_id.into();
        op.src_ids = ids.iter().map(|id| id.to_string()).collect();
        op
    }

    #[test]
    fn test_bind_is_symmetric_and_ignores_duplicates() {
        let fx = Fixture::new().with_tree(doc());
        fx.backend.add_view(AttributeView::new("av", "Table"), &["blk"]);
        fx.run(vec![bind("av", &["b1", "b2"]), bind("av", &["b1"])]).unwrap();

        let view = fx.backend.view("av").unwrap();
        assert_eq!(view.block_ids(), ["b1", "b2"]);
        let tree = fx.backend.tree("root").unwrap();
        assert_eq!(tree.get("b1").unwrap().bound_views(), ["av"]);
    }

    #[test]
    fn test_unbind_clears_both_sides_and_schedules_sync() {
        let fx = Fixture::new().with_tree(doc());
        fx.backend.add_view(AttributeView::new("av", "Table"), &["blk"]);
        fx.run(vec![bind("av", &["b1"])]).unwrap();

        let mut op = bind("av", &["b1"]);
        op.action = Action::RemoveAttrViewBlock;
        fx.run(vec![op]).unwrap();
        assert!(!fx.backend.view("av").unwrap().has_row("b1"));
        assert!(fx.backend.tree("root").unwrap().get("b1").unwrap().bound_views().is_empty());
        let key = Task::AttributeViewSync { av_id: "av".into() }.key();
        assert!(fx.tasks.pending_keys().contains(&key));
    }

    #[test]
    fn test_update_cell_sets_value_and_groups() {
        let fx = Fixture::new().with_tree(doc());
        let mut view = AttributeView::new("av", "Table").with_key(Key::new("status", "Status", KeyType::Select));
        view.group_by = Some("status".into());
        view.add_row("b1");
        fx.backend.add_view(view, &["blk"]);

        let mut op = Operation::new(Action::UpdateAttrViewCell, "b1")
            .with_data(serde_json::json!({"select": "done"}));
        op.av_id = "av".into();
        op.key_id = "status".into();
        fx.run(vec![op]).unwrap();

        let view = fx.backend.view("av").unwrap();
        assert_eq!(view.row("b1").unwrap().values["status"], Value::Select("done".into()));
        assert_eq!(view.groups.len(), 1);
        assert_eq!(view.groups[0].value, "done");
    }

    #[test]
    fn test_update_unknown_key_fails() {
        let fx = Fixture::new().with_tree(doc());
        let mut view = AttributeView::new("av", "Table");
        view.add_row("b1");
        fx.backend.add_view(view, &["blk"]);
        let mut op = Operation::new(Action::UpdateAttrViewCell, "b1");
        op.av_id = "av".into();
        op.key_id = "missing".into();
        let err = fx.run(vec![op]).unwrap_err();
        assert!(matches!(err, TxError::AttributeViewHandlingFailed { .. }));
    }

    #[test]
    fn test_missing_view_aborts() {
        let fx = Fixture::new().with_tree(doc());
        let err = fx.run(vec![bind("nope", &["b1"])]).unwrap_err();
        assert_eq!(err.code(), crate::error::code::ATTRIBUTE_VIEW);
        assert!(fx.backend.tree("root").unwrap().get("b1").unwrap().bound_views().is_empty());
    }
}
