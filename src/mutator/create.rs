use super::{invalid, note_added, parse_payload, stamp_path, OpContext};
use crate::error::Result;
use crate::operation::Operation;
use crate::transaction::Transaction;
use crate::tree::{BlockType, Tree};
use tracing::debug;

/// Create a whole document at the operation's `box`/`path`
pub(crate) fn create(tx: &mut Transaction, ctx: &OpContext<'_>, op: &Operation) -> Result<()> {
    if op.box_id.is_empty() || op.path.is_empty() {
        return Err(invalid(&op.id, "create without box or path"));
    }
    let mut nodes = parse_payload(ctx, op, &op.id)?;
    if nodes.len() != 1 || nodes[0].kind != BlockType::Document {
        return Err(invalid(&op.id, "create expects a single document"));
    }
    let mut root = nodes.remove(0);
    if root.id.is_empty() {
        root.id.clone_from(&op.id);
    }
    root.ensure_ids();
    if tx.cached_root_of(&root.id).is_some() || ctx.services.index.locate(&root.id).is_some() {
        return Err(invalid(&root.id, "document already exists"));
    }

    let stamp = ctx.stamp(op);
    note_added(&mut tx.effects, &root);
    let mut tree = Tree::new(op.box_id.clone(), op.path.clone(), root)?;
    let root_id = tree.root_id().clone();
    stamp_path(&mut tree, &root_id, &stamp);
    debug!(root = %root_id, path = %op.path, "document created");
    tx.cache_tree(tree);
    tx.write_tree(&root_id)
}

#[cfg(test)]
mod tests {
    use crate::operation::{Action, Operation};
    use crate::testing::Fixture;
    use crate::tree::{BlockNode, Tree};

    fn create_op(root: &BlockNode) -> Operation {
        let mut op = Operation::new(Action::Create, root.id.clone()).with_node(root);
        op.box_id = "box".into();
        op.path = "/new.sy".into();
        op
    }

    #[test]
    fn test_create_writes_and_indexes_document() {
        let fx = Fixture::new();
        let root = BlockNode::document("new").with_child(BlockNode::paragraph("", "first"));
        fx.run(vec![create_op(&root)]).unwrap();
        let tree = fx.backend.tree("new").unwrap();
        assert_eq!(tree.path(), "/new.sy");
        assert_eq!(tree.len(), 2);
        assert!(tree.get("new").unwrap().attr("updated").is_some());
    }

    #[test]
    fn test_create_then_insert_in_same_transaction() {
        let fx = Fixture::new();
        let root = BlockNode::document("new");
        fx.run(vec![
            create_op(&root),
            Operation::append_to("new", &BlockNode::paragraph("p", "x")),
        ])
        .unwrap();
        assert_eq!(fx.backend.tree("new").unwrap().children("new"), ["p"]);
        assert_eq!(fx.backend.write_count("new"), 1);
    }

    #[test]
    fn test_create_existing_document_fails() {
        let existing = Tree::new("box", "/a.sy", BlockNode::document("a")).unwrap();
        let fx = Fixture::new().with_tree(existing);
        assert!(fx.run(vec![create_op(&BlockNode::document("a"))]).is_err());
        assert!(fx.run(vec![create_op(&BlockNode::paragraph("p", ""))]).is_err());
    }
}
