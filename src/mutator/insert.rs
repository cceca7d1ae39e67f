use super::place::{destination, fit_to_parent, splice_lists};
use super::{invalid, note_added, parse_payload, stamp_path, OpContext};
use crate::error::Result;
use crate::operation::{Anchor, Operation, Placement};
use crate::transaction::Transaction;
use std::collections::HashSet;
use tracing::debug;

/// Insert the payload at the operation's anchor; parent anchors prepend
pub(crate) fn insert(tx: &mut Transaction, ctx: &OpContext<'_>, op: &Operation) -> Result<()> {
    let anchor = op
        .anchor()
        .ok_or_else(|| invalid(&op.id, "insert without anchor"))?;
    insert_at(tx, ctx, op, anchor, Placement::Prepend)
}

/// Insert the payload as the first content children of `parentID`
pub(crate) fn prepend_insert(tx: &mut Transaction, ctx: &OpContext<'_>, op: &Operation) -> Result<()> {
    if op.parent_id.is_empty() {
        return Err(invalid(&op.id, "prepend insert without parent"));
    }
    insert_at(tx, ctx, op, Anchor::Parent(&op.parent_id), Placement::Prepend)
}

/// Insert the payload as the last children of `parentID`
pub(crate) fn append_insert(tx: &mut Transaction, ctx: &OpContext<'_>, op: &Operation) -> Result<()> {
    if op.parent_id.is_empty() {
        return Err(invalid(&op.id, "append insert without parent"));
    }
    insert_at(tx, ctx, op, Anchor::Parent(&op.parent_id), Placement::Append)
}

fn insert_at(
    tx: &mut Transaction,
    ctx: &OpContext<'_>,
    op: &Operation,
    anchor: Anchor<'_>,
    placement: Placement,
) -> Result<()> {
    let root = tx.load_tree(ctx.services, anchor.id())?;
    let mut nodes = parse_payload(ctx, op, anchor.id())?;
    if let Some(first) = nodes.first_mut() {
        if first.id.is_empty() {
            first.id.clone_from(&op.id);
        }
    }
    for node in &mut nodes {
        node.ensure_ids();
    }
    let stamp = ctx.stamp(op);

    let (tree, effects) = tx.edit(&root)?;
    let (parent, index) = destination(tree, anchor, placement)?;
    let nodes = splice_lists(tree, &parent, nodes);
    let nodes = fit_to_parent(tree, &parent, nodes);

    let mut seen = HashSet::new();
    for node in &nodes {
        for id in node.ids() {
            if tree.contains(&id) || !seen.insert(id.clone()) {
                return Err(invalid(&id, "block already exists"));
            }
        }
    }

    let mut inserted = Vec::with_capacity(nodes.len());
    for (offset, node) in nodes.into_iter().enumerate() {
        note_added(effects, &node);
        inserted.push(tree.attach(&parent, index + offset, node)?);
    }
    for id in &inserted {
        stamp_path(tree, id, &stamp);
    }
    debug!(%parent, index, count = inserted.len(), "blocks inserted");
    tx.write_tree(&root)
}

#[cfg(test)]
mod tests {
    use crate::operation::{Action, Operation};
    use crate::testing::Fixture;
    use crate::tree::{heading, BlockNode, BlockType, ListKind, Tree, ATTR_UPDATED};

    fn doc() -> Tree {
        let root = BlockNode::document("root")
            .with_child(BlockNode::heading("h", 2, "Title"))
            .with_child(BlockNode::paragraph("h-a", "under"))
            .with_child(
                BlockNode::new("list", BlockType::List(ListKind::Ordered)).with_child(
                    BlockNode::new("li", BlockType::ListItem(ListKind::Ordered))
                        .with_child(BlockNode::paragraph("li-p", "one")),
                ),
            );
        Tree::new("box", "/doc.sy", root).unwrap()
    }

    #[test]
    fn test_insert_first_child_of_root() {
        let fx = Fixture::new().with_tree(doc());
        fx.run(vec![Operation::prepend_to("root", &BlockNode::paragraph("p1", "hi")).at("20240102000000")])
            .unwrap();
        let tree = fx.backend.tree("root").unwrap();
        assert_eq!(tree.children("root")[0], "p1");
        assert_eq!(tree.get("root").unwrap().attr(ATTR_UPDATED), Some("20240102000000"));
        assert_eq!(fx.backend.write_count("root"), 1);
    }

    #[test]
    fn test_insert_list_into_list_splices_items() {
        let fx = Fixture::new().with_tree(doc());
        let payload = BlockNode::new("", BlockType::List(ListKind::Ordered)).with_child(
            BlockNode::new("li2", BlockType::ListItem(ListKind::Ordered))
                .with_child(BlockNode::paragraph("li2-p", "two")),
        );
        fx.run(vec![Operation::insert_after("li", &payload)]).unwrap();
        let tree = fx.backend.tree("root").unwrap();
        assert_eq!(tree.children("list"), ["li", "li2"]);
        assert_eq!(tree.parent_id("li2").map(String::as_str), Some("list"));
    }

    #[test]
    fn test_insert_after_folded_heading_lands_after_section() {
        let mut tree = doc();
        heading::fold(&mut tree, "h");
        let fx = Fixture::new().with_tree(tree);
        fx.run(vec![Operation::insert_after("h", &BlockNode::paragraph("p", "x"))])
            .unwrap();
        let tree = fx.backend.tree("root").unwrap();
        assert_eq!(tree.children("root"), ["h", "h-a", "list", "p"]);
    }

    #[test]
    fn test_payload_without_ids_gets_fresh_ones() {
        let fx = Fixture::new().with_tree(doc());
        let payload = BlockNode::new("", BlockType::Blockquote).with_child(BlockNode::paragraph("", "q"));
        let op = Operation::append_to("root", &payload);
        fx.run(vec![op]).unwrap();
        let tree = fx.backend.tree("root").unwrap();
        let quote = tree.children("root").last().unwrap().clone();
        assert_eq!(tree.get(&quote).unwrap().kind, BlockType::Blockquote);
        assert_eq!(tree.children(&quote).len(), 1);
    }

    #[test]
    fn test_insert_rejects_existing_id() {
        let fx = Fixture::new().with_tree(doc());
        let err = fx
            .run(vec![Operation::insert_after("h", &BlockNode::paragraph("li-p", "dup"))])
            .unwrap_err();
        assert_eq!(err.code(), crate::error::code::INVALID);
        assert_eq!(fx.backend.write_count("root"), 0);
    }

    #[test]
    fn test_insert_unknown_anchor_fails() {
        let fx = Fixture::new().with_tree(doc());
        let op = Operation::new(Action::Insert, "p")
            .previous("missing")
            .with_node(&BlockNode::paragraph("p", ""));
        let err = fx.run(vec![op]).unwrap_err();
        assert_eq!(err.code(), crate::error::code::BLOCK_NOT_FOUND);
    }
}
