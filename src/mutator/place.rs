//! Container placement rules
//!
//! Lists hold only list items, list items are never empty, a super block's
//! layout marker and a task item's checkbox stay first, and a folded heading
//! keeps its hidden section directly below it.

use crate::error::Result;
use crate::operation::{Action, Anchor, Operation, Placement};
use crate::tree::heading::folded_run;
use crate::tree::{new_block_id, BlockId, BlockNode, BlockType, ListKind, Tree};

use super::invalid;

/// Parent and child index a new block lands at for `anchor`
///
/// A previous anchor that is a folded heading is redirected past its hidden
/// section. A parent anchor that is a leaf places after it.
pub(crate) fn destination(
    tree: &Tree,
    anchor: Anchor<'_>,
    placement: Placement,
) -> Result<(BlockId, usize)> {
    let id = anchor.id();
    let block = tree
        .get(id)
        .ok_or_else(|| crate::error::TxError::not_found(id))?;
    match anchor {
        Anchor::Parent(_) if block.is_container() => {
            let index = match placement {
                Placement::Prepend => leading_markers(tree, id),
                Placement::Append => tree.children(id).len(),
            };
            Ok((id.to_string(), index))
        }
        Anchor::Previous(_) | Anchor::Parent(_) => {
            let run = folded_run(tree, id);
            let after = run.last().map(String::as_str).unwrap_or(id);
            let (parent, index) = slot(tree, after)?;
            Ok((parent, index + 1))
        }
        Anchor::Next(_) => slot(tree, id),
    }
}

fn slot(tree: &Tree, id: &str) -> Result<(BlockId, usize)> {
    let parent = tree
        .parent_id(id)
        .ok_or_else(|| invalid(id, "cannot place beside the document root"))?;
    let index = tree.index_in_parent(id).unwrap_or(0);
    Ok((parent.clone(), index))
}

/// Number of structural markers at the start of `id`'s children
pub(crate) fn leading_markers(tree: &Tree, id: &str) -> usize {
    tree.children(id)
        .iter()
        .take_while(|child| tree.get(child).is_some_and(|b| b.kind.is_marker()))
        .count()
}

/// Replace list payloads by their items when they land inside a list
pub(crate) fn splice_lists(tree: &Tree, parent: &str, nodes: Vec<BlockNode>) -> Vec<BlockNode> {
    if !tree.get(parent).is_some_and(|b| b.kind.is_list()) {
        return nodes;
    }
    nodes
        .into_iter()
        .flat_map(|node| {
            if node.kind.is_list() {
                node.children
            } else {
                vec![node]
            }
        })
        .collect()
}

/// Wrap nodes so they are legal children of `parent`
///
/// Outside a list, runs of list items of one kind get a new list. Inside a
/// list, anything that is not a list item gets a new item of the list's kind.
pub(crate) fn fit_to_parent(tree: &Tree, parent: &str, nodes: Vec<BlockNode>) -> Vec<BlockNode> {
    let parent_kind = tree.get(parent).map(|b| b.kind.clone());
    match parent_kind {
        Some(BlockType::List(kind)) => nodes
            .into_iter()
            .map(|node| {
                if node.kind.is_list_item() {
                    node
                } else {
                    new_item(kind).with_child(node)
                }
            })
            .collect(),
        _ => {
            let mut out: Vec<BlockNode> = Vec::with_capacity(nodes.len());
            for node in nodes {
                let BlockType::ListItem(kind) = node.kind else {
                    out.push(node);
                    continue;
                };
                let extends_wrapper = out.last().is_some_and(|prev| {
                    prev.kind == BlockType::List(kind) && prev.id.is_empty()
                });
                match out.last_mut() {
                    Some(list) if extends_wrapper => list.children.push(node),
                    _ => out.push(BlockNode::new("", BlockType::List(kind)).with_child(node)),
                }
            }
            for node in &mut out {
                if node.id.is_empty() {
                    node.id = new_block_id();
                }
            }
            out
        }
    }
}

/// Empty list item with a fresh id and, for task lists, its checkbox
pub(crate) fn new_item(kind: ListKind) -> BlockNode {
    let item = BlockNode::new(new_block_id(), BlockType::ListItem(kind));
    if kind == ListKind::Task {
        item.with_child(BlockNode::new(new_block_id(), BlockType::TaskMarker))
    } else {
        item
    }
}

/// Restore the placement rules above a block that lost children
///
/// Empty lists are removed, walking up through nested lists. A list item
/// left without content gets an empty paragraph, unless a later operation
/// places something into it. Returns the ids of removed blocks.
pub(crate) fn prune_emptied(
    tree: &mut Tree,
    parent: Option<BlockId>,
    later: &[Operation],
) -> Result<Vec<BlockId>> {
    let mut removed = Vec::new();
    let mut current = parent;
    while let Some(id) = current.take() {
        let Some(block) = tree.get(&id) else {
            break;
        };
        if block.kind.is_list() && tree.children(&id).is_empty() {
            current = tree.parent_id(&id).cloned();
            removed.extend(tree.detach(&id)?.ids());
        } else if block.kind.is_list_item() && tree.content_children(&id).is_empty() {
            if !refilled_later(&id, later) {
                tree.append_child(&id, BlockNode::placeholder())?;
            }
        }
    }
    Ok(removed)
}

fn refilled_later(id: &str, later: &[Operation]) -> bool {
    later.iter().any(|op| {
        op.parent_id == id
            && op.previous_id.is_empty()
            && op.next_id.is_empty()
            && (op.action.is_insert() || matches!(op.action, Action::Move | Action::Append))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::heading;

    fn doc() -> Tree {
        let root = BlockNode::document("root")
            .with_child(BlockNode::heading("h", 1, "Folded"))
            .with_child(BlockNode::paragraph("h-a", "a"))
            .with_child(BlockNode::paragraph("h-b", "b"))
            .with_child(BlockNode::heading("h2", 1, "Next"))
            .with_child(
                BlockNode::new("sb", BlockType::SuperBlock)
                    .with_child(BlockNode::new("sb-m", BlockType::LayoutMarker))
                    .with_child(BlockNode::paragraph("sb-p", "")),
            )
            .with_child(
                BlockNode::new("tl", BlockType::List(ListKind::Task)).with_child(
                    BlockNode::new("ti", BlockType::ListItem(ListKind::Task))
                        .with_child(BlockNode::new("ti-m", BlockType::TaskMarker))
                        .with_child(BlockNode::paragraph("ti-p", "todo")),
                ),
            );
        Tree::new("box", "/p.sy", root).unwrap()
    }

    #[test]
    fn test_destination_redirects_past_folded_section() {
        let mut tree = doc();
        heading::fold(&mut tree, "h");
        let (parent, index) = destination(&tree, Anchor::Previous("h"), Placement::Prepend).unwrap();
        assert_eq!((parent.as_str(), index), ("root", 3));
    }

    #[test]
    fn test_destination_skips_markers() {
        let tree = doc();
        let (parent, index) = destination(&tree, Anchor::Parent("sb"), Placement::Prepend).unwrap();
        assert_eq!((parent.as_str(), index), ("sb", 1));
        let (parent, index) = destination(&tree, Anchor::Parent("ti"), Placement::Prepend).unwrap();
        assert_eq!((parent.as_str(), index), ("ti", 1));
        let (_, index) = destination(&tree, Anchor::Parent("ti"), Placement::Append).unwrap();
        assert_eq!(index, 2);
        let (parent, index) = destination(&tree, Anchor::Parent("h2"), Placement::Prepend).unwrap();
        assert_eq!((parent.as_str(), index), ("root", 4));
        assert!(destination(&tree, Anchor::Next("root"), Placement::Prepend).is_err());
    }

    #[test]
    fn test_fit_wraps_items_outside_lists() {
        let tree = doc();
        let items = vec![
            BlockNode::new("i1", BlockType::ListItem(ListKind::Bullet)),
            BlockNode::new("i2", BlockType::ListItem(ListKind::Bullet)),
            BlockNode::paragraph("p", ""),
        ];
        let fitted = fit_to_parent(&tree, "root", items);
        assert_eq!(fitted.len(), 2);
        assert_eq!(fitted[0].kind, BlockType::List(ListKind::Bullet));
        assert_eq!(fitted[0].children.len(), 2);
        assert!(!fitted[0].id.is_empty());

        let fitted = fit_to_parent(&tree, "tl", vec![BlockNode::paragraph("q", "")]);
        assert!(fitted[0].kind.is_task_item());
        assert_eq!(fitted[0].children[0].kind, BlockType::TaskMarker);
        assert_eq!(fitted[0].children[1].id, "q");
    }

    #[test]
    fn test_prune_removes_empty_list_and_fills_item() {
        let mut tree = doc();
        tree.detach("ti-p").unwrap();
        let removed = prune_emptied(&mut tree, Some("ti".into()), &[]).unwrap();
        assert!(removed.is_empty());
        assert_eq!(tree.content_children("ti").len(), 1);

        tree.detach("ti").unwrap();
        let removed = prune_emptied(&mut tree, Some("tl".into()), &[]).unwrap();
        assert_eq!(removed, vec!["tl"]);
        assert!(!tree.contains("tl"));
    }

    #[test]
    fn test_prune_skips_placeholder_when_refilled() {
        let mut tree = doc();
        tree.detach("ti-p").unwrap();
        let later = [Operation::new(Action::Insert, "x").parent("ti")];
        prune_emptied(&mut tree, Some("ti".into()), &later).unwrap();
        assert!(tree.content_children("ti").is_empty());
    }
}
