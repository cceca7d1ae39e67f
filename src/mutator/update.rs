//! Replace a block by a new version of itself
//!
//! The payload replaces the whole subtree rooted at the target. Blocks of the
//! old subtree missing from the payload are removed; the sections hidden under
//! folded headings of an updated container are not part of the payload and
//! are carried over from the old subtree.

use super::{invalid, parse_payload, stamp_path, OpContext, Removal};
use crate::error::{Result, TxError};
use crate::operation::Operation;
use crate::propagate::ViewBlockChange;
use crate::transaction::Transaction;
use crate::tree::heading::{self, folded_run};
use crate::tree::{BlockId, BlockNode, BlockType, Tree, ATTR_BOUND_VIEWS, ATTR_FOLD, ATTR_HEADING_FOLD};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

pub(crate) fn update(tx: &mut Transaction, ctx: &OpContext<'_>, op: &Operation) -> Result<()> {
    let root = tx.load_tree(ctx.services, &op.id)?;
    let mut new = parse_payload(ctx, op, &op.id)?.swap_remove(0);
    if new.id.is_empty() {
        new.id.clone_from(&op.id);
    }
    new.ensure_ids();
    let stamp = ctx.stamp(op);

    let (tree, effects) = tx.edit(&root)?;
    let (old_level, old_folded) = tree
        .get(&op.id)
        .map(|old| (old.kind.heading_level(), old.is_folded_heading()))
        .ok_or_else(|| TxError::not_found(&op.id))?;

    if tree.root_id() == &op.id {
        let block = tree
            .get_mut(&op.id)
            .ok_or_else(|| TxError::not_found(&op.id))?;
        let bound = block.attr(ATTR_BOUND_VIEWS).map(str::to_string);
        block.attrs = new.attrs;
        if let (Some(bound), false) = (bound, block.attrs.contains_key(ATTR_BOUND_VIEWS)) {
            block.attrs.insert(ATTR_BOUND_VIEWS.to_string(), bound);
        }
        block.inlines = new.inlines;
        stamp_path(tree, &op.id, &stamp);
        effects.updated.insert(op.id.clone());
        debug!(id = %op.id, "document attributes updated");
        return tx.write_tree(&root);
    }

    if new.kind.is_list() && tree.parent(&op.id).is_some_and(|p| p.kind.is_list()) {
        if new.children.is_empty() {
            return Err(invalid(&op.id, "empty list payload"));
        }
        new = new.children.swap_remove(0);
    }
    if new.id != op.id {
        return Err(invalid(&op.id, format!("payload block [{}] does not match", new.id)));
    }

    if new.kind.heading_level() != old_level {
        if let Some(outer) = heading::folding_heading(tree, &op.id) {
            let revealed = heading::unfold(tree, &outer);
            debug!(
                id = %op.id,
                %outer,
                revealed = revealed.len(),
                "section boundary moved, enclosing heading unfolded"
            );
            new.attrs.remove(ATTR_HEADING_FOLD);
        }
    }
    if old_folded && new.kind.heading_level() != old_level {
        let revealed = heading::unfold(tree, &op.id);
        debug!(id = %op.id, revealed = revealed.len(), "heading level changed, section unfolded");
        new.attrs.remove(ATTR_FOLD);
        new.attrs.remove(ATTR_HEADING_FOLD);
    }
    if tree.get(&op.id).is_some_and(|b| b.is_container()) {
        transplant_folded_sections(tree, &op.id, &mut new);
    }
    carry_bound_views(tree, &mut new);

    let old_ids = tree.descendants(&op.id);
    let new_ids: HashSet<BlockId> = new.ids().into_iter().collect();
    let removed: Vec<BlockId> = old_ids
        .iter()
        .filter(|id| !new_ids.contains(*id))
        .cloned()
        .collect();
    let removal = Removal::of_blocks(tree, &removed);

    let old_refs = count_refs(old_ids.iter().filter_map(|id| tree.get(id)).flat_map(|b| {
        b.references().map(|(def_id, _)| def_id.clone()).collect::<Vec<_>>()
    }));
    let new_refs = count_refs(new.referenced_defs().into_iter().map(|(def_id, _)| def_id));
    let changed_defs = old_refs
        .keys()
        .chain(new_refs.keys())
        .filter(|def| old_refs.get(*def) != new_refs.get(*def))
        .cloned()
        .collect::<BTreeSet<_>>();

    let old_id_set: HashSet<&BlockId> = old_ids.iter().collect();
    let mut bound_blocks = Vec::new();
    new.walk(&mut |n| {
        if let BlockType::AttributeView(av_id) = &n.kind {
            if !old_id_set.contains(&n.id) {
                bound_blocks.push(ViewBlockChange::Bind {
                    av_id: av_id.clone(),
                    block_id: n.id.clone(),
                });
            }
        }
    });

    let parent = tree
        .parent_id(&op.id)
        .cloned()
        .ok_or_else(|| invalid(&op.id, "block has no parent"))?;
    let index = tree.index_in_parent(&op.id).unwrap_or(0);
    let old_node = tree.detach(&op.id)?;
    if let Err(err) = tree.attach(&parent, index, new) {
        tree.attach(&parent, index, old_node)?;
        return Err(invalid(&op.id, err.to_string()));
    }
    stamp_path(tree, &op.id, &stamp);

    effects.updated.insert(op.id.clone());
    effects.ref_defs.extend(changed_defs);
    effects.view_blocks.extend(bound_blocks);
    debug!(id = %op.id, removed = removal.ids.len(), "block updated");

    removal.apply(tx, ctx)?;
    tx.write_tree(&root)
}

fn count_refs(defs: impl Iterator<Item = BlockId>) -> BTreeMap<BlockId, usize> {
    let mut counts = BTreeMap::new();
    for def in defs {
        *counts.entry(def).or_insert(0) += 1;
    }
    counts
}

/// Copy the hidden sections of folded headings inside `container` into the
/// replacement, right after the heading they belong to
fn transplant_folded_sections(tree: &Tree, container: &str, new: &mut BlockNode) {
    let mut present: HashSet<BlockId> = new.ids().into_iter().collect();
    for id in tree.descendants(container).iter().skip(1) {
        if !tree.get(id).is_some_and(|b| b.is_folded_heading()) || !present.contains(id) {
            continue;
        }
        let section: Vec<BlockNode> = folded_run(tree, id)
            .iter()
            .filter(|block| !present.contains(*block))
            .filter_map(|block| tree.to_node(block))
            .collect();
        for node in &section {
            present.extend(node.ids());
        }
        if !section.is_empty() {
            insert_after_in(new, id, section);
        }
    }
}

/// Insert `nodes` after the node `anchor` among its siblings inside `subtree`
fn insert_after_in(subtree: &mut BlockNode, anchor: &str, nodes: Vec<BlockNode>) -> bool {
    if let Some(index) = subtree.children.iter().position(|c| c.id == anchor) {
        let tail = subtree.children.split_off(index + 1);
        subtree.children.extend(nodes);
        subtree.children.extend(tail);
        return true;
    }
    let mut nodes = Some(nodes);
    for child in &mut subtree.children {
        if child.find(anchor).is_some() {
            return match nodes.take() {
                Some(nodes) => insert_after_in(child, anchor, nodes),
                None => false,
            };
        }
    }
    false
}

/// Keep row bindings the payload producer did not know about
fn carry_bound_views(tree: &Tree, new: &mut BlockNode) {
    new.walk_mut(&mut |node| {
        if node.attrs.contains_key(ATTR_BOUND_VIEWS) {
            return;
        }
        if let Some(bound) = tree.get(&node.id).and_then(|b| b.attr(ATTR_BOUND_VIEWS)) {
            node.attrs
                .insert(ATTR_BOUND_VIEWS.to_string(), bound.to_string());
        }
    });
}
