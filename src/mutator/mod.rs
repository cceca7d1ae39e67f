//! Structural mutators
//!
//! One handler per operation kind. Every handler resolves the trees it needs
//! through the transaction's cache, edits them in place, records derived work
//! in the transaction's effects and marks the trees written. A handler that
//! returns an error leaves the cache in an unspecified state; the transaction
//! is rolled back and the cache discarded.

mod attr_view;
mod create;
mod delete;
mod fold;
mod insert;
mod place;
mod relocate;
mod update;

pub(crate) use attr_view::{insert_rows, remove_rows, update_cell};
pub(crate) use create::create;
pub(crate) use delete::delete;
pub(crate) use fold::{fold_heading, unfold_heading};
pub(crate) use insert::{append_insert, insert, prepend_insert};
pub(crate) use relocate::{append, move_block};
pub(crate) use update::update;

use crate::av::ViewId;
use crate::error::{Result, TxError};
use crate::operation::Operation;
use crate::propagate::{Effects, ViewBlockChange};
use crate::storage::Services;
use crate::transaction::Transaction;
use crate::tree::{BlockId, BlockNode, BlockType, Tree, ATTR_UPDATED};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// What a handler sees besides the transaction and its own operation
pub(crate) struct OpContext<'a> {
    pub services: &'a Services,
    /// Operations after the current one, in order
    pub later: &'a [Operation],
}

impl OpContext<'_> {
    /// Timestamp of `op`, or the clock's reading when it carries none
    pub fn stamp(&self, op: &Operation) -> String {
        op.timestamp
            .clone()
            .unwrap_or_else(|| self.services.clock.now())
    }
}

/// Signature shared by every entry of the dispatch table
pub(crate) type Handler = fn(&mut Transaction, &OpContext<'_>, &Operation) -> Result<()>;

pub(crate) fn invalid(id: &str, reason: impl Into<String>) -> TxError {
    TxError::InvalidPayload {
        id: id.to_string(),
        reason: reason.into(),
    }
}

/// Decode the payload of `op` into detached subtrees; ids are not assigned
pub(crate) fn parse_payload(ctx: &OpContext<'_>, op: &Operation, id: &str) -> Result<Vec<BlockNode>> {
    let data = op
        .data
        .as_ref()
        .ok_or_else(|| invalid(id, "missing data"))?;
    let nodes = ctx
        .services
        .parser
        .parse(data)
        .map_err(|err| invalid(id, err.to_string()))?;
    if nodes.is_empty() {
        return Err(invalid(id, "invalid data tree"));
    }
    Ok(nodes)
}

/// Raise `updated` to `stamp` unless it already is later
pub(crate) fn bump_updated(attrs: &mut BTreeMap<String, String>, stamp: &str) {
    match attrs.get(ATTR_UPDATED) {
        Some(current) if current.as_str() >= stamp => {}
        _ => {
            attrs.insert(ATTR_UPDATED.to_string(), stamp.to_string());
        }
    }
}

/// Bump `updated` of `id` and every structural ancestor
pub(crate) fn stamp_path(tree: &mut Tree, id: &str, stamp: &str) {
    let mut chain = vec![id.to_string()];
    chain.extend(tree.ancestors(id));
    for id in chain {
        if let Some(block) = tree.get_mut(&id) {
            bump_updated(&mut block.attrs, stamp);
        }
    }
}

/// Record a subtree that entered a tree
pub(crate) fn note_added(effects: &mut Effects, node: &BlockNode) {
    effects.updated.insert(node.id.clone());
    for (def_id, _) in node.referenced_defs() {
        effects.ref_defs.insert(def_id);
    }
    node.walk(&mut |n| {
        if let BlockType::AttributeView(av_id) = &n.kind {
            effects.view_blocks.push(ViewBlockChange::Bind {
                av_id: av_id.clone(),
                block_id: n.id.clone(),
            });
        }
    });
}

/// Blocks about to leave a tree, with what must be cleaned up after them
#[derive(Debug, Default)]
pub(crate) struct Removal {
    pub ids: Vec<BlockId>,
    pub defs: BTreeSet<BlockId>,
    pub bound: Vec<(BlockId, Vec<ViewId>)>,
    pub view_blocks: Vec<(ViewId, BlockId)>,
}

impl Removal {
    /// Collect the given blocks, not their descendants
    pub fn of_blocks<'a>(tree: &Tree, ids: impl IntoIterator<Item = &'a BlockId>) -> Self {
        let mut removal = Self::default();
        for id in ids {
            let Some(block) = tree.get(id) else {
                continue;
            };
            removal.ids.push(id.clone());
            removal
                .defs
                .extend(block.references().map(|(def_id, _)| def_id.clone()));
            let views = block.bound_views();
            if !views.is_empty() {
                removal.bound.push((id.clone(), views));
            }
            if let BlockType::AttributeView(av_id) = &block.kind {
                removal.view_blocks.push((av_id.clone(), id.clone()));
            }
        }
        removal
    }

    /// Collect the subtrees rooted at `roots`
    pub fn of_subtrees(tree: &Tree, roots: &[BlockId]) -> Self {
        let ids: Vec<BlockId> = roots
            .iter()
            .flat_map(|root| tree.descendants(root))
            .collect();
        Self::of_blocks(tree, &ids)
    }

    /// Drop the rows of removed bound blocks and queue the cleanup of
    /// everything else; the blocks must already be detached
    pub fn apply(self, tx: &mut Transaction, ctx: &OpContext<'_>) -> Result<()> {
        for (block_id, views) in &self.bound {
            for av_id in views {
                if ctx.services.views.is_mirror(av_id) {
                    debug!(%av_id, %block_id, "mirror view keeps its row");
                    continue;
                }
                let view = tx.load_view(ctx.services, av_id)?;
                if view.remove_row(block_id).is_some() {
                    tx.effects.relation_views.insert(av_id.clone());
                }
            }
        }
        for (av_id, block_id) in self.view_blocks {
            tx.effects
                .view_blocks
                .push(ViewBlockChange::Unbind { av_id, block_id });
        }
        tx.effects.ref_defs.extend(self.defs);
        tx.forget_blocks(self.ids);
        Ok(())
    }
}
