//! Operation dispatch

use super::{batch, Transaction};
use crate::error::Result;
use crate::mutator::{self, Handler, OpContext};
use crate::operation::{Action, Operation};
use crate::storage::Services;
use std::mem;
use tracing::{debug, trace, warn};

static HANDLERS: &[(Action, Handler)] = &[
    (Action::Create, mutator::create as Handler),
    (Action::Insert, mutator::insert as Handler),
    (Action::PrependInsert, mutator::prepend_insert as Handler),
    (Action::AppendInsert, mutator::append_insert as Handler),
    (Action::Delete, mutator::delete as Handler),
    (Action::Move, mutator::move_block as Handler),
    (Action::Append, mutator::append as Handler),
    (Action::Update, mutator::update as Handler),
    (Action::FoldHeading, mutator::fold_heading as Handler),
    (Action::UnfoldHeading, mutator::unfold_heading as Handler),
    (Action::InsertAttrViewBlock, mutator::insert_rows as Handler),
    (Action::RemoveAttrViewBlock, mutator::remove_rows as Handler),
    (Action::UpdateAttrViewCell, mutator::update_cell as Handler),
];

fn handler_for(action: Action) -> Option<Handler> {
    HANDLERS
        .iter()
        .find(|(known, _)| *known == action)
        .map(|(_, handler)| *handler)
}

/// Run every operation of `tx` in order, stopping at the first error
///
/// An update immediately followed by another update of the same block is
/// skipped; the later payload replaces it anyway.
pub(crate) fn apply(tx: &mut Transaction, services: &Services) -> Result<()> {
    let ops = mem::take(&mut tx.do_operations);
    let result = apply_ops(tx, services, &ops);
    tx.do_operations = ops;
    result
}

fn apply_ops(tx: &mut Transaction, services: &Services, ops: &[Operation]) -> Result<()> {
    batch::plan(tx, services, ops)?;

    for (i, op) in ops.iter().enumerate() {
        let later = &ops[i + 1..];
        if op.action == Action::Update
            && later
                .first()
                .is_some_and(|next| next.action == Action::Update && next.id == op.id)
        {
            trace!(id = %op.id, "superseded update skipped");
            continue;
        }
        let Some(handler) = handler_for(op.action) else {
            warn!(action = ?op.action, id = %op.id, "unknown action skipped");
            continue;
        };
        debug!(action = ?op.action, id = %op.id, "applying operation");
        handler(tx, &OpContext { services, later }, op)?;
    }
    Ok(())
}
