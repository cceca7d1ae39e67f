//! Bulk path for long single-document edit runs
//!
//! Pasting or deleting many blocks produces long transactions that touch one
//! document. When the operation list has one of two shapes and every block it
//! names lives in the same tree, that tree is loaded up front and every
//! operation resolves against the cached copy without consulting the block
//! index. The handlers themselves run unchanged, so the resulting tree is the
//! same as on the per-operation path.
//!
//! Accepted shapes, with `D` a delete and `I` an insert:
//!
//! ```text
//! D? I+ D?
//! D+ I?
//! ```

use super::Transaction;
use crate::error::Result;
use crate::operation::{Action, Operation};
use crate::storage::Services;
use crate::tree::BlockId;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Delete,
    Insert,
}

fn shape_of(op: &Operation) -> Option<Shape> {
    match op.action {
        Action::Delete => Some(Shape::Delete),
        action if action.is_insert() => Some(Shape::Insert),
        _ => None,
    }
}

/// Whether `ops` is `D? I+ D?` or `D+ I?`
pub(crate) fn matches_shape(ops: &[Operation]) -> bool {
    let Some(shapes) = ops.iter().map(shape_of).collect::<Option<Vec<_>>>() else {
        return false;
    };
    if shapes.is_empty() {
        return false;
    }
    let mut inner = shapes.as_slice();
    if inner.first() == Some(&Shape::Delete) {
        inner = &inner[1..];
    }
    if inner.last() == Some(&Shape::Delete) {
        inner = &inner[..inner.len() - 1];
    }
    let inserts = !inner.is_empty() && inner.iter().all(|shape| *shape == Shape::Insert);

    let mut deletes = shapes.as_slice();
    if deletes.last() == Some(&Shape::Insert) {
        deletes = &deletes[..deletes.len() - 1];
    }
    let deletes = !deletes.is_empty() && deletes.iter().all(|shape| *shape == Shape::Delete);

    inserts || deletes
}

/// Switch `tx` to bulk mode when `ops` qualify; returns whether it did
pub(crate) fn plan(tx: &mut Transaction, services: &Services, ops: &[Operation]) -> Result<bool> {
    if ops.len() < services.config.batch_threshold || !matches_shape(ops) {
        return Ok(false);
    }

    let mut introduced: BTreeSet<BlockId> = BTreeSet::new();
    let mut root: Option<(BlockId, &str)> = None;
    for op in ops {
        let target = match op.action {
            Action::Delete => op.id.as_str(),
            _ => match op.anchor() {
                Some(anchor) => anchor.id(),
                None => return Ok(false),
            },
        };
        if !introduced.contains(target) {
            let Some(location) = services.index.locate(target) else {
                return Ok(false);
            };
            if let Some((known, _)) = &root {
                if *known != location.root_id {
                    return Ok(false);
                }
            } else {
                root = Some((location.root_id, target));
            }
        }
        if op.action.is_insert() {
            if !op.id.is_empty() {
                introduced.insert(op.id.clone());
            }
            if let Some(data) = &op.data {
                let Ok(nodes) = services.parser.parse(data) else {
                    return Ok(false);
                };
                for node in &nodes {
                    introduced.extend(node.ids());
                }
            }
        }
    }

    let Some((root_id, first)) = root else {
        return Ok(false);
    };
    tx.set_bulk(true);
    tx.load_tree(services, first)?;
    debug!(%root_id, ops = ops.len(), "bulk path taken");
    Ok(true)
}
