//! Heading fold helpers
//!
//! A heading "owns" the run of following siblings up to the next heading of
//! the same or a higher rank. When the heading is folded (`fold=1`), that run
//! is hidden and structural operations treat it as nested under the heading.

use super::block::{BlockType, ATTR_FOLD, ATTR_HEADING_FOLD};
use super::id::BlockId;
use super::tree::Tree;

/// Siblings following heading `id` that belong to its section
///
/// Empty when `id` is not a heading. A super block ends the run if its first
/// heading ranks at least as high as `id`.
pub fn heading_children(tree: &Tree, id: &str) -> Vec<BlockId> {
    let Some(level) = tree.get(id).and_then(|block| block.kind.heading_level()) else {
        return Vec::new();
    };
    let Some(parent) = tree.parent_id(id) else {
        return Vec::new();
    };
    let siblings = tree.children(parent);
    let Some(start) = siblings.iter().position(|sibling| sibling == id) else {
        return Vec::new();
    };

    let mut run = Vec::new();
    for sibling in &siblings[start + 1..] {
        let Some(block) = tree.get(sibling) else {
            continue;
        };
        match &block.kind {
            BlockType::Heading(other) if *other <= level => break,
            BlockType::SuperBlock => {
                if let Some(other) = super_block_heading_level(tree, sibling) {
                    if other <= level {
                        break;
                    }
                }
            }
            kind if kind.is_marker() => continue,
            _ => {}
        }
        run.push(sibling.clone());
    }
    run
}

/// Folded run of `id`: its section if it is a folded heading, else empty
pub fn folded_run(tree: &Tree, id: &str) -> Vec<BlockId> {
    match tree.get(id) {
        Some(block) if block.is_folded_heading() => heading_children(tree, id),
        _ => Vec::new(),
    }
}

/// Level of the heading leading super block `id`, looking through nesting
pub fn super_block_heading_level(tree: &Tree, id: &str) -> Option<u8> {
    let first = tree.content_children(id).into_iter().next()?;
    let block = tree.get(first)?;
    match &block.kind {
        BlockType::Heading(level) => Some(*level),
        BlockType::SuperBlock => super_block_heading_level(tree, first),
        _ => None,
    }
}

/// Outermost folded heading whose folded run contains `id`, if any
///
/// A folded heading that is itself hidden by an enclosing fold is skipped.
pub fn folding_heading(tree: &Tree, id: &str) -> Option<BlockId> {
    let parent = tree.parent_id(id)?;
    let siblings = tree.children(parent);
    let index = siblings.iter().position(|sibling| sibling == id)?;
    siblings[..index]
        .iter()
        .rev()
        .filter(|sibling| {
            tree.get(sibling)
                .is_some_and(|b| b.is_folded_heading() && b.attr(ATTR_HEADING_FOLD).is_none())
        })
        .find(|heading| heading_children(tree, heading).iter().any(|c| c == id))
        .cloned()
}

/// Fold heading `id`; returns the ids of its now-hidden section
pub fn fold(tree: &mut Tree, id: &str) -> Vec<BlockId> {
    let children = heading_children(tree, id);
    for child in &children {
        if let Some(block) = tree.get_mut(child) {
            block.set_attr(ATTR_FOLD, "1");
            block.set_attr(ATTR_HEADING_FOLD, "1");
        }
    }
    if let Some(heading) = tree.get_mut(id) {
        heading.set_attr(ATTR_FOLD, "1");
    }
    children
}

/// Unfold heading `id`; returns the ids of its revealed section
pub fn unfold(tree: &mut Tree, id: &str) -> Vec<BlockId> {
    let children = heading_children(tree, id);
    for child in &children {
        if let Some(block) = tree.get_mut(child) {
            block.remove_attr(ATTR_FOLD);
            block.remove_attr(ATTR_HEADING_FOLD);
        }
    }
    if let Some(heading) = tree.get_mut(id) {
        heading.remove_attr(ATTR_FOLD);
        heading.remove_attr(ATTR_HEADING_FOLD);
    }
    children
}
