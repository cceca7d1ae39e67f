//! Dynamic anchor text
//!
//! A dynamic reference displays its definition's live text. After a commit
//! changes a block, every dynamic reference to it is rewritten. A container
//! used as a definition displays its first leaf, so changing that leaf also
//! refreshes references to the container (and, for a list item, its list).

use crate::storage::Services;
use crate::tree::{BlockId, BlockType, Inline, RefKind, Tree};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};
use unicode_segmentation::UnicodeSegmentation;

/// Cut `text` to `max` graphemes, marking the cut with `...`
pub fn truncate_anchor_text(text: &str, max: usize) -> String {
    let mut graphemes = text.graphemes(true);
    let head: String = graphemes.by_ref().take(max).collect();
    if graphemes.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Text a definition block displays through its references
pub(crate) fn definition_text(tree: &Tree, id: &str) -> Option<String> {
    let block = tree.get(id)?;
    if block.is_container() && block.kind != BlockType::Document {
        return tree.first_leaf(id).map(|leaf| leaf.text());
    }
    Some(block.text())
}

/// Rewrite the dynamic references to `updated` blocks
///
/// Referrers are rewritten in `cached`. A referring tree outside the cache is
/// loaded into it when one of its references changes, so it is persisted by
/// the same commit as the definition, or not at all.
pub(crate) fn resync(
    services: &Services,
    cached: &mut BTreeMap<BlockId, Tree>,
    updated: &BTreeSet<BlockId>,
) {
    let defs = changed_definitions(cached, updated, services.config.anchor_text_max_len);
    if defs.is_empty() {
        return;
    }

    let mut sites: BTreeMap<BlockId, BTreeSet<BlockId>> = BTreeMap::new();
    for def_id in defs.keys() {
        for site in services.refs.dynamic_referrers(def_id) {
            sites.entry(site.root_id).or_default().insert(site.block_id);
        }
    }

    for (root_id, blocks) in sites {
        if let Some(tree) = cached.get_mut(&root_id) {
            let changed = rewrite(tree, &blocks, &defs);
            debug!(%root_id, changed, "anchor text resynced in cached tree");
            continue;
        }

        let Some(location) = services.index.locate(&root_id) else {
            warn!(%root_id, "referring tree is not indexed");
            continue;
        };
        let mut tree = match services.trees.load(&location.box_id, &location.path) {
            Ok(tree) => tree,
            Err(err) => {
                warn!(%root_id, error = %err, "load referring tree failed");
                continue;
            }
        };
        let changed = rewrite(&mut tree, &blocks, &defs);
        if changed > 0 {
            debug!(%root_id, changed, "referring tree joins the commit");
            cached.insert(root_id, tree);
        }
    }
}

fn changed_definitions(
    cached: &BTreeMap<BlockId, Tree>,
    updated: &BTreeSet<BlockId>,
    max_len: usize,
) -> BTreeMap<BlockId, String> {
    let mut defs = BTreeMap::new();
    for id in updated {
        let Some(tree) = cached.values().find(|tree| tree.contains(id)) else {
            continue;
        };
        let Some(text) = definition_text(tree, id) else {
            continue;
        };
        let text = truncate_anchor_text(&text, max_len);

        if let Some(parent) = tree.parent(id) {
            let leads_container = parent.kind != BlockType::Document
                && parent.is_container()
                && tree.first_leaf(&parent.id).is_some_and(|leaf| &leaf.id == id);
            if leads_container {
                defs.entry(parent.id.clone()).or_insert_with(|| text.clone());
                if parent.kind.is_list_item() {
                    if let Some(list) = tree.parent_id(&parent.id) {
                        defs.entry(list.clone()).or_insert_with(|| text.clone());
                    }
                }
            }
        }
        defs.insert(id.clone(), text);
    }
    defs
}

fn rewrite(tree: &mut Tree, blocks: &BTreeSet<BlockId>, defs: &BTreeMap<BlockId, String>) -> usize {
    let mut changed = 0;
    for id in blocks {
        let Some(block) = tree.get_mut(id) else {
            continue;
        };
        for inline in &mut block.inlines {
            if let Inline::Ref {
                def_id,
                text,
                kind: RefKind::Dynamic,
            } = inline
            {
                if let Some(fresh) = defs.get(def_id.as_str()) {
                    if text != fresh {
                        text.clone_from(fresh);
                        changed += 1;
                    }
                }
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{BlockNode, ListKind};

    #[test]
    fn test_truncate_by_grapheme() {
        assert_eq!(truncate_anchor_text("short", 10), "short");
        assert_eq!(truncate_anchor_text("abcdef", 3), "abc...");
        assert_eq!(truncate_anchor_text("e\u{301}e\u{301}e\u{301}", 2), "e\u{301}e\u{301}...");
        assert_eq!(truncate_anchor_text("abc", 3), "abc");
    }

    #[test]
    fn test_first_leaf_refreshes_container_definitions() {
        let root = BlockNode::document("root").with_child(
            BlockNode::new("list", BlockType::List(ListKind::Bullet)).with_child(
                BlockNode::new("li", BlockType::ListItem(ListKind::Bullet))
                    .with_child(BlockNode::paragraph("li-p", "Item text"))
                    .with_child(BlockNode::paragraph("li-q", "second")),
            ),
        );
        let tree = Tree::new("box", "/a.sy", root).unwrap();
        let mut cached = BTreeMap::new();
        cached.insert("root".to_string(), tree);

        let updated: BTreeSet<BlockId> = ["li-p".to_string()].into();
        let defs = changed_definitions(&cached, &updated, 64);
        assert_eq!(defs.len(), 3);
        assert_eq!(defs["li"], "Item text");
        assert_eq!(defs["list"], "Item text");

        let updated: BTreeSet<BlockId> = ["li-q".to_string()].into();
        assert_eq!(changed_definitions(&cached, &updated, 64).len(), 1);
    }

    #[test]
    fn test_rewrite_touches_only_dynamic_refs() {
        let root = BlockNode::document("root").with_child(
            BlockNode::paragraph("r", "")
                .with_inline(Inline::reference("d", "old", RefKind::Dynamic))
                .with_inline(Inline::reference("d", "keep", RefKind::Static)),
        );
        let mut tree = Tree::new("box", "/a.sy", root).unwrap();
        let defs: BTreeMap<BlockId, String> = [("d".to_string(), "new".to_string())].into();
        let blocks: BTreeSet<BlockId> = ["r".to_string()].into();

        assert_eq!(rewrite(&mut tree, &blocks, &defs), 1);
        assert_eq!(tree.get("r").unwrap().text(), "newkeep");
        assert_eq!(rewrite(&mut tree, &blocks, &defs), 0);
    }
}
