//! Relation and rollup maintenance
//!
//! A two-way relation column `K` of view `V` pointing at view `W` is paired
//! with a back column `K'` of `W`. After any change to `K`, every row `t` of
//! `W` must list in `K'` exactly the rows of `V` whose `K` contains `t`.

use super::{AttributeView, KeyType, Value};
use crate::tree::BlockId;
use std::collections::BTreeMap;

/// Rewrite the back column `back_key_id` of `target` from relation `key_id`
/// of `source`; returns whether `target` changed
///
/// Related ids that have no row in `target` are ignored.
pub fn sync_back_relation(
    source: &AttributeView,
    key_id: &str,
    target: &mut AttributeView,
    back_key_id: &str,
) -> bool {
    let mut desired: BTreeMap<BlockId, Vec<BlockId>> = BTreeMap::new();
    for row in &source.rows {
        let Some(value) = row.values.get(key_id) else {
            continue;
        };
        for related in value.relation_ids() {
            let back = desired.entry(related.clone()).or_default();
            if !back.contains(&row.block_id) {
                back.push(row.block_id.clone());
            }
        }
    }

    let mut changed = false;
    for row in &mut target.rows {
        let wanted = desired.remove(&row.block_id).unwrap_or_default();
        let current = row
            .values
            .get(back_key_id)
            .map(|value| value.relation_ids().to_vec())
            .unwrap_or_default();
        if current == wanted {
            continue;
        }
        changed = true;
        if wanted.is_empty() {
            row.values.remove(back_key_id);
        } else {
            row.values
                .insert(back_key_id.to_string(), Value::Relation(wanted));
        }
    }
    changed
}

/// Recompute every rollup column of `view`; `related` resolves the view a
/// relation points at. Returns whether any value changed.
pub fn recompute_rollups<F>(view: &mut AttributeView, mut related: F) -> bool
where
    F: FnMut(&str) -> Option<AttributeView>,
{
    let rollups: Vec<(String, String, String)> = view
        .keys
        .iter()
        .filter_map(|key| match &key.kind {
            KeyType::Rollup {
                relation_key_id,
                target_key_id,
            } => Some((key.id.clone(), relation_key_id.clone(), target_key_id.clone())),
            _ => None,
        })
        .collect();

    let mut changed = false;
    for (rollup_id, relation_key_id, target_key_id) in rollups {
        let Some(KeyType::Relation { av_id, .. }) =
            view.key(&relation_key_id).map(|key| key.kind.clone())
        else {
            continue;
        };
        let other = if av_id == view.id {
            Some(view.clone())
        } else {
            related(&av_id)
        };
        let Some(other) = other else {
            continue;
        };

        for row in &mut view.rows {
            let values: Vec<String> = row
                .values
                .get(&relation_key_id)
                .map(|value| value.relation_ids().to_vec())
                .unwrap_or_default()
                .iter()
                .filter_map(|id| other.row(id))
                .filter_map(|related_row| related_row.values.get(&target_key_id))
                .map(Value::display)
                .collect();
            let next = Value::Rollup(values);
            if row.values.get(&rollup_id) != Some(&next) {
                row.values.insert(rollup_id.clone(), next);
                changed = true;
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::Key;

    fn books_and_authors() -> (AttributeView, AttributeView) {
        let mut books = AttributeView::new("books", "Books")
            .with_key(Key::new(
                "author",
                "Author",
                KeyType::Relation {
                    av_id: "authors".into(),
                    back_key_id: Some("books".into()),
                },
            ))
            .with_key(Key::new(
                "author-name",
                "Author name",
                KeyType::Rollup {
                    relation_key_id: "author".into(),
                    target_key_id: "name".into(),
                },
            ));
        let mut authors = AttributeView::new("authors", "Authors")
            .with_key(Key::new("name", "Name", KeyType::Text))
            .with_key(Key::new(
                "books",
                "Books",
                KeyType::Relation {
                    av_id: "books".into(),
                    back_key_id: Some("author".into()),
                },
            ));
        for id in ["b1", "b2"] {
            books.add_row(id);
        }
        for (id, name) in [("a1", "Le Guin"), ("a2", "Lem")] {
            authors.add_row(id);
            authors.set_value(id, "name", Some(Value::Text(name.into())));
        }
        (books, authors)
    }

    #[test]
    fn test_back_relation_follows_forward_column() {
        let (mut books, mut authors) = books_and_authors();
        books.set_value("b1", "author", Some(Value::Relation(vec!["a1".into()])));
        books.set_value("b2", "author", Some(Value::Relation(vec!["a1".into(), "a2".into()])));

        assert!(sync_back_relation(&books, "author", &mut authors, "books"));
        assert_eq!(authors.row("a1").unwrap().values["books"].relation_ids(), ["b1", "b2"]);
        assert_eq!(authors.row("a2").unwrap().values["books"].relation_ids(), ["b2"]);
        assert!(!sync_back_relation(&books, "author", &mut authors, "books"));

        books.set_value("b2", "author", None);
        assert!(sync_back_relation(&books, "author", &mut authors, "books"));
        assert!(authors.row("a2").unwrap().values.get("books").is_none());
    }

    #[test]
    fn test_rollup_reads_related_rows() {
        let (mut books, authors) = books_and_authors();
        books.set_value("b1", "author", Some(Value::Relation(vec!["a2".into(), "zz".into()])));
        let changed = recompute_rollups(&mut books, |id| {
            (id == "authors").then(|| authors.clone())
        });
        assert!(changed);
        assert_eq!(
            books.row("b1").unwrap().values["author-name"],
            Value::Rollup(vec!["Lem".into()])
        );
        assert_eq!(books.row("b2").unwrap().values["author-name"], Value::Rollup(vec![]));
    }
}
