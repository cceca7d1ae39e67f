use crate::av::{recompute_rollups, sync_back_relation, AttributeView, KeyId, KeyType, ViewId};
use crate::error::{Result, TxError};
use crate::storage::Services;
use crate::task::Task;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Queue one delayed relation sync per view
pub(crate) fn schedule<'a>(services: &Services, views: impl IntoIterator<Item = &'a ViewId>) {
    let delay = services.config.av_sync_delay();
    for av_id in views {
        let task = Task::AttributeViewSync {
            av_id: av_id.clone(),
        };
        debug!(%av_id, "attribute view sync scheduled");
        services.tasks.schedule(task.key(), delay, task);
    }
}

/// Make the back columns of every two-way relation of `av_id` match it,
/// then recompute rollups and groups of each view that was touched
pub fn sync_view(services: &Services, av_id: &str) -> Result<()> {
    let load = |id: &str| {
        services
            .views
            .load_view(id)
            .map_err(|err| TxError::from_view(id, err))
    };
    let mut view = load(av_id)?;

    let relations: Vec<(KeyId, ViewId, KeyId)> = view
        .keys
        .iter()
        .filter_map(|key| match &key.kind {
            KeyType::Relation {
                av_id,
                back_key_id: Some(back_key_id),
            } => Some((key.id.clone(), av_id.clone(), back_key_id.clone())),
            _ => None,
        })
        .collect();

    let mut targets: BTreeMap<ViewId, AttributeView> = BTreeMap::new();
    let mut dirty: BTreeSet<ViewId> = BTreeSet::new();
    for (key_id, target_id, back_key_id) in relations {
        if target_id == view.id {
            let source = view.clone();
            sync_back_relation(&source, &key_id, &mut view, &back_key_id);
            continue;
        }
        if !targets.contains_key(&target_id) {
            targets.insert(target_id.clone(), load(&target_id)?);
        }
        if let Some(target) = targets.get_mut(&target_id) {
            if sync_back_relation(&view, &key_id, target, &back_key_id) {
                dirty.insert(target_id);
            }
        }
    }

    recompute_rollups(&mut view, |id| {
        targets
            .get(id)
            .cloned()
            .or_else(|| services.views.load_view(id).ok())
    });
    view.regenerate_groups();
    services
        .views
        .save_view(&view)
        .map_err(|err| TxError::from_view(&view.id, err))?;

    for target_id in &dirty {
        let Some(target) = targets.get_mut(target_id) else {
            continue;
        };
        recompute_rollups(target, |id| {
            if id == view.id {
                Some(view.clone())
            } else {
                services.views.load_view(id).ok()
            }
        });
        target.regenerate_groups();
        services
            .views
            .save_view(target)
            .map_err(|err| TxError::from_view(target_id, err))?;
    }
    debug!(%av_id, targets = dirty.len(), "attribute view synced");
    Ok(())
}
