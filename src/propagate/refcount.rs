use crate::storage::Services;
use crate::task::Task;
use crate::tree::BlockId;
use tracing::debug;

/// Queue one delayed recount per definition id
///
/// A definition can be referenced from many trees, so counting is never done
/// inside the transaction.
pub(crate) fn schedule<'a>(services: &Services, defs: impl IntoIterator<Item = &'a BlockId>) {
    let delay = services.config.ref_count_delay();
    for def_id in defs {
        let task = Task::RefCountRefresh {
            def_id: def_id.clone(),
        };
        debug!(%def_id, "ref count refresh scheduled");
        services.tasks.schedule(task.key(), delay, task);
    }
}
