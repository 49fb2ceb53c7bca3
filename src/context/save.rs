//! Save propagation up the parent chain.

use crate::changes::ChangeEvent;
use crate::context::worker::ContextCore;
use crate::error::ContextError;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, trace};

pub(crate) type Completion = Box<dyn FnOnce(Result<(), ContextError>) + Send>;

/// Save `core` on its own worker, then its ancestors one by one.
///
/// `on_complete` fires once: with the first error, or with `Ok` after the
/// root committed. It runs on the worker of the last context visited.
pub(crate) fn propagate_save(core: Arc<ContextCore>, on_complete: Completion) {
    // Lets us still answer the caller if the mailbox is gone
    let slot = Arc::new(Mutex::new(Some(on_complete)));
    let job_slot = Arc::clone(&slot);
    let target = Arc::clone(&core);

    let submitted = core.submit(Box::new(move |graph| {
        let Some(on_complete) = job_slot.lock().take() else {
            return;
        };

        if !graph.has_changes() {
            trace!(context = %target.id, "Nothing to save");
            on_complete(Ok(()));
            return;
        }

        match graph.commit() {
            Ok(changes) => {
                graph.publish_pending();
                match changes {
                    Some(changes) => {
                        debug!(
                            context = %target.id,
                            kind = %target.kind,
                            inserted = changes.inserted.len(),
                            updated = changes.updated.len(),
                            deleted = changes.deleted.len(),
                            "Context saved"
                        );
                        target.bus.emit(&ChangeEvent::with_now(
                            target.id,
                            target.lineage.clone(),
                            target.coordinator.id(),
                            changes,
                        ));
                    }
                    None => trace!(context = %target.id, "Save produced no changes"),
                }
                match &target.parent {
                    Some(parent) => propagate_save(Arc::clone(parent), on_complete),
                    None => on_complete(Ok(())),
                }
            }
            Err(err) => {
                error!(
                    context = %target.id,
                    kind = %target.kind,
                    error = %err,
                    "Error saving context"
                );
                on_complete(Err(err));
            }
        }
    }));

    if let Err(err) = submitted {
        error!(context = %core.id, error = %err, "Error saving context");
        if let Some(on_complete) = slot.lock().take() {
            on_complete(Err(err));
        }
    }
}
