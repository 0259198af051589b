// One-shot maintenance timers attached to each resource when it is created.
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::pool::{Resource, Shared};
use crate::core::report::{MaintenanceFailure, TimerKind};
use crate::core::storage::Storage;

// Two parked threads per open resource; each lives at most its delay or until
// the pool closes, so the count is bounded by 2 x keys opened within `evict_delay`.
pub(crate) fn spawn<S: Storage>(
    shared: &Arc<Shared<S>>,
    resource: &Arc<Resource<S>>,
    kind: TimerKind,
) -> io::Result<JoinHandle<()>> {
    let shared = Arc::clone(shared);
    let resource = Arc::clone(resource);
    thread::Builder::new()
        .name(format!("writerpool-{kind}"))
        .spawn(move || supervise(&shared, &resource, kind))
}

fn supervise<S: Storage>(shared: &Shared<S>, resource: &Arc<Resource<S>>, kind: TimerKind) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| fire(shared, resource, kind)));
    let error = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(err)) => err,
        Err(payload) => Error::new(ErrorKind::Internal)
            .with_message(format!("{kind} timer panicked: {}", panic_message(payload.as_ref())))
            .with_key(resource.key()),
    };
    shared.reporter().report(MaintenanceFailure {
        timer: kind,
        key: resource.key().clone(),
        resource_id: resource.id(),
        error,
    });
}

fn fire<S: Storage>(
    shared: &Shared<S>,
    resource: &Arc<Resource<S>>,
    kind: TimerKind,
) -> Result<(), Error> {
    let delay = match kind {
        TimerKind::Flush => shared.config().flush_delay,
        TimerKind::Evict => shared.config().evict_delay,
    };
    if !shared.sleep_unless_closed(delay)? {
        return Ok(());
    }
    match kind {
        TimerKind::Flush => {
            if resource.flush_pending()? {
                debug!(key = %resource.key(), resource_id = resource.id(), "flush timer wrote buffered bytes");
            }
            Ok(())
        }
        TimerKind::Evict => shared.evict(resource),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
