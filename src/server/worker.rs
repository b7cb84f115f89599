//! Long-lived session worker tasks.

use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use log::debug;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{
    pool::WorkerSlot,
    session::{SessionContext, run_session},
};

/// Spawn a worker serving connections handed to `slot` until `shutdown`.
///
/// Each session runs under a child of `shutdown`, so cancelling the server
/// token aborts every in-flight read and write. Handler panics are turned
/// into session errors by the session itself; a panic escaping the session
/// teardown is logged here and the worker goes back to waiting for the next
/// connection.
pub(super) fn spawn_worker(
    slot: Arc<WorkerSlot>,
    ctx: Arc<SessionContext>,
    shutdown: CancellationToken,
    tracker: &TaskTracker,
) {
    tracker.spawn(async move {
        let worker = slot.id();
        debug!("session worker started: worker={worker}");
        while let Some(mut conn) = slot.next_connection(&shutdown).await {
            let peer = conn.peer_addr();
            conn.set_abort(shutdown.child_token());
            let session = AssertUnwindSafe(run_session(conn, &ctx, worker)).catch_unwind();
            if let Err(panic) = session.await {
                crate::metrics::inc_errors();
                crate::panic::log_session_panic(panic, worker, peer);
            }
            if !slot.release(&shutdown) {
                break;
            }
        }
        slot.terminate();
        debug!("session worker stopped: worker={worker}");
    });
}
