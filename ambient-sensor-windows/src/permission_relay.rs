use std::io;

use ambient_sensor_core::traits::session_host::PermissionCallback;

/// Work item handed to a spawner.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Answer `on_result` with `check()` on a worker started by `spawn`.
///
/// `on_result` is invoked exactly once: with the check's answer, or with
/// `false` when the worker could not be started.
pub(crate) fn answer_on_worker<S, F>(spawn: S, check: F, on_result: PermissionCallback)
where
    S: FnOnce(Job) -> io::Result<()>,
    F: FnOnce() -> bool + Send + 'static,
{
    let (slot, pending) = crossbeam_channel::bounded::<PermissionCallback>(1);
    let _ = slot.send(on_result);
    let worker_pending = pending.clone();

    let spawned = spawn(Box::new(move || {
        let granted = check();
        if let Ok(on_result) = worker_pending.try_recv() {
            on_result(granted);
        }
    }));

    if let Err(e) = spawned {
        log::error!("Failed to spawn permission check: {}", e);
        if let Ok(on_result) = pending.try_recv() {
            on_result(false);
        }
    }
}
