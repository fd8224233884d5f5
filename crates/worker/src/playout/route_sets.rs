//! Switching studio route sets.

use rundown_core::error::CoreError;
use rundown_core::ids::{RouteSetId, StudioId};
use rundown_core::timeline::{switch_route_set as apply_switch, RouteSetState};

use crate::error::JobResult;
use crate::lock::LockManager;
use crate::store::Store;

/// Switch a route set of the studio, under the studio lock. Returns
/// whether any route set changed, meaning active playlists need a new
/// timeline.
pub async fn switch_route_set(
    store: &Store,
    locks: &LockManager,
    studio_id: &StudioId,
    route_set_id: &RouteSetId,
    state: RouteSetState,
) -> JobResult<bool> {
    let lock = locks.lock_studio(studio_id).await;
    let result = switch_locked(store, studio_id, route_set_id, state).await;
    lock.release().await;
    result
}

async fn switch_locked(
    store: &Store,
    studio_id: &StudioId,
    route_set_id: &RouteSetId,
    state: RouteSetState,
) -> JobResult<bool> {
    let mut studio = store
        .studios
        .find_one(studio_id.as_str())
        .await?
        .ok_or_else(|| CoreError::not_found("Studio", studio_id))?;
    let changed = apply_switch(&mut studio.route_sets, route_set_id, state)?;
    if changed {
        store.studios.upsert(studio).await?;
    }
    Ok(changed)
}
