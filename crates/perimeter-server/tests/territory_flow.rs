//! End-to-end territory resolution through storage, adapters, cache, and
//! the fail-closed boundary.

use perimeter_domain::territory::{BranchFilter, BranchScope};
use perimeter_server::config::ServerConfig;
use perimeter_server::state::AppState;
use perimeter_storage::{Area, Branch, GrantScope, MemoryAccessStore, Permission};

fn branch(id: &str) -> Branch {
    Branch {
        id: id.to_string(),
        code: format!("BR-{id}"),
        name: format!("Branch {id}"),
    }
}

fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Seeds the store with the standard scenario: user u1 directly assigned
/// to b1 and assigned to area a1 containing b2 and b3.
fn seed_territory(store: &MemoryAccessStore) {
    for id in ["b1", "b2", "b3", "b4", "b9"] {
        store.add_branch(branch(id));
    }
    store.add_area(Area {
        id: "a1".to_string(),
        name: "Area a1".to_string(),
    });
    store.add_area_member("a1", "b2").unwrap();
    store.add_area_member("a1", "b3").unwrap();

    store.assign_branch("u1", "b1").unwrap();
    store.assign_area("u1", "a1").unwrap();

    store.define_permission(Permission {
        id: "perm-clients-read".to_string(),
        resource: "clients".to_string(),
        action: "read".to_string(),
    });
}

#[tokio::test]
async fn test_direct_and_area_assignments_resolve_to_territory_scope() {
    let state = AppState::in_memory(&ServerConfig::default());
    seed_territory(state.storage());

    let territory = state.territory();
    let branch_ids = territory.user_branch_ids("u1", "co1").await.unwrap();
    assert_eq!(branch_ids, ids(&["b1", "b2", "b3"]));

    let filter = territory.user_branch_filter("u1", "co1").await;
    assert_eq!(filter.scope, BranchScope::Territory);
    assert_eq!(filter.branch_ids, ids(&["b1", "b2", "b3"]));
}

#[tokio::test]
async fn test_all_scope_grant_overrides_territory() {
    let state = AppState::in_memory(&ServerConfig::default());
    seed_territory(state.storage());
    state
        .storage()
        .grant("u1", "perm-clients-read", Some("co1"), GrantScope::All)
        .unwrap();

    let filter = state.territory().user_branch_filter("u1", "co1").await;
    assert_eq!(filter, BranchFilter::all());

    // All scope allows branches the user was never assigned to
    assert!(state.territory().can_access_branch("u1", "co1", "b9").await);
}

#[tokio::test]
async fn test_branch_scoped_grant_does_not_bypass_territory() {
    let state = AppState::in_memory(&ServerConfig::default());
    seed_territory(state.storage());
    state
        .storage()
        .grant("u1", "perm-clients-read", Some("co1"), GrantScope::Branch)
        .unwrap();

    let filter = state.territory().user_branch_filter("u1", "co1").await;
    assert_eq!(filter.scope, BranchScope::Territory);
}

#[tokio::test]
async fn test_unassigned_user_is_denied() {
    let state = AppState::in_memory(&ServerConfig::default());
    seed_territory(state.storage());

    let filter = state.territory().user_branch_filter("stranger", "co1").await;
    assert_eq!(filter, BranchFilter::none());
    assert!(
        !state
            .territory()
            .can_access_branch("stranger", "co1", "b1")
            .await
    );
}

#[tokio::test]
async fn test_filter_clients_intersects_candidates() {
    let state = AppState::in_memory(&ServerConfig::default());
    seed_territory(state.storage());

    let visible = state
        .territory()
        .filter_clients_by_territory("u1", "co1", &ids(&["b1", "b4", "b9"]))
        .await;
    assert_eq!(visible, ids(&["b1"]));
}

#[tokio::test]
async fn test_assignment_change_is_visible_after_invalidation() {
    let state = AppState::in_memory(&ServerConfig::default());
    seed_territory(state.storage());
    let territory = state.territory();

    // Prime the cache
    assert_eq!(
        territory.user_branch_ids("u1", "co1").await.unwrap(),
        ids(&["b1", "b2", "b3"])
    );

    // Mutate territory, then invalidate before the next read
    state.storage().assign_branch("u1", "b4").unwrap();
    territory.invalidate_user_branch_cache("u1").await;

    assert_eq!(
        territory.user_branch_ids("u1", "co1").await.unwrap(),
        ids(&["b1", "b2", "b3", "b4"])
    );
}

#[tokio::test]
async fn test_stale_read_until_invalidated() {
    let state = AppState::in_memory(&ServerConfig::default());
    seed_territory(state.storage());
    let territory = state.territory();

    territory.user_branch_ids("u1", "co1").await.unwrap();
    state.storage().unassign_branch("u1", "b1");

    // Consistency window: without invalidation the cached set is served
    assert_eq!(
        territory.user_branch_ids("u1", "co1").await.unwrap(),
        ids(&["b1", "b2", "b3"])
    );

    territory.invalidate_all_user_branch_caches().await;
    assert_eq!(
        territory.user_branch_ids("u1", "co1").await.unwrap(),
        ids(&["b2", "b3"])
    );
}

#[tokio::test]
async fn test_disabled_cache_always_reads_fresh() {
    let mut config = ServerConfig::default();
    config.cache.enabled = false;

    let state = AppState::in_memory(&config);
    seed_territory(state.storage());
    let territory = state.territory();

    territory.user_branch_ids("u1", "co1").await.unwrap();
    state.storage().assign_branch("u1", "b4").unwrap();

    // No invalidation needed: every read aggregates from the store
    assert_eq!(
        territory.user_branch_ids("u1", "co1").await.unwrap(),
        ids(&["b1", "b2", "b3", "b4"])
    );
}
