mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedLoader, principal};
use winespa_authz::{
    Action, ActionGuard, AuthorizationEngine, ControlState, EvaluateOptions, GuardConfig,
    GuardState, Render, Role, Verdict, winespa_sidebar,
};
use winespa_session::{
    AccessSession, InMemoryPermissionRowsRepository, InMemorySessionProvider, PermissionCache,
    PermissionRowsRepository, SessionProvider,
};

type Session = AccessSession<
    Arc<ScriptedLoader>,
    Arc<InMemoryPermissionRowsRepository>,
    Arc<InMemorySessionProvider>,
>;

struct Harness {
    session: Arc<Session>,
    provider: Arc<InMemorySessionProvider>,
    loader: Arc<ScriptedLoader>,
    repo: Arc<InMemoryPermissionRowsRepository>,
}

fn harness(loader: ScriptedLoader) -> Harness {
    winespa_observability::init();

    let loader = Arc::new(loader);
    let repo = Arc::new(InMemoryPermissionRowsRepository::new());
    let provider = Arc::new(InMemorySessionProvider::new());
    let cache = Arc::new(PermissionCache::new(loader.clone(), repo.clone()));
    let session = Arc::new(AccessSession::new(
        Arc::new(AuthorizationEngine::winespa_default()),
        cache,
        provider.clone(),
        GuardConfig::default(),
    ));
    Harness {
        session,
        provider,
        loader,
        repo,
    }
}

async fn eventually<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn guard_walks_from_auth_pending_to_resolved() {
    let h = harness(ScriptedLoader::new().with_rows(21, &["clientes_listar"]));
    let mut guard = h.session.guard("/clientes");

    assert_eq!(h.session.advance(&mut guard), Render::Content);
    assert_eq!(guard.state(), &GuardState::AuthPending);

    h.provider.restore(Some(principal(21, Role::Manicurist)));
    assert_eq!(h.session.advance(&mut guard), Render::Content);
    assert_eq!(guard.state(), &GuardState::PermissionPending);

    h.session.sync().await.unwrap();
    assert_eq!(h.session.advance(&mut guard), Render::Content);
    assert!(matches!(guard.state(), GuardState::Resolved(d) if d.verdict == Verdict::Allow));

    guard.navigate("/usuarios");
    assert!(matches!(h.session.advance(&mut guard), Render::AccessDenied { .. }));
}

#[tokio::test]
async fn run_loop_loads_on_login_and_invalidates_on_logout() {
    let h = harness(ScriptedLoader::new().with_rows(30, &["Clientes", "citas_listar"]));
    let runner = {
        let session = h.session.clone();
        tokio::spawn(async move { session.run().await })
    };

    h.provider.login(principal(30, Role::Assistant));
    let session = h.session.clone();
    eventually("permissions to load", || !session.permissions().is_pending()).await;

    assert!(h.session.evaluate("/clientes", &EvaluateOptions::default()).is_allowed());
    assert_eq!(h.repo.len(), 1);
    assert_eq!(
        h.session
            .allowed_routes()
            .iter()
            .filter(|p| p.starts_with("/citas"))
            .count(),
        2
    );

    h.provider.logout();
    let repo = h.repo.clone();
    eventually("repository to clear", || repo.is_empty()).await;
    assert!(h.session.permissions().is_pending());
    assert_eq!(
        h.session.evaluate("/clientes", &EvaluateOptions::default()).verdict,
        Verdict::RedirectLogin
    );

    runner.abort();
}

#[tokio::test]
async fn invalidation_during_a_run_loop_load_still_resolves() {
    let h = harness(
        ScriptedLoader::new()
            .with_rows(40, &["clientes_listar"])
            .gated(),
    );
    let runner = {
        let session = h.session.clone();
        tokio::spawn(async move { session.run().await })
    };

    h.provider.login(principal(40, Role::Assistant));
    let loader = h.loader.clone();
    eventually("first fetch to start", || loader.calls() == 1).await;

    h.session.cache().invalidate();
    h.loader.release(2);

    let session = h.session.clone();
    eventually("permissions to settle", || !session.permissions().is_pending()).await;
    assert_eq!(h.loader.calls(), 2);

    let mut guard = h.session.guard("/clientes");
    assert_eq!(h.session.advance(&mut guard), Render::Content);
    assert!(matches!(guard.state(), GuardState::Resolved(d) if d.verdict == Verdict::Allow));

    runner.abort();
}

#[tokio::test]
async fn invalidation_after_settling_loads_again() {
    let h = harness(ScriptedLoader::new().with_rows(42, &["roles_listar"]));
    let runner = {
        let session = h.session.clone();
        tokio::spawn(async move { session.run().await })
    };

    h.provider.login(principal(42, Role::Assistant));
    let session = h.session.clone();
    eventually("first load", || !session.permissions().is_pending()).await;

    h.session.cache().invalidate();
    let loader = h.loader.clone();
    eventually("second fetch", || loader.calls() == 2).await;
    let session = h.session.clone();
    eventually("permissions to settle again", || !session.permissions().is_pending()).await;
    assert!(h.session.evaluate("/roles", &EvaluateOptions::default()).is_allowed());

    runner.abort();
}

#[tokio::test]
async fn permissions_changed_refetches_for_the_current_principal() {
    let h = harness(ScriptedLoader::new().with_rows(44, &["insumos_listar"]));
    assert!(h.session.permissions_changed().await.unwrap().is_none());

    h.provider.login(principal(44, Role::Manicurist));
    h.session.sync().await.unwrap();
    assert_eq!(h.loader.calls(), 1);

    let set = h.session.permissions_changed().await.unwrap().unwrap();
    assert!(set.contains("insumos_listar"));
    assert_eq!(h.loader.calls(), 2);
    assert!(!h.session.permissions().is_pending());
}

#[tokio::test]
async fn switching_principals_loads_the_new_set() {
    let h = harness(
        ScriptedLoader::new()
            .with_rows(40, &["usuarios_listar"])
            .with_rows(41, &["clientes_listar"]),
    );
    let runner = {
        let session = h.session.clone();
        tokio::spawn(async move { session.run().await })
    };

    h.provider.login(principal(40, Role::Assistant));
    let session = h.session.clone();
    eventually("first principal", || !session.permissions().is_pending()).await;

    h.provider.login(principal(41, Role::Assistant));
    let session = h.session.clone();
    eventually("second principal", || !session.permissions().is_pending()).await;

    assert!(h.session.evaluate("/clientes", &EvaluateOptions::default()).is_allowed());
    assert!(!h.session.evaluate("/usuarios", &EvaluateOptions::default()).is_allowed());

    runner.abort();
}

#[tokio::test]
async fn menu_and_controls_follow_the_loaded_set() {
    let h = harness(ScriptedLoader::new().with_rows(50, &["Novedades", "novedades_crear"]));
    h.provider.login(principal(50, Role::Manicurist));

    let before = h.session.menu(&winespa_sidebar());
    assert_eq!(before.len(), 1);

    h.session.sync().await.unwrap();
    let after = h.session.menu(&winespa_sidebar());
    let labels: Vec<&str> = after.iter().map(|e| e.label()).collect();
    assert_eq!(labels, vec!["Dashboard", "Servicios"]);

    assert!(h.session.control(&ActionGuard::new("novedades", Action::Create)).is_enabled());
    assert_eq!(
        h.session.control(&ActionGuard::new("novedades", Action::Delete)),
        ControlState::Hidden
    );
}

#[tokio::test]
async fn logout_through_sync_clears_everything() {
    let h = harness(ScriptedLoader::new().with_rows(60, &["roles_listar"]));
    h.provider.login(principal(60, Role::Assistant));
    h.session.sync().await.unwrap();
    assert!(h.repo.get(principal(60, Role::Assistant).id).unwrap().is_some());

    h.provider.logout();
    assert!(h.session.sync().await.unwrap().is_none());
    assert!(h.repo.is_empty());
    assert_eq!(h.loader.calls(), 1);
    assert_eq!(h.provider.current(), winespa_authz::SessionSnapshot::Anonymous);
}
