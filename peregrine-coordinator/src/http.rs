/**
 * API REST PEREGRINE - Serveur HTTP du coordinateur
 *
 * RÔLE : Interface de pilotage du testbed : upload de code packages,
 * déclenchement et suivi des migrations, inspection de la flotte.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum sur port 8080, routes sous /api
 * - Les écritures passent par l'orchestrateur, les lectures par les stores
 * - POST migrations retourne le PENDING immédiatement, la suite s'observe
 *   sur le bus ou par GET
 */

use crate::models::{CodeUpload, Migration, MigrationRequest, Node, TopologySnapshot};
use crate::orchestrator::MigrationService;
use crate::registry::NodeRegistry;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use peregrine_proto::CodePackage;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<NodeRegistry>,
    pub migrations: Arc<MigrationService>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/code", post(upload_code).get(list_code))
        .route("/api/code/{id}", get(get_code))
        .route("/api/migrations", post(create_migration).get(list_migrations))
        .route("/api/migrations/{id}", get(get_migration))
        .route("/api/migrations/{id}/cancel", post(cancel_migration))
        .route("/api/nodes", get(list_nodes))
        .route("/api/nodes/topology", get(get_topology))
        .route("/api/nodes/{id}", get(get_node))
        .route("/api/nodes/{id}/metrics", get(get_node_metrics))
        .with_state(app_state)
}

// POST /api/code (upload + notification du nœud initial)
async fn upload_code(
    State(app): State<AppState>,
    Json(dto): Json<CodeUpload>,
) -> (StatusCode, Json<CodePackage>) {
    let package = app.migrations.upload_code(dto).await;
    (StatusCode::CREATED, Json(package))
}

// GET /api/code (liste)
async fn list_code(State(app): State<AppState>) -> Json<Vec<CodePackage>> {
    Json(app.migrations.all_code_packages())
}

// GET /api/code/:id (détail)
async fn get_code(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CodePackage>, StatusCode> {
    app.migrations.get_code_package(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

// POST /api/migrations (retourne le PENDING, l'exécution part en tâche de fond)
async fn create_migration(
    State(app): State<AppState>,
    Json(request): Json<MigrationRequest>,
) -> (StatusCode, Json<Migration>) {
    let migration = app.migrations.initiate_migration(request).await;
    (StatusCode::ACCEPTED, Json(migration))
}

// GET /api/migrations (liste)
async fn list_migrations(State(app): State<AppState>) -> Json<Vec<Migration>> {
    Json(app.migrations.all_migrations())
}

// GET /api/migrations/:id (détail)
async fn get_migration(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Migration>, StatusCode> {
    app.migrations.get_migration(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

// POST /api/migrations/:id/cancel
// Répond cancelled sans rien muter : la migration continue en tâche de
// fond et terminera COMPLETED ou FAILED. Comportement assumé du testbed,
// les clients ne doivent pas s'appuyer sur cette route.
async fn cancel_migration(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if app.migrations.get_migration(&id).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(serde_json::json!({ "status": "cancelled" })))
}

// GET /api/nodes (liste)
async fn list_nodes(State(app): State<AppState>) -> Json<Vec<Node>> {
    Json(app.registry.topology().nodes)
}

// GET /api/nodes/topology (snapshot horodaté)
async fn get_topology(State(app): State<AppState>) -> Json<TopologySnapshot> {
    Json(app.registry.topology())
}

// GET /api/nodes/:id (détail)
async fn get_node(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Node>, StatusCode> {
    app.registry.get_node(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

// GET /api/nodes/:id/metrics (dernier rapport, 404 si nœud inconnu ou muet)
async fn get_node_metrics(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<crate::models::NodeMetrics>, StatusCode> {
    app.registry
        .get_node(&id)
        .and_then(|n| n.metrics)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MigrationStatus, MigrationType, NodeStatus};
    use crate::orchestrator::MigrationSettings;
    use crate::store::{CodeStore, MigrationStore};
    use peregrine_devkit::MockBus;
    use peregrine_proto::NodeRegistration;
    use std::time::Duration;

    async fn app_state(bus: &MockBus) -> AppState {
        let registry = Arc::new(NodeRegistry::new(Arc::new(bus.clone())));
        for id in ["node-1", "node-2"] {
            registry
                .register_node(NodeRegistration {
                    id: id.into(),
                    host: "127.0.0.1".into(),
                    port: 8081,
                })
                .await;
        }
        let migrations = MigrationService::new(
            registry.clone(),
            CodeStore::new(),
            MigrationStore::new(),
            Arc::new(bus.clone()),
            MigrationSettings { pacing: Duration::ZERO, capture_wait: Duration::from_millis(100) },
        );
        AppState { registry, migrations }
    }

    fn upload_dto(node: &str) -> CodeUpload {
        CodeUpload {
            name: "demo".into(),
            code: "let n = 1; n".into(),
            entry_point: "run".into(),
            initial_node_id: Some(node.into()),
        }
    }

    #[tokio::test]
    async fn upload_then_migrate_via_handlers() {
        let bus = MockBus::new();
        let app = app_state(&bus).await;

        let (code, Json(package)) =
            upload_code(State(app.clone()), Json(upload_dto("node-1"))).await;
        assert_eq!(code, StatusCode::CREATED);
        assert_eq!(package.current_node_id.as_deref(), Some("node-1"));

        let (code, Json(migration)) = create_migration(
            State(app.clone()),
            Json(MigrationRequest {
                code_id: package.id.clone(),
                source_node_id: None,
                target_node_id: "node-2".into(),
                migration_type: Some(MigrationType::Weak),
            }),
        )
        .await;
        assert_eq!(code, StatusCode::ACCEPTED);
        assert_eq!(migration.status, MigrationStatus::Pending);
        assert_eq!(migration.source_node_id, "node-1");

        // la migration tourne en arrière-plan; on attend son terme
        for _ in 0..500 {
            let m = app.migrations.get_migration(&migration.id).unwrap();
            if m.status == MigrationStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let Json(done) = get_migration(State(app.clone()), Path(migration.id)).await.unwrap();
        assert_eq!(done.status, MigrationStatus::Completed);
        let Json(moved) = get_code(State(app), Path(package.id)).await.unwrap();
        assert_eq!(moved.current_node_id.as_deref(), Some("node-2"));
    }

    #[tokio::test]
    async fn cancel_answers_without_mutating() {
        let bus = MockBus::new();
        let app = app_state(&bus).await;
        let (_, Json(package)) = upload_code(State(app.clone()), Json(upload_dto("node-1"))).await;
        let (_, Json(migration)) = create_migration(
            State(app.clone()),
            Json(MigrationRequest {
                code_id: package.id,
                source_node_id: None,
                target_node_id: "node-2".into(),
                migration_type: None,
            }),
        )
        .await;

        let Json(body) =
            cancel_migration(State(app.clone()), Path(migration.id.clone())).await.unwrap();
        assert_eq!(body["status"], "cancelled");

        // le statut réel n'est jamais CANCELLED
        for _ in 0..500 {
            let m = app.migrations.get_migration(&migration.id).unwrap();
            assert_ne!(m.status, MigrationStatus::Cancelled);
            if m.status == MigrationStatus::Completed {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("migration never completed");
    }

    #[tokio::test]
    async fn cancel_unknown_migration_is_404() {
        let bus = MockBus::new();
        let app = app_state(&bus).await;
        let res = cancel_migration(State(app), Path("nope".into())).await;
        assert_eq!(res.unwrap_err(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn node_lookups() {
        let bus = MockBus::new();
        let app = app_state(&bus).await;

        let Json(nodes) = list_nodes(State(app.clone())).await;
        assert_eq!(nodes.len(), 2);
        let Json(node) = get_node(State(app.clone()), Path("node-1".into())).await.unwrap();
        assert_eq!(node.status, NodeStatus::Online);

        // pas encore de metrics rapportées
        let res = get_node_metrics(State(app.clone()), Path("node-1".into())).await;
        assert_eq!(res.unwrap_err(), StatusCode::NOT_FOUND);
        let res = get_node(State(app), Path("ghost".into())).await;
        assert_eq!(res.unwrap_err(), StatusCode::NOT_FOUND);
    }
}
