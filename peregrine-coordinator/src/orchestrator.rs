/**
 * MIGRATION ORCHESTRATOR - Machine à états des migrations de code
 *
 * RÔLE : Conduit une migration de bout en bout : fetch du code, capture
 * d'état optionnelle (mobilité forte), quiesce de la source, transfert du
 * package vers la cible, relance de l'exécution. Chaque étape est
 * persistée et diffusée sur le bus.
 *
 * ARCHITECTURE : PENDING -> IN_PROGRESS -> {COMPLETED, FAILED}. Pool
 * borné de 5 slots; une migration occupe son slot toute sa vie, attente
 * de capture et délais de pacing compris. La capture d'état se résout par
 * oneshot signalé depuis le handler state-captured, avec timeout non
 * fatal de 5 s.
 */

use crate::models::{
    short_id, CodeUpload, Migration, MigrationRequest, MigrationStatus, MigrationType, NodeStatus,
};
use crate::store::{CodeStore, MigrationStore};
use crate::registry::NodeRegistry;
use parking_lot::Mutex;
use peregrine_proto::{
    now_millis, topics, topics::command, CaptureStateCommand, CodePackage, CodeState,
    ExecuteCommand, EventBus, FetchCommand, StopCommand,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{oneshot, Semaphore};

/// Slots d'exécution concurrents; une 6e migration soumise attend qu'un
/// slot se libère.
const MIGRATION_POOL_SLOTS: usize = 5;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("code package not found: {0}")]
    CodeNotFound(String),
}

#[derive(Debug, Clone)]
pub struct MigrationSettings {
    pub pacing: Duration,
    pub capture_wait: Duration,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self { pacing: Duration::from_millis(800), capture_wait: Duration::from_secs(5) }
    }
}

pub struct MigrationService {
    registry: Arc<NodeRegistry>,
    codes: CodeStore,
    migrations: MigrationStore,
    bus: Arc<dyn EventBus>,
    slots: Arc<Semaphore>,
    pending_captures: Mutex<HashMap<String, oneshot::Sender<CodeState>>>,
    settings: MigrationSettings,
}

impl MigrationService {
    pub fn new(
        registry: Arc<NodeRegistry>,
        codes: CodeStore,
        migrations: MigrationStore,
        bus: Arc<dyn EventBus>,
        settings: MigrationSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            codes,
            migrations,
            bus,
            slots: Arc::new(Semaphore::new(MIGRATION_POOL_SLOTS)),
            pending_captures: Mutex::new(HashMap::new()),
            settings,
        })
    }

    /// Crée l'enregistrement PENDING, le diffuse, et confie l'exécution au
    /// pool. Retourne immédiatement — la progression s'observe par
    /// broadcast ou par polling. Une source absente est résolue depuis le
    /// package; un package inconnu laisse la source vide, l'échec ne
    /// surface qu'à l'exécution.
    pub async fn initiate_migration(self: &Arc<Self>, request: MigrationRequest) -> Migration {
        let migration_id = short_id();

        let source_node_id = request
            .source_node_id
            .filter(|s| !s.is_empty())
            .or_else(|| self.codes.find(&request.code_id).and_then(|c| c.current_node_id))
            .unwrap_or_default();

        let migration = Migration {
            id: migration_id.clone(),
            code_id: request.code_id,
            source_node_id: source_node_id.clone(),
            target_node_id: request.target_node_id.clone(),
            migration_type: request.migration_type.unwrap_or(MigrationType::Weak),
            status: MigrationStatus::Pending,
            progress: 0,
            start_time: OffsetDateTime::now_utc(),
            end_time: None,
            error_message: None,
        };

        self.migrations.save(migration.clone());
        self.broadcast_migration(&migration).await;

        let service = Arc::clone(self);
        let job = migration.clone();
        tokio::spawn(async move {
            if let Ok(_permit) = service.slots.clone().acquire_owned().await {
                service.execute_migration(job).await;
            }
        });

        println!(
            "[migration] initiated {migration_id} from {source_node_id} to {}",
            request.target_node_id
        );
        migration
    }

    /// Conduit la migration sur son slot de pool. Quelle que soit l'issue,
    /// les deux nœuds repassent ONLINE — une migration échouée ne laisse
    /// jamais un nœud bloqué en MIGRATING.
    pub async fn execute_migration(&self, mut migration: Migration) {
        match self.run_steps(&mut migration).await {
            Ok(()) => {
                let ended = OffsetDateTime::now_utc();
                migration.status = MigrationStatus::Completed;
                migration.end_time = Some(ended);
                self.migrations.save(migration.clone());
                self.broadcast_migration(&migration).await;
                println!(
                    "[migration] {} completed in {}ms",
                    migration.id,
                    (ended - migration.start_time).whole_milliseconds()
                );
            }
            Err(e) => {
                migration.status = MigrationStatus::Failed;
                migration.error_message = Some(e.to_string());
                migration.end_time = Some(OffsetDateTime::now_utc());
                self.migrations.save(migration.clone());
                self.broadcast_migration(&migration).await;
                eprintln!("[migration] {} failed: {e}", migration.id);
            }
        }

        self.registry.update_status(&migration.source_node_id, NodeStatus::Online).await;
        self.registry.update_status(&migration.target_node_id, NodeStatus::Online).await;
    }

    /// Checkpoints de progression fixes {10,20,40,60,80,95,100}, émis dans
    /// l'ordre par l'unique tâche qui conduit la migration.
    async fn run_steps(&self, migration: &mut Migration) -> Result<(), MigrationError> {
        migration.status = MigrationStatus::InProgress;
        self.migrations.save(migration.clone());
        self.broadcast_migration(migration).await;
        println!(
            "[migration] {} starting: {} -> {} ({:?})",
            migration.id, migration.source_node_id, migration.target_node_id, migration.migration_type
        );

        self.registry.update_status(&migration.source_node_id, NodeStatus::Migrating).await;
        self.registry.update_status(&migration.target_node_id, NodeStatus::Migrating).await;

        // Step 1 : charger le package
        self.update_progress(migration, 10, "Preparing migration").await;
        let mut package = self
            .codes
            .find(&migration.code_id)
            .ok_or_else(|| MigrationError::CodeNotFound(migration.code_id.clone()))?;

        // Step 2 : fetch — signal informatif, la source détient déjà le code
        self.update_progress(migration, 20, "Fetching code from source node").await;
        self.bus
            .publish(
                &topics::node_command(&migration.source_node_id, command::FETCH),
                json!(FetchCommand {
                    code_id: migration.code_id.clone(),
                    migration_id: migration.id.clone(),
                }),
            )
            .await;

        // Step 3 : capture d'état (mobilité forte uniquement)
        if migration.migration_type == MigrationType::Strong {
            self.update_progress(migration, 40, "Capturing execution state from worker").await;
            let capture = self.register_capture(&migration.code_id);
            self.bus
                .publish(
                    &topics::node_command(&migration.source_node_id, command::CAPTURE_STATE),
                    json!(CaptureStateCommand { code_id: migration.code_id.clone() }),
                )
                .await;

            match tokio::time::timeout(self.settings.capture_wait, capture).await {
                Ok(Ok(state)) => {
                    println!(
                        "[migration] {} captured {} variables from {}",
                        migration.id,
                        state.variables.len(),
                        migration.source_node_id
                    );
                    package.state = Some(state);
                }
                // Timeout ou sender droppé : mode dégradé, jamais un échec.
                _ => {
                    self.clear_capture(&migration.code_id);
                    eprintln!(
                        "[migration] {} warning: no state received from worker, continuing with empty state",
                        migration.id
                    );
                }
            }
        } else {
            self.update_progress(migration, 40, "Skipping state capture (weak migration)").await;
        }

        // Step 4 : quiesce de la source — le contexte ne sera plus suivi,
        // un run en vol n'est pas interrompu pour autant
        self.update_progress(migration, 60, "Stopping execution on source node").await;
        self.bus
            .publish(
                &topics::node_command(&migration.source_node_id, command::STOP),
                json!(StopCommand { code_id: migration.code_id.clone() }),
            )
            .await;

        // Step 5 : transfert — le package change de propriétaire
        self.update_progress(migration, 80, "Transferring code to target node").await;
        package.current_node_id = Some(migration.target_node_id.clone());
        self.codes.save(package.clone());
        self.bus
            .publish(&topics::node_command(&migration.target_node_id, command::RECEIVE), json!(package))
            .await;

        // Step 6 : relance sur la cible. Pas d'attente du résultat : il
        // arrivera en événement execution-complete, découplé du statut de
        // la migration.
        self.update_progress(migration, 95, "Starting execution on target node").await;
        self.bus
            .publish(
                &topics::node_command(&migration.target_node_id, command::EXECUTE),
                json!(ExecuteCommand { code_id: package.id.clone() }),
            )
            .await;

        self.update_progress(migration, 100, "Migration completed successfully").await;
        Ok(())
    }

    /// Persiste + diffuse un checkpoint, puis applique le délai de pacing.
    async fn update_progress(&self, migration: &mut Migration, progress: u8, message: &str) {
        migration.progress = progress;
        self.migrations.save(migration.clone());

        self.bus
            .publish(
                &topics::migration_progress(&migration.id),
                json!({
                    "migrationId": migration.id,
                    "progress": progress,
                    "message": message,
                    "timestamp": now_millis()
                }),
            )
            .await;
        self.broadcast_migration(migration).await;

        if !self.settings.pacing.is_zero() {
            tokio::time::sleep(self.settings.pacing).await;
        }
    }

    async fn broadcast_migration(&self, migration: &Migration) {
        self.bus.publish(topics::MIGRATIONS, json!(migration)).await;
    }

    fn register_capture(&self, code_id: &str) -> oneshot::Receiver<CodeState> {
        let (tx, rx) = oneshot::channel();
        self.pending_captures.lock().insert(code_id.to_string(), tx);
        rx
    }

    fn clear_capture(&self, code_id: &str) {
        self.pending_captures.lock().remove(code_id);
    }

    /// Résout l'attente de capture d'une migration STRONG (appelé par le
    /// listener bus à réception de state-captured). Un état non sollicité
    /// est jeté.
    pub fn save_captured_state(&self, code_id: &str, state: CodeState) {
        let waiter = self.pending_captures.lock().remove(code_id);
        match waiter {
            Some(tx) => {
                let count = state.variables.len();
                if tx.send(state).is_ok() {
                    println!("[migration] state saved for code {code_id}: {count} variables");
                }
            }
            None => println!("[migration] unsolicited state for code {code_id}, dropped"),
        }
    }

    // ---- Code packages ----

    /// Upload d'un package : id court généré, stockage, notification du
    /// nœud initial qui l'exécutera immédiatement.
    pub async fn upload_code(&self, dto: CodeUpload) -> CodePackage {
        let code_id = short_id();
        let package = CodePackage {
            id: code_id.clone(),
            name: dto.name,
            code: dto.code,
            entry_point: dto.entry_point,
            current_node_id: dto.initial_node_id.clone(),
            state: None,
            metadata: HashMap::from([
                ("createdAt".to_string(), json!(now_millis())),
                ("version".to_string(), json!("1.0")),
            ]),
        };
        self.codes.save(package.clone());

        if let Some(node_id) = &dto.initial_node_id {
            self.bus
                .publish(&topics::node_command(node_id, command::CODE_UPLOADED), json!(package))
                .await;
        }
        println!(
            "[migration] code {code_id} ({}) uploaded to {:?}",
            package.name, dto.initial_node_id
        );
        package
    }

    pub fn get_migration(&self, id: &str) -> Option<Migration> {
        self.migrations.find(id)
    }

    pub fn all_migrations(&self) -> Vec<Migration> {
        self.migrations.all()
    }

    pub fn get_code_package(&self, id: &str) -> Option<CodePackage> {
        self.codes.find(id)
    }

    pub fn all_code_packages(&self) -> Vec<CodePackage> {
        self.codes.all()
    }
}
