/**
 * STORES - Dépôts en mémoire des migrations et code packages
 *
 * RÔLE : Le collaborateur de persistance derrière l'API REST et
 * l'orchestrateur. Lignes indexées par ids courts; dernier écrivain
 * gagnant. Les CodeState et contextes d'exécution ne sont jamais
 * persistés — tout est perdu au redémarrage du process.
 */

use crate::models::Migration;
use crate::state::{new_state, Shared};
use peregrine_proto::CodePackage;
use std::collections::HashMap;

#[derive(Clone)]
pub struct CodeStore {
    rows: Shared<HashMap<String, CodePackage>>,
}

impl CodeStore {
    pub fn new() -> Self {
        Self { rows: new_state(HashMap::new()) }
    }

    pub fn save(&self, pkg: CodePackage) {
        self.rows.lock().insert(pkg.id.clone(), pkg);
    }

    pub fn find(&self, id: &str) -> Option<CodePackage> {
        self.rows.lock().get(id).cloned()
    }

    pub fn all(&self) -> Vec<CodePackage> {
        self.rows.lock().values().cloned().collect()
    }
}

#[derive(Clone)]
pub struct MigrationStore {
    rows: Shared<HashMap<String, Migration>>,
}

impl MigrationStore {
    pub fn new() -> Self {
        Self { rows: new_state(HashMap::new()) }
    }

    pub fn save(&self, migration: Migration) {
        self.rows.lock().insert(migration.id.clone(), migration);
    }

    pub fn find(&self, id: &str) -> Option<Migration> {
        self.rows.lock().get(id).cloned()
    }

    pub fn all(&self) -> Vec<Migration> {
        self.rows.lock().values().cloned().collect()
    }
}

impl Default for CodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for MigrationStore {
    fn default() -> Self {
        Self::new()
    }
}
