use parking_lot::Mutex;
use std::sync::Arc;

/// Alias pour l'état mutable partagé entre les callbacks bus, les handlers
/// HTTP et le pool de migration. Politique last-write-wins par clé, aucune
/// transaction inter-entités.
pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}
