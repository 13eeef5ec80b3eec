/*!
Peregrine DevKit - Outils de développement et de test sans broker

Permet de tester le coordinateur et les agents sans démarrer un broker
MQTT réel :
- `MockBus` : implémentation en mémoire de `EventBus` qui enregistre tout
- builders de messages conformes au contrat peregrine
*/

pub mod bus_stub;
pub mod builders;

pub use bus_stub::{MockBus, MockMessage};
pub use builders::PeregrineMessageBuilder;

/// Init logging pour les tests (idempotent).
pub fn init_test_logging() {
    env_logger::try_init().ok();
}
