pub mod blocks;
pub mod notes;

pub use blocks::BlockService;
pub use notes::{NoteService, NoteUpdate};

use crate::access::AccessGate;
use crate::auth::TokenVerifier;
use crate::clock::Clock;
use crate::config::HubConfig;
use crate::store::DocumentStore;
use std::sync::Arc;

/// Everything a request handler needs, wired over one store.
#[derive(Clone)]
pub struct Hub {
    pub gate: AccessGate,
    pub notes: NoteService,
    pub blocks: BlockService,
}

impl Hub {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        verifier: Arc<dyn TokenVerifier>,
        clock: Arc<dyn Clock>,
        config: HubConfig,
    ) -> Self {
        let gate = AccessGate::new(store.clone(), verifier, clock.clone());
        Self {
            notes: NoteService::new(gate.clone(), store.clone(), clock.clone(), &config),
            blocks: BlockService::new(gate.clone(), store, clock, &config),
            gate,
        }
    }
}
