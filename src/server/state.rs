use std::sync::Arc;

use tabpilot_orchestrator::SessionOrchestrator;

#[derive(Clone)]
pub struct ServerState {
    orchestrator: Arc<SessionOrchestrator>,
}

impl ServerState {
    pub fn new(orchestrator: Arc<SessionOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &SessionOrchestrator {
        &self.orchestrator
    }
}
