use std::sync::Arc;

use crate::credentials::CredentialStore;
use crate::refresh::IdentityExchange;
use crate::scheduler::Scheduler;
use crate::sign::SignWorkflow;
use crate::status::StatusAggregator;
use crate::storage::OutcomeLog;
use crate::upstream::Upstream;

#[derive(Clone)]
pub struct AppState {
    pub workflow: SignWorkflow,
    pub status: StatusAggregator,
    pub credentials: Arc<dyn CredentialStore>,
    pub log: Arc<dyn OutcomeLog>,
    pub upstream: Arc<dyn Upstream>,
    pub exchange: Arc<dyn IdentityExchange>,
    pub scheduler: Scheduler,
}
