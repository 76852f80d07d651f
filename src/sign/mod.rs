//! Check-in workflow -- reward action, optional redemption, outcome logging.
//!
//! Two site versions exist: a direct sign-in endpoint, and a lottery whose
//! code must be redeemed on a second host. Both sit behind
//! [`CheckinStrategy`]; a deployment picks one via `upstream.variant`.
//! No path raises: every outcome is a [`RunResult`].

pub mod direct;
pub mod lottery;
pub mod result;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, Instrument};
use uuid::Uuid;

use crate::config::Variant;
use crate::credentials::CredentialStore;
use crate::storage::{OutcomeLog, SignStatus, Trigger};
use crate::upstream::Upstream;

pub use self::direct::DirectSign;
pub use self::lottery::LotteryRedeem;
pub use self::result::{Completed, RunData, RunResult};

/// Collaborators a strategy may call. Credentials are reloaded on each use.
#[derive(Clone)]
pub struct SignContext {
    pub credentials: Arc<dyn CredentialStore>,
    pub upstream: Arc<dyn Upstream>,
}

/// One way of performing the daily check-in.
#[async_trait]
pub trait CheckinStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// The reward step alone: no redemption, no log entry.
    async fn action(&self, ctx: &SignContext) -> RunResult;

    /// The whole run, with the line to log for it.
    async fn complete(&self, ctx: &SignContext) -> Completed;
}

pub fn strategy_for(variant: Variant) -> Arc<dyn CheckinStrategy> {
    match variant {
        Variant::DirectSign => Arc::new(DirectSign),
        Variant::LotteryRedeem => Arc::new(LotteryRedeem),
    }
}

/// Runs a strategy and records exactly one log entry per run.
#[derive(Clone)]
pub struct SignWorkflow {
    ctx: SignContext,
    log: Arc<dyn OutcomeLog>,
    strategy: Arc<dyn CheckinStrategy>,
}

impl SignWorkflow {
    pub fn new(
        ctx: SignContext,
        log: Arc<dyn OutcomeLog>,
        strategy: Arc<dyn CheckinStrategy>,
    ) -> Self {
        Self { ctx, log, strategy }
    }

    pub fn context(&self) -> &SignContext {
        &self.ctx
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Full check-in for `trigger`.
    pub async fn run(&self, trigger: Trigger) -> RunResult {
        let span = tracing::info_span!(
            "checkin",
            run_id = %Uuid::new_v4(),
            %trigger,
            strategy = self.strategy.name()
        );

        async {
            let Completed {
                result,
                log_message,
            } = self.strategy.complete(&self.ctx).await;

            let status = if result.success {
                SignStatus::Success
            } else {
                SignStatus::Failed
            };
            if let Err(e) = self.log.append(status, &log_message, trigger) {
                error!(error = %e, "failed to record sign log");
            }

            info!(success = result.success, kind = ?result.kind, "check-in finished");
            result
        }
        .instrument(span)
        .await
    }

    /// The reward step with stored credentials, not logged.
    pub async fn reward_action(&self) -> RunResult {
        self.strategy.action(&self.ctx).await
    }
}

/// Verbatim spin response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpinResult {
    pub success: bool,
    pub message: String,
    pub data: Value,
}

/// Spin with a caller-supplied bearer token; nothing is stored or logged.
pub async fn spin(upstream: &dyn Upstream, token: &str) -> SpinResult {
    match upstream.spin(token).await {
        Ok(env) => SpinResult {
            success: env.success,
            message: env.message.unwrap_or_default(),
            data: env.data.unwrap_or_else(|| Value::Object(Default::default())),
        },
        Err(e) => {
            let failure = RunResult::from_call_error("spin", &e);
            SpinResult {
                success: false,
                message: failure.message,
                data: Value::Object(Default::default()),
            }
        }
    }
}
