//! Direct check-in: one authenticated POST to the sign-in endpoint.

use async_trait::async_trait;

use super::result::{Completed, RunData, RunResult};
use super::{CheckinStrategy, SignContext};
use crate::credentials::CredentialKey;
use crate::error::FailureKind;

pub struct DirectSign;

#[async_trait]
impl CheckinStrategy for DirectSign {
    fn name(&self) -> &'static str {
        "direct_sign"
    }

    async fn action(&self, ctx: &SignContext) -> RunResult {
        let token = ctx.credentials.get(CredentialKey::RewardToken);
        if token.is_empty() {
            return RunResult::failed(
                FailureKind::MissingCredential,
                "no reward-site token stored; set the identity token and refresh",
            );
        }

        match ctx.upstream.direct_sign(&token).await {
            Ok(env) if env.success => {
                let message = env.message_or("check-in succeeded");
                RunResult::succeeded(
                    message,
                    RunData {
                        upstream: env.data,
                        ..Default::default()
                    },
                )
            }
            Ok(env) => RunResult::failed(FailureKind::ApiRejected, env.message_or("check-in failed")),
            Err(e) => RunResult::from_call_error("check-in", &e),
        }
    }

    async fn complete(&self, ctx: &SignContext) -> Completed {
        let result = self.action(ctx).await;
        if result.success {
            return result.into();
        }
        let log_message = format!("check-in failed: {}", result.message);
        Completed {
            result,
            log_message,
        }
    }
}
