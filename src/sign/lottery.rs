//! Lottery + redeem check-in: spin for a code, then redeem it on the second host.

use async_trait::async_trait;
use tracing::{info, warn};

use super::result::{Completed, RunData, RunResult};
use super::{CheckinStrategy, SignContext};
use crate::credentials::CredentialKey;
use crate::error::FailureKind;

/// Shortest prefix of a code that ends up in log lines.
const CODE_PREFIX: usize = 8;

fn code_prefix(code: &str) -> String {
    code.chars().take(CODE_PREFIX).collect()
}

pub struct LotteryRedeem;

#[async_trait]
impl CheckinStrategy for LotteryRedeem {
    fn name(&self) -> &'static str {
        "lottery_redeem"
    }

    async fn action(&self, ctx: &SignContext) -> RunResult {
        let token = ctx.credentials.get(CredentialKey::RewardToken);
        if token.is_empty() {
            return RunResult::failed(
                FailureKind::MissingCredential,
                "no reward-site token stored; set the identity token and refresh",
            );
        }

        let env = match ctx.upstream.lottery(&token).await {
            Ok(env) => env,
            Err(e) => return RunResult::from_call_error("lottery", &e),
        };
        if !env.success {
            return RunResult::failed(FailureKind::ApiRejected, env.message_or("lottery failed"));
        }

        let data = env.data.unwrap_or_default();
        let quota = data.quota_or_zero();
        let label = data.label.clone().unwrap_or_default();
        RunResult::succeeded(
            format!("lottery won {label}, quota {quota}"),
            RunData {
                cdk: data.code().map(str::to_string),
                quota: Some(quota),
                times: Some(data.times.unwrap_or(0)),
                label: Some(label),
                ..Default::default()
            },
        )
    }

    async fn complete(&self, ctx: &SignContext) -> Completed {
        let spun = self.action(ctx).await;
        if !spun.success {
            let log_message = format!("lottery failed: {}", spun.message);
            return Completed {
                result: RunResult {
                    data: None,
                    ..spun
                },
                log_message,
            };
        }

        let lottery = spun.data.clone().unwrap_or_default();
        let Some(code) = lottery.cdk.clone() else {
            return RunResult::failed(
                FailureKind::MissingArtifact,
                "lottery succeeded but no code was returned",
            )
            .into();
        };
        let lottery_quota = lottery.quota.clone().unwrap_or_else(|| 0.into());
        info!(code = %code_prefix(&code), quota = %lottery_quota, "lottery won, redeeming");

        let redeemed = redeem(ctx, &code).await;
        let quota = match redeemed {
            Ok(quota) => quota.unwrap_or_else(|| lottery_quota.clone()),
            Err(failure) => {
                warn!(code = %code_prefix(&code), "redemption failed after lottery win");
                let log_message = format!(
                    "lottery succeeded (code {}...) but redemption failed: {}",
                    code_prefix(&code),
                    failure.message
                );
                let result = RunResult {
                    message: format!("lottery succeeded but redemption failed: {}", failure.message),
                    ..failure
                }
                .with_data(RunData {
                    cdk: Some(code),
                    lottery_quota: Some(lottery_quota),
                    ..Default::default()
                });
                return Completed {
                    result,
                    log_message,
                };
            }
        };

        RunResult::succeeded(
            format!("checked in: {}; redeemed quota {quota}", spun.message),
            RunData {
                cdk: Some(code),
                quota: Some(quota),
                times: lottery.times,
                label: lottery.label,
                ..Default::default()
            },
        )
        .into()
    }
}

/// Redeem `code`; `Ok` carries the quota the host reported, if any.
async fn redeem(ctx: &SignContext, code: &str) -> Result<Option<serde_json::Number>, RunResult> {
    let auth = ctx.credentials.redemption_config();
    if !auth.is_configured() {
        return Err(RunResult::failed(
            FailureKind::MissingCredential,
            "redemption session and user id are not configured",
        ));
    }

    let env = ctx
        .upstream
        .redeem(&auth, code)
        .await
        .map_err(|e| RunResult::from_call_error("redemption", &e))?;
    if !env.success {
        return Err(RunResult::failed(
            FailureKind::ApiRejected,
            env.message_or("redemption failed"),
        ));
    }
    Ok(env.data.and_then(|q| q.0))
}
