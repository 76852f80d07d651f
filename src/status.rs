//! Check-in status -- local log statistics with a best-effort remote overlay.

use std::sync::Arc;

use tracing::{debug, error};

use crate::credentials::{CredentialKey, CredentialStore};
use crate::storage::{OutcomeLog, SignStats};
use crate::upstream::schema::UserInfoData;
use crate::upstream::Upstream;

/// Result of asking the reward site for fresher counters.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOverlay {
    Available(UserInfoData),
    /// No token, non-200, transport failure or `success=false`.
    Unavailable(String),
}

impl SignStats {
    /// Replace only the counters the remote side actually reported.
    pub fn overlay(&mut self, remote: &UserInfoData) {
        if let Some(days) = remote.continuous_days {
            self.continuous_days = days;
        }
        if let Some(total) = remote.total_signs {
            self.total_signs = total;
        }
    }
}

pub async fn fetch_overlay(upstream: &dyn Upstream, token: &str) -> RemoteOverlay {
    if token.is_empty() {
        return RemoteOverlay::Unavailable("no reward-site token".into());
    }
    match upstream.user_info(token).await {
        Ok(env) if env.success => RemoteOverlay::Available(env.data.unwrap_or_default()),
        Ok(env) => RemoteOverlay::Unavailable(env.message_or("user info rejected")),
        Err(e) => RemoteOverlay::Unavailable(e.to_string()),
    }
}

#[derive(Clone)]
pub struct StatusAggregator {
    credentials: Arc<dyn CredentialStore>,
    upstream: Arc<dyn Upstream>,
    log: Arc<dyn OutcomeLog>,
}

impl StatusAggregator {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        upstream: Arc<dyn Upstream>,
        log: Arc<dyn OutcomeLog>,
    ) -> Self {
        Self {
            credentials,
            upstream,
            log,
        }
    }

    /// Local stats, overlaid with remote counters when they are available.
    pub async fn status(&self) -> SignStats {
        let mut stats = self.log.stats().unwrap_or_else(|e| {
            error!(error = %e, "failed to read sign stats");
            SignStats::default()
        });

        let token = self.credentials.get(CredentialKey::RewardToken);
        match fetch_overlay(self.upstream.as_ref(), &token).await {
            RemoteOverlay::Available(remote) => stats.overlay(&remote),
            RemoteOverlay::Unavailable(reason) => {
                debug!(%reason, "remote status unavailable, using local stats");
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallError;
    use crate::storage::{MemoryOutcomeLog, SignStatus, Trigger};
    use crate::testing::StubUpstream;
    use crate::upstream::schema::Envelope;

    fn aggregator(stub: &StubUpstream, with_token: bool) -> (StatusAggregator, Arc<MemoryOutcomeLog>) {
        let ctx = if with_token {
            stub.context_with_all_credentials()
        } else {
            stub.context_without_credentials()
        };
        let log = Arc::new(MemoryOutcomeLog::default());
        for _ in 0..2 {
            log.append(SignStatus::Success, "ok", Trigger::Manual).unwrap();
        }
        (
            StatusAggregator::new(ctx.credentials, ctx.upstream, log.clone()),
            log,
        )
    }

    #[test]
    fn test_overlay_keeps_unreported_fields() {
        let mut stats = SignStats {
            continuous_days: 3,
            total_signs: 10,
            ..Default::default()
        };
        stats.overlay(&UserInfoData {
            continuous_days: Some(4),
            total_signs: None,
        });
        assert_eq!(stats.continuous_days, 4);
        assert_eq!(stats.total_signs, 10);
    }

    #[tokio::test]
    async fn test_remote_overlay_applied() {
        let stub = StubUpstream::default().with_user_info(Ok(Envelope::ok(UserInfoData {
            continuous_days: Some(30),
            total_signs: None,
        })));
        let (agg, _) = aggregator(&stub, true);

        let stats = agg.status().await;
        assert!(stats.signed_today);
        assert_eq!(stats.continuous_days, 30);
        assert_eq!(stats.total_signs, 2);
    }

    #[tokio::test]
    async fn test_remote_failure_keeps_local() {
        let stub = StubUpstream::default().with_user_info(Err(CallError::http(500, "")));
        let (agg, _) = aggregator(&stub, true);

        let stats = agg.status().await;
        assert_eq!(stats.continuous_days, 1);
        assert_eq!(stats.total_signs, 2);
        assert_eq!(stub.user_info_calls(), 1);
    }

    #[tokio::test]
    async fn test_rejected_remote_keeps_local() {
        let stub = StubUpstream::default().with_user_info(Ok(Envelope {
            success: false,
            message: None,
            data: Some(UserInfoData {
                continuous_days: Some(99),
                total_signs: Some(99),
            }),
        }));
        let (agg, _) = aggregator(&stub, true);
        assert_eq!(agg.status().await.total_signs, 2);
    }

    #[tokio::test]
    async fn test_no_token_skips_remote_call() {
        let stub = StubUpstream::default();
        let (agg, _) = aggregator(&stub, false);

        let stats = agg.status().await;
        assert_eq!(stats.total_signs, 2);
        assert_eq!(stub.user_info_calls(), 0);
    }
}
