//! Test doubles shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Number, Value};

use crate::credentials::{CredentialRecord, MemoryCredentialStore, RedemptionConfig};
use crate::error::CallError;
use crate::sign::SignContext;
use crate::upstream::schema::{Envelope, LotteryData, RedeemedQuota, UserInfoData};
use crate::upstream::Upstream;

type Reply<T> = Mutex<Result<Envelope<T>, CallError>>;

fn unset<T>() -> Reply<T> {
    Mutex::new(Err(CallError::Transport("stub reply not set".into())))
}

struct StubInner {
    lottery: Reply<LotteryData>,
    direct_sign: Reply<Value>,
    redeem: Reply<RedeemedQuota>,
    user_info: Reply<UserInfoData>,
    spin: Reply<Value>,
    lottery_calls: AtomicUsize,
    direct_sign_calls: AtomicUsize,
    redeem_calls: AtomicUsize,
    user_info_calls: AtomicUsize,
    last_redeemed_code: Mutex<Option<String>>,
    last_spin_token: Mutex<Option<String>>,
}

impl Default for StubInner {
    fn default() -> Self {
        Self {
            lottery: unset(),
            direct_sign: unset(),
            redeem: unset(),
            user_info: unset(),
            spin: unset(),
            lottery_calls: AtomicUsize::new(0),
            direct_sign_calls: AtomicUsize::new(0),
            redeem_calls: AtomicUsize::new(0),
            user_info_calls: AtomicUsize::new(0),
            last_redeemed_code: Mutex::new(None),
            last_spin_token: Mutex::new(None),
        }
    }
}

/// Canned-reply [`Upstream`] that counts calls. Clones share state.
#[derive(Clone, Default)]
pub struct StubUpstream {
    inner: Arc<StubInner>,
}

impl StubUpstream {
    pub fn with_lottery(self, reply: Result<Envelope<LotteryData>, CallError>) -> Self {
        *self.inner.lottery.lock().unwrap() = reply;
        self
    }

    pub fn with_direct_sign(self, reply: Result<Envelope<Value>, CallError>) -> Self {
        *self.inner.direct_sign.lock().unwrap() = reply;
        self
    }

    pub fn with_redeem(self, reply: Result<Envelope<RedeemedQuota>, CallError>) -> Self {
        *self.inner.redeem.lock().unwrap() = reply;
        self
    }

    pub fn with_user_info(self, reply: Result<Envelope<UserInfoData>, CallError>) -> Self {
        *self.inner.user_info.lock().unwrap() = reply;
        self
    }

    pub fn with_spin(self, reply: Result<Envelope<Value>, CallError>) -> Self {
        *self.inner.spin.lock().unwrap() = reply;
        self
    }

    pub fn lottery_calls(&self) -> usize {
        self.inner.lottery_calls.load(Ordering::SeqCst)
    }

    pub fn direct_sign_calls(&self) -> usize {
        self.inner.direct_sign_calls.load(Ordering::SeqCst)
    }

    pub fn redeem_calls(&self) -> usize {
        self.inner.redeem_calls.load(Ordering::SeqCst)
    }

    pub fn user_info_calls(&self) -> usize {
        self.inner.user_info_calls.load(Ordering::SeqCst)
    }

    pub fn last_redeemed_code(&self) -> Option<String> {
        self.inner.last_redeemed_code.lock().unwrap().clone()
    }

    pub fn last_spin_token(&self) -> Option<String> {
        self.inner.last_spin_token.lock().unwrap().clone()
    }

    fn context(&self, record: CredentialRecord) -> SignContext {
        SignContext {
            credentials: Arc::new(MemoryCredentialStore::new(record)),
            upstream: Arc::new(self.clone()),
        }
    }

    pub fn context_with_all_credentials(&self) -> SignContext {
        self.context(full_record())
    }

    pub fn context_with_reward_token_only(&self) -> SignContext {
        self.context(CredentialRecord {
            bohe_sign_token: "reward-token".into(),
            ..Default::default()
        })
    }

    pub fn context_without_credentials(&self) -> SignContext {
        self.context(CredentialRecord::default())
    }
}

pub fn full_record() -> CredentialRecord {
    CredentialRecord {
        bohe_sign_token: "reward-token-0123456789".into(),
        linux_do_token: "identity-token-0123456789".into(),
        linux_do_connect_token: "connect-token-0123456789".into(),
        newapi_session: "session-cookie-0123456789".into(),
        newapi_user_id: "4242".into(),
        ..Default::default()
    }
}

pub fn lottery_win(code: &str, quota: u64) -> Envelope<LotteryData> {
    Envelope::ok(LotteryData {
        cdk: Some(code.to_string()),
        quota: Some(Number::from(quota)),
        times: Some(1),
        label: Some("prize".into()),
    })
}

#[async_trait]
impl Upstream for StubUpstream {
    async fn lottery(&self, _token: &str) -> Result<Envelope<LotteryData>, CallError> {
        self.inner.lottery_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.lottery.lock().unwrap().clone()
    }

    async fn direct_sign(&self, _token: &str) -> Result<Envelope<Value>, CallError> {
        self.inner.direct_sign_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.direct_sign.lock().unwrap().clone()
    }

    async fn redeem(
        &self,
        _auth: &RedemptionConfig,
        code: &str,
    ) -> Result<Envelope<RedeemedQuota>, CallError> {
        self.inner.redeem_calls.fetch_add(1, Ordering::SeqCst);
        *self.inner.last_redeemed_code.lock().unwrap() = Some(code.to_string());
        self.inner.redeem.lock().unwrap().clone()
    }

    async fn user_info(&self, _token: &str) -> Result<Envelope<UserInfoData>, CallError> {
        self.inner.user_info_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.user_info.lock().unwrap().clone()
    }

    async fn spin(&self, token: &str) -> Result<Envelope<Value>, CallError> {
        *self.inner.last_spin_token.lock().unwrap() = Some(token.to_string());
        self.inner.spin.lock().unwrap().clone()
    }
}
