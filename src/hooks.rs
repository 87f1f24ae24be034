// src/hooks.rs

//! Eight named lifecycle callbacks the embedder supplies. Missing slots are
//! silently replaced with no-ops; the kernel never carries a nil hook past
//! construction.
//!
//! Hooks receive an [`OrchestratorHandle`](crate::orchestrator::OrchestratorHandle)
//! rather than a concrete orchestrator reference, so the handle can re-enter
//! `StartAPI`/`Stop`/`ReloadClusterCert` without the hook set holding a
//! cyclic owning reference back to the orchestrator.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::error::KernelResult;
use crate::orchestrator::OrchestratorHandle;

/// Opaque, embedder-defined configuration blob passed through `StartAPI` to
/// every lifecycle hook untouched by the kernel.
pub type InitConfig = Value;

pub type HookFuture = Pin<Box<dyn Future<Output = KernelResult<()>> + Send>>;

pub type LifecycleHook =
    Arc<dyn Fn(Arc<dyn OrchestratorHandle>, InitConfig) -> HookFuture + Send + Sync>;
pub type StartHook = Arc<dyn Fn(Arc<dyn OrchestratorHandle>) -> HookFuture + Send + Sync>;
pub type HeartbeatHook = Arc<dyn Fn(Arc<dyn OrchestratorHandle>) -> HookFuture + Send + Sync>;
pub type NewMemberHook =
    Arc<dyn Fn(Arc<dyn OrchestratorHandle>, String) -> HookFuture + Send + Sync>;
pub type RemoveHook = Arc<dyn Fn(Arc<dyn OrchestratorHandle>, bool) -> HookFuture + Send + Sync>;

fn noop_lifecycle() -> HookFuture {
    Box::pin(async { Ok(()) })
}

/// Builds a [`HookSet`], defaulting every unset slot to a no-op so the kernel
/// never has to check for a missing callback at call time.
#[derive(Default)]
pub struct HookSetBuilder {
    pre_bootstrap: Option<LifecycleHook>,
    post_bootstrap: Option<LifecycleHook>,
    pre_join: Option<LifecycleHook>,
    post_join: Option<LifecycleHook>,
    on_start: Option<StartHook>,
    on_heartbeat: Option<HeartbeatHook>,
    on_new_member: Option<NewMemberHook>,
    pre_remove: Option<RemoveHook>,
    post_remove: Option<RemoveHook>,
}

impl HookSetBuilder {
    pub fn pre_bootstrap(mut self, hook: LifecycleHook) -> Self {
        self.pre_bootstrap = Some(hook);
        self
    }

    pub fn post_bootstrap(mut self, hook: LifecycleHook) -> Self {
        self.post_bootstrap = Some(hook);
        self
    }

    pub fn pre_join(mut self, hook: LifecycleHook) -> Self {
        self.pre_join = Some(hook);
        self
    }

    pub fn post_join(mut self, hook: LifecycleHook) -> Self {
        self.post_join = Some(hook);
        self
    }

    pub fn on_start(mut self, hook: StartHook) -> Self {
        self.on_start = Some(hook);
        self
    }

    pub fn on_heartbeat(mut self, hook: HeartbeatHook) -> Self {
        self.on_heartbeat = Some(hook);
        self
    }

    pub fn on_new_member(mut self, hook: NewMemberHook) -> Self {
        self.on_new_member = Some(hook);
        self
    }

    pub fn pre_remove(mut self, hook: RemoveHook) -> Self {
        self.pre_remove = Some(hook);
        self
    }

    pub fn post_remove(mut self, hook: RemoveHook) -> Self {
        self.post_remove = Some(hook);
        self
    }

    pub fn build(self) -> HookSet {
        HookSet {
            pre_bootstrap: self
                .pre_bootstrap
                .unwrap_or_else(|| Arc::new(|_, _| noop_lifecycle())),
            post_bootstrap: self
                .post_bootstrap
                .unwrap_or_else(|| Arc::new(|_, _| noop_lifecycle())),
            pre_join: self
                .pre_join
                .unwrap_or_else(|| Arc::new(|_, _| noop_lifecycle())),
            post_join: self
                .post_join
                .unwrap_or_else(|| Arc::new(|_, _| noop_lifecycle())),
            on_start: self.on_start.unwrap_or_else(|| Arc::new(|_| noop_lifecycle())),
            on_heartbeat: self
                .on_heartbeat
                .unwrap_or_else(|| Arc::new(|_| noop_lifecycle())),
            on_new_member: self
                .on_new_member
                .unwrap_or_else(|| Arc::new(|_, _| noop_lifecycle())),
            pre_remove: self
                .pre_remove
                .unwrap_or_else(|| Arc::new(|_, _| noop_lifecycle())),
            post_remove: self
                .post_remove
                .unwrap_or_else(|| Arc::new(|_, _| noop_lifecycle())),
        }
    }
}

/// Eight hooks, each guaranteed present (no-op if the embedder didn't supply
/// it). Read-only for the lifetime of the daemon once `Run` starts.
#[derive(Clone)]
pub struct HookSet {
    pre_bootstrap: LifecycleHook,
    post_bootstrap: LifecycleHook,
    pre_join: LifecycleHook,
    post_join: LifecycleHook,
    on_start: StartHook,
    on_heartbeat: HeartbeatHook,
    on_new_member: NewMemberHook,
    pre_remove: RemoveHook,
    post_remove: RemoveHook,
}

impl Default for HookSet {
    fn default() -> Self {
        HookSetBuilder::default().build()
    }
}

impl HookSet {
    pub fn builder() -> HookSetBuilder {
        HookSetBuilder::default()
    }

    /// Fatal to `StartAPI`.
    pub async fn pre_bootstrap(
        &self,
        state: Arc<dyn OrchestratorHandle>,
        cfg: InitConfig,
    ) -> KernelResult<()> {
        (self.pre_bootstrap)(state, cfg).await
    }

    /// Fatal to `StartAPI`.
    pub async fn post_bootstrap(
        &self,
        state: Arc<dyn OrchestratorHandle>,
        cfg: InitConfig,
    ) -> KernelResult<()> {
        (self.post_bootstrap)(state, cfg).await
    }

    /// Fatal to `StartAPI`.
    pub async fn pre_join(
        &self,
        state: Arc<dyn OrchestratorHandle>,
        cfg: InitConfig,
    ) -> KernelResult<()> {
        (self.pre_join)(state, cfg).await
    }

    /// Fatal to `StartAPI`.
    pub async fn post_join(
        &self,
        state: Arc<dyn OrchestratorHandle>,
        cfg: InitConfig,
    ) -> KernelResult<()> {
        (self.post_join)(state, cfg).await
    }

    /// Fatal to `Run`.
    pub async fn on_start(&self, state: Arc<dyn OrchestratorHandle>) -> KernelResult<()> {
        (self.on_start)(state).await
    }

    /// Logged, not fatal — errors never propagate past this call.
    pub async fn on_heartbeat(&self, state: Arc<dyn OrchestratorHandle>) {
        if let Err(e) = (self.on_heartbeat)(state).await {
            warn!("OnHeartbeat hook failed: {e}");
        }
    }

    /// Logged, not fatal.
    pub async fn on_new_member(&self, state: Arc<dyn OrchestratorHandle>, name: String) {
        if let Err(e) = (self.on_new_member)(state, name).await {
            warn!("OnNewMember hook failed: {e}");
        }
    }

    /// Fatal to the removal operation.
    pub async fn pre_remove(
        &self,
        state: Arc<dyn OrchestratorHandle>,
        force: bool,
    ) -> KernelResult<()> {
        (self.pre_remove)(state, force).await
    }

    /// Fatal to the removal operation.
    pub async fn post_remove(
        &self,
        state: Arc<dyn OrchestratorHandle>,
        force: bool,
    ) -> KernelResult<()> {
        (self.post_remove)(state, force).await
    }
}
