//! The container proxy event loop.
//!
//! One proxy owns one container. Commands from the pool arrive on a bounded
//! channel; every container operation, publish, and timer runs as a spawned
//! task whose completion is posted back as an internal event. The loop
//! itself never awaits anything but its two channels, so a proxy stays
//! responsive to `Remove` and timeouts while activations are in flight.
//!
//! No failure leaves this module as an error: every fault is translated
//! into the right ack/store effect and pool signal, then drives the state
//! machine.

use chrono::Duration as ChronoDuration;
use cinder_common::{
    annotation, ActionSpec, ActivationMessage, ActivationRecord, ActivationResponse, Annotations,
    Clock, Interval, TransactionId,
};
use cinder_container::{
    partition_arguments, ContainerFactory, ContainerOps, LogCollectError, LogCollector, OpsError,
    RunEnv,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ProxyConfig;
use crate::counter::SharedCounter;
use crate::data::{ContainerData, ProxyState};
use crate::protocol::{PoolSignal, ProxyCommand, RunJob};
use crate::publish::{Acknowledgment, ActivationAcker, ActivationStore};
use crate::timer::SingleShotTimer;

const COMMAND_BUFFER: usize = 16;
const EVENT_BUFFER: usize = 64;

/// The collaborators a proxy drives.
#[derive(Clone)]
pub struct ProxyDeps {
    pub factory: Arc<dyn ContainerFactory>,
    pub acker: Arc<dyn ActivationAcker>,
    pub store: Arc<dyn ActivationStore>,
    pub log_collector: Arc<dyn LogCollector>,
    pub counter: Arc<dyn SharedCounter>,
    pub clock: Arc<dyn Clock>,
}

/// Errors surfaced to users of a [`ProxyHandle`].
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The proxy task has terminated and takes no more commands.
    #[error("the proxy is gone")]
    Closed,
}

/// Handle the pool holds on one proxy.
pub struct ProxyHandle {
    commands: mpsc::Sender<ProxyCommand>,
    /// The proxy's event loop task; completes when the proxy terminates.
    pub task: JoinHandle<()>,
}

impl ProxyHandle {
    /// Prewarm a container of the given runtime kind.
    pub async fn start(&self, kind: impl Into<String>, memory_mb: u32) -> Result<(), ProxyError> {
        self.send(ProxyCommand::Start {
            kind: kind.into(),
            memory_mb,
        })
        .await
    }

    /// Route one activation to this proxy.
    pub async fn run(&self, job: RunJob) -> Result<(), ProxyError> {
        self.send(ProxyCommand::Run(job)).await
    }

    /// Ask the proxy to give its container up.
    pub async fn remove(&self) -> Result<(), ProxyError> {
        self.send(ProxyCommand::Remove).await
    }

    pub async fn send(&self, command: ProxyCommand) -> Result<(), ProxyError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ProxyError::Closed)
    }
}

/// Internal events: command-channel input is interleaved with completions
/// of the tasks the proxy spawned.
enum ProxyEvent {
    PrewarmReady {
        result: Result<Arc<dyn ContainerOps>, OpsError>,
        kind: String,
        memory_mb: u32,
    },
    /// A cold start obtained its container (before initialization).
    ContainerObtained { ops: Arc<dyn ContainerOps> },
    /// Initialization succeeded; reusable warm data can be established.
    WarmedEstablished { ops: Arc<dyn ContainerOps> },
    JobDone { disposition: JobDisposition },
    SuspendDone { result: Result<(), OpsError> },
    ResumeDone {
        result: Result<(), OpsError>,
        job: Box<RunJob>,
    },
    DestroyDone,
    StateTimeout { generation: u64 },
}

/// How one activation left the container behind.
enum JobDisposition {
    /// Success or application error: the container is reusable.
    Reusable,
    /// Initialization rejected the action; the container is forfeit.
    FatalInit,
    /// The run failed at the container level; forfeit.
    FatalRun,
    /// Log collection failed; forfeit.
    FatalLogs,
    /// No container was ever obtained.
    NoContainer,
}

/// Where an activation gets its container from.
enum JobSource {
    /// Create one first (cold start).
    Fresh { factory: Arc<dyn ContainerFactory> },
    /// Use the container the proxy holds.
    Warm {
        ops: Arc<dyn ContainerOps>,
        needs_init: bool,
    },
}

enum Step {
    Event(ProxyEvent),
    Command(ProxyCommand),
    CommandsClosed,
    EventsClosed,
}

/// The per-container state machine.
pub struct ContainerProxy {
    deps: ProxyDeps,
    config: ProxyConfig,
    pool: mpsc::UnboundedSender<PoolSignal>,
    commands_rx: mpsc::Receiver<ProxyCommand>,
    events_tx: mpsc::Sender<ProxyEvent>,
    events_rx: mpsc::Receiver<ProxyEvent>,
    state: ProxyState,
    data: ContainerData,
    stashed: VecDeque<RunJob>,
    timer: SingleShotTimer,
    /// `Remove` arrived while work was in flight; honored on the last
    /// completion.
    removal_requested: bool,
    resume_pending: bool,
    /// Destroy finished while completions were still outstanding.
    destroy_complete: bool,
    commands_closed: bool,
    terminating: bool,
}

impl ContainerProxy {
    /// Spawn a proxy task. Signals flow to `pool`; the returned handle
    /// feeds it commands.
    pub fn spawn(
        deps: ProxyDeps,
        config: ProxyConfig,
        pool: mpsc::UnboundedSender<PoolSignal>,
    ) -> ProxyHandle {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let proxy = Self {
            deps,
            config,
            pool,
            commands_rx,
            events_tx,
            events_rx,
            state: ProxyState::Uninitialized,
            data: ContainerData::None,
            stashed: VecDeque::new(),
            timer: SingleShotTimer::new(),
            removal_requested: false,
            resume_pending: false,
            destroy_complete: false,
            commands_closed: false,
            terminating: false,
        };
        let task = tokio::spawn(proxy.run_loop());
        ProxyHandle { commands: commands_tx, task }
    }

    async fn run_loop(mut self) {
        loop {
            let step = tokio::select! {
                biased;
                event = self.events_rx.recv() => match event {
                    Some(event) => Step::Event(event),
                    None => Step::EventsClosed,
                },
                command = self.commands_rx.recv(), if !self.commands_closed => match command {
                    Some(command) => Step::Command(command),
                    None => Step::CommandsClosed,
                },
            };
            match step {
                Step::Event(event) => self.on_event(event),
                Step::Command(command) => self.on_command(command),
                Step::CommandsClosed => {
                    // The pool dropped its handle; the container must not
                    // outlive it.
                    self.commands_closed = true;
                    self.on_remove();
                }
                Step::EventsClosed => break,
            }
            if self.terminating {
                break;
            }
        }
        tracing::debug!(state = %self.state, "Proxy terminated");
    }

    fn on_command(&mut self, command: ProxyCommand) {
        match command {
            ProxyCommand::Start { kind, memory_mb } => {
                if self.state == ProxyState::Uninitialized {
                    self.start_prewarm(kind, memory_mb);
                } else {
                    tracing::warn!(state = %self.state, "Ignoring Start outside uninitialized state");
                }
            }
            ProxyCommand::Run(job) => self.on_run(job),
            ProxyCommand::Remove => self.on_remove(),
        }
    }

    fn on_run(&mut self, job: RunJob) {
        match self.state {
            ProxyState::Uninitialized => self.accept_cold(job),
            ProxyState::Started => self.accept_prewarmed(job),
            ProxyState::Ready => self.accept_from_ready(job),
            ProxyState::Running => self.accept_while_running(job),
            ProxyState::Paused => self.accept_from_paused(job),
            ProxyState::Pausing => {
                // Replayed once the suspend settles.
                self.stashed.push_back(job);
            }
            ProxyState::Starting | ProxyState::Removing => {
                tracing::info!(
                    state = %self.state,
                    txn = %job.message.transid,
                    "Cannot honor run, returning it to the pool"
                );
                self.signal(PoolSignal::RescheduleJob { job: Some(job) });
            }
        }
    }

    fn on_remove(&mut self) {
        match self.state {
            ProxyState::Running | ProxyState::Pausing | ProxyState::Starting => {
                tracing::debug!(state = %self.state, "Deferring removal until in-flight work settles");
                self.removal_requested = true;
            }
            ProxyState::Removing => {}
            _ => self.begin_destroy(),
        }
    }

    fn on_event(&mut self, event: ProxyEvent) {
        match event {
            ProxyEvent::PrewarmReady {
                result,
                kind,
                memory_mb,
            } => self.on_prewarm_ready(result, kind, memory_mb),
            ProxyEvent::ContainerObtained { ops } => self.on_container_obtained(ops),
            ProxyEvent::WarmedEstablished { ops } => self.on_warmed(ops),
            ProxyEvent::JobDone { disposition } => self.on_job_done(disposition),
            ProxyEvent::SuspendDone { result } => self.on_suspend_done(result),
            ProxyEvent::ResumeDone { result, job } => self.on_resume_done(result, *job),
            ProxyEvent::DestroyDone => self.on_destroy_done(),
            ProxyEvent::StateTimeout { generation } => self.on_state_timeout(generation),
        }
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    fn accept_cold(&mut self, job: RunJob) {
        let now = self.deps.clock.now();
        tracing::info!(
            txn = %job.message.transid,
            activation_id = %job.message.activation_id,
            action = %job.action.fully_qualified_name(),
            "Accepted cold run"
        );
        self.data = ContainerData::WarmingCold {
            action: Arc::clone(&job.action),
            invocation_namespace: job.message.user.namespace.clone(),
            last_used: now,
            active: 1,
        };
        self.deps.counter.increment(&job.message.user.namespace);
        self.transition(ProxyState::Running);
        let factory = Arc::clone(&self.deps.factory);
        self.spawn_job(job, JobSource::Fresh { factory });
    }

    fn accept_prewarmed(&mut self, job: RunJob) {
        let ops = match self.data.ops() {
            Some(ops) => ops,
            None => {
                self.signal(PoolSignal::RescheduleJob { job: Some(job) });
                return;
            }
        };
        let now = self.deps.clock.now();
        tracing::info!(
            txn = %job.message.transid,
            activation_id = %job.message.activation_id,
            container_id = %ops.id(),
            action = %job.action.fully_qualified_name(),
            "Binding prewarmed container"
        );
        self.data = ContainerData::Warming {
            ops: Arc::clone(&ops),
            action: Arc::clone(&job.action),
            invocation_namespace: job.message.user.namespace.clone(),
            last_used: now,
            active: 1,
        };
        self.deps.counter.increment(&job.message.user.namespace);
        self.transition(ProxyState::Running);
        self.spawn_job(
            job,
            JobSource::Warm {
                ops,
                needs_init: true,
            },
        );
    }

    fn accept_from_ready(&mut self, job: RunJob) {
        if self.data.active() >= self.concurrency_limit() {
            self.stashed.push_back(job);
            return;
        }
        self.timer.cancel();
        self.transition(ProxyState::Running);
        self.start_warm_run(job);
    }

    fn accept_while_running(&mut self, job: RunJob) {
        if self.removal_requested {
            self.signal(PoolSignal::RescheduleJob { job: Some(job) });
            return;
        }
        if self.data.is_warmed() && self.data.active() < self.concurrency_limit() {
            self.start_warm_run(job);
        } else {
            tracing::debug!(
                txn = %job.message.transid,
                stashed = self.stashed.len() + 1,
                "Stashing run until the container is warmed and has capacity"
            );
            self.stashed.push_back(job);
        }
    }

    fn accept_from_paused(&mut self, job: RunJob) {
        if self.resume_pending {
            self.stashed.push_back(job);
            return;
        }
        let ops = match self.data.ops() {
            Some(ops) => ops,
            None => {
                self.signal(PoolSignal::RescheduleJob { job: Some(job) });
                return;
            }
        };
        self.timer.cancel();
        self.resume_pending = true;
        tracing::info!(
            txn = %job.message.transid,
            container_id = %ops.id(),
            "Resuming paused container for run"
        );
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = ops.resume().await;
            let _ = events
                .send(ProxyEvent::ResumeDone {
                    result,
                    job: Box::new(job),
                })
                .await;
        });
    }

    /// Start one activation on the warm container the proxy holds.
    fn start_warm_run(&mut self, job: RunJob) {
        let ops = match self.data.ops() {
            Some(ops) => ops,
            None => {
                self.signal(PoolSignal::RescheduleJob { job: Some(job) });
                return;
            }
        };
        self.data.increment_active();
        self.data.touch(self.deps.clock.now());
        self.deps.counter.increment(&job.message.user.namespace);
        tracing::info!(
            txn = %job.message.transid,
            activation_id = %job.message.activation_id,
            active = self.data.active(),
            "Accepted warm run"
        );
        self.spawn_job(
            job,
            JobSource::Warm {
                ops,
                needs_init: false,
            },
        );
    }

    /// Start stashed runs, oldest first, up to the concurrency limit.
    fn replay_stashed(&mut self) {
        if self.removal_requested {
            return;
        }
        while self.data.is_warmed()
            && self.data.active() < self.concurrency_limit()
            && !self.stashed.is_empty()
        {
            if let Some(job) = self.stashed.pop_front() {
                self.start_warm_run(job);
            }
        }
    }

    fn concurrency_limit(&self) -> u32 {
        self.data
            .action()
            .map(|action| action.limits.concurrency.max(1))
            .unwrap_or(1)
    }

    // ------------------------------------------------------------------
    // Completions
    // ------------------------------------------------------------------

    fn on_prewarm_ready(
        &mut self,
        result: Result<Arc<dyn ContainerOps>, OpsError>,
        kind: String,
        memory_mb: u32,
    ) {
        if self.state != ProxyState::Starting {
            // Raced a removal; do not leak the fresh container.
            if let Ok(ops) = result {
                tokio::spawn(async move {
                    let _ = ops.destroy().await;
                });
            }
            return;
        }
        match result {
            Ok(ops) => {
                tracing::info!(container_id = %ops.id(), kind = %kind, "Prewarm container ready");
                self.data = ContainerData::PreWarmed {
                    ops,
                    kind,
                    memory_mb,
                };
                if self.removal_requested {
                    self.state = ProxyState::Started;
                    self.begin_destroy();
                    return;
                }
                let from = self.state;
                self.state = ProxyState::Started;
                self.signal(PoolSignal::NeedWork(self.data.clone()));
                self.signal(PoolSignal::Transition {
                    from,
                    to: ProxyState::Started,
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "Prewarm container creation failed");
                self.signal(PoolSignal::ContainerRemoved);
                self.terminating = true;
            }
        }
    }

    fn on_container_obtained(&mut self, ops: Arc<dyn ContainerOps>) {
        let replacement = match &self.data {
            ContainerData::WarmingCold {
                action,
                invocation_namespace,
                last_used,
                active,
            } => Some(ContainerData::Warming {
                ops,
                action: Arc::clone(action),
                invocation_namespace: invocation_namespace.clone(),
                last_used: *last_used,
                active: *active,
            }),
            _ => None,
        };
        if let Some(data) = replacement {
            self.data = data;
        }
    }

    fn on_warmed(&mut self, ops: Arc<dyn ContainerOps>) {
        if self.state != ProxyState::Running {
            return;
        }
        let now = self.deps.clock.now();
        let replacement = match &self.data {
            ContainerData::Warming {
                action,
                invocation_namespace,
                active,
                ..
            }
            | ContainerData::WarmingCold {
                action,
                invocation_namespace,
                active,
                ..
            } => Some(ContainerData::Warmed {
                ops,
                action: Arc::clone(action),
                invocation_namespace: invocation_namespace.clone(),
                last_used: now,
                active: *active,
            }),
            _ => None,
        };
        match replacement {
            Some(data) => self.data = data,
            None => return,
        }
        self.replay_stashed();
        if !self.removal_requested && self.data.active() < self.concurrency_limit() {
            self.signal(PoolSignal::NeedWork(self.data.clone()));
        }
    }

    fn on_job_done(&mut self, disposition: JobDisposition) {
        if let Some(namespace) = self.data.invocation_namespace() {
            self.deps.counter.decrement(namespace);
        }
        self.data.decrement_active();
        self.data.touch(self.deps.clock.now());

        if self.state == ProxyState::Removing {
            if self.destroy_complete && self.data.active() == 0 {
                self.terminating = true;
            }
            return;
        }

        match disposition {
            JobDisposition::Reusable => {
                if self.removal_requested {
                    if self.data.active() == 0 {
                        // Deferred removal: skip the pause grace entirely.
                        self.begin_destroy();
                    }
                    return;
                }
                self.replay_stashed();
                if self.data.active() == 0 && self.stashed.is_empty() {
                    self.enter_ready();
                } else if self.data.active() < self.concurrency_limit() {
                    self.signal(PoolSignal::NeedWork(self.data.clone()));
                }
            }
            JobDisposition::FatalInit
            | JobDisposition::FatalRun
            | JobDisposition::FatalLogs
            | JobDisposition::NoContainer => {
                self.begin_destroy();
            }
        }
    }

    fn on_suspend_done(&mut self, result: Result<(), OpsError>) {
        if self.state != ProxyState::Pausing {
            return;
        }
        match result {
            Ok(()) => {
                self.transition(ProxyState::Paused);
                if self.removal_requested {
                    self.begin_destroy();
                    return;
                }
                if !self.stashed.is_empty() {
                    // A run arrived while suspending; bring the container
                    // right back.
                    if let Some(job) = self.stashed.pop_front() {
                        self.accept_from_paused(job);
                    }
                    return;
                }
                let events = self.events_tx.clone();
                self.timer
                    .arm(self.config.unused_timeout(), events, |generation| {
                        ProxyEvent::StateTimeout { generation }
                    });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Suspend failed, removing container");
                self.begin_destroy();
            }
        }
    }

    fn on_resume_done(&mut self, result: Result<(), OpsError>, job: RunJob) {
        self.resume_pending = false;
        if self.state != ProxyState::Paused {
            // Removal won the race; hand the job back.
            self.signal(PoolSignal::RescheduleJob { job: Some(job) });
            return;
        }
        match result {
            Ok(()) => {
                self.transition(ProxyState::Running);
                self.start_warm_run(job);
                self.replay_stashed();
            }
            Err(e) => {
                tracing::warn!(
                    txn = %job.message.transid,
                    error = %e,
                    "Resume failed, rescheduling run and removing container"
                );
                self.signal(PoolSignal::RescheduleJob { job: Some(job) });
                self.begin_destroy();
            }
        }
    }

    fn on_destroy_done(&mut self) {
        if self.data.active() == 0 {
            self.terminating = true;
        } else {
            self.destroy_complete = true;
        }
    }

    fn on_state_timeout(&mut self, generation: u64) {
        if !self.timer.is_current(generation) {
            return;
        }
        match self.state {
            ProxyState::Ready if self.data.active() == 0 => {
                self.transition(ProxyState::Pausing);
                self.start_suspend();
            }
            ProxyState::Paused => {
                tracing::info!("Paused container idle too long, removing");
                // The pool may have routed a run here concurrently; tell it
                // to revisit that decision.
                self.signal(PoolSignal::RescheduleJob { job: None });
                self.begin_destroy();
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------

    fn start_prewarm(&mut self, kind: String, memory_mb: u32) {
        self.data = ContainerData::Resources { memory_mb };
        self.transition(ProxyState::Starting);
        let factory = Arc::clone(&self.deps.factory);
        let events = self.events_tx.clone();
        let txn = TransactionId::new();
        tokio::spawn(async move {
            let result = factory.create(&txn, &kind, memory_mb).await;
            let _ = events
                .send(ProxyEvent::PrewarmReady {
                    result,
                    kind,
                    memory_mb,
                })
                .await;
        });
    }

    fn start_suspend(&mut self) {
        let ops = match self.data.ops() {
            Some(ops) => ops,
            None => {
                self.begin_destroy();
                return;
            }
        };
        tracing::info!(container_id = %ops.id(), "Suspending idle container");
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = ops.suspend().await;
            let _ = events.send(ProxyEvent::SuspendDone { result }).await;
        });
    }

    /// Commit to removal: bounce stashed work, announce, destroy.
    ///
    /// Callers guarantee this runs at most once per proxy (the `Removing`
    /// check makes it idempotent regardless).
    fn begin_destroy(&mut self) {
        if self.state == ProxyState::Removing {
            return;
        }
        self.timer.cancel();
        while let Some(job) = self.stashed.pop_front() {
            self.signal(PoolSignal::RescheduleJob { job: Some(job) });
        }
        let from = self.state;
        self.state = ProxyState::Removing;
        tracing::info!(from = %from, data = ?self.data, "Removing container");
        self.signal(PoolSignal::Transition {
            from,
            to: ProxyState::Removing,
        });
        self.signal(PoolSignal::ContainerRemoved);
        match self.data.ops() {
            Some(ops) => {
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = ops.destroy().await {
                        tracing::warn!(container_id = %ops.id(), error = %e, "Destroy failed");
                    }
                    let _ = events.send(ProxyEvent::DestroyDone).await;
                });
            }
            None => {
                if self.data.active() == 0 {
                    self.terminating = true;
                } else {
                    self.destroy_complete = true;
                }
            }
        }
    }

    /// Enter `Ready`: offer the warm container to the pool, then announce
    /// the transition and start the idle clock.
    fn enter_ready(&mut self) {
        let from = self.state;
        self.state = ProxyState::Ready;
        self.signal(PoolSignal::NeedWork(self.data.clone()));
        self.signal(PoolSignal::Transition {
            from,
            to: ProxyState::Ready,
        });
        let events = self.events_tx.clone();
        self.timer
            .arm(self.config.pause_grace(), events, |generation| {
                ProxyEvent::StateTimeout { generation }
            });
    }

    fn transition(&mut self, to: ProxyState) {
        let from = self.state;
        self.state = to;
        tracing::debug!(from = %from, to = %to, "Proxy transition");
        self.signal(PoolSignal::Transition { from, to });
    }

    fn signal(&self, signal: PoolSignal) {
        if self.pool.send(signal).is_err() {
            tracing::debug!("Pool receiver gone, dropping signal");
        }
    }

    fn spawn_job(&self, job: RunJob, source: JobSource) {
        let runtime = JobRuntime {
            acker: Arc::clone(&self.deps.acker),
            store: Arc::clone(&self.deps.store),
            log_collector: Arc::clone(&self.deps.log_collector),
            clock: Arc::clone(&self.deps.clock),
            config: self.config.clone(),
            events: self.events_tx.clone(),
        };
        tokio::spawn(execute_job(runtime, job, source));
    }
}

/// Everything one activation pipeline needs, detached from the proxy.
#[derive(Clone)]
struct JobRuntime {
    acker: Arc<dyn ActivationAcker>,
    store: Arc<dyn ActivationStore>,
    log_collector: Arc<dyn LogCollector>,
    clock: Arc<dyn Clock>,
    config: ProxyConfig,
    events: mpsc::Sender<ProxyEvent>,
}

impl JobRuntime {
    async fn finish(&self, disposition: JobDisposition) {
        let _ = self
            .events
            .send(ProxyEvent::JobDone { disposition })
            .await;
    }
}

/// Run one activation end to end: obtain the container, initialize if
/// needed, run, collect logs, ack, store. Exactly one ack is published per
/// call, whatever happens.
async fn execute_job(rt: JobRuntime, job: RunJob, source: JobSource) {
    let RunJob { action, message } = job;
    let limits = &action.limits;
    let timeout = limits.timeout();
    let concurrency = limits.concurrency;

    // Obtain the container.
    let (ops, needs_init) = match source {
        JobSource::Warm { ops, needs_init } => (ops, needs_init),
        JobSource::Fresh { factory } => {
            match factory
                .create(&message.transid, &action.kind, limits.memory_mb)
                .await
            {
                Ok(ops) => {
                    let _ = rt
                        .events
                        .send(ProxyEvent::ContainerObtained {
                            ops: Arc::clone(&ops),
                        })
                        .await;
                    (ops, true)
                }
                Err(e) => {
                    tracing::error!(txn = %message.transid, error = %e, "Container creation failed");
                    let record = build_record(
                        &rt,
                        &action,
                        &message,
                        None,
                        None,
                        ActivationResponse::platform_error(format!(
                            "failed to obtain a container: {e}"
                        )),
                        Vec::new(),
                    );
                    publish(&rt, &action, &message, &record).await;
                    rt.finish(JobDisposition::NoContainer).await;
                    return;
                }
            }
        }
    };

    // Initialize, on cold starts.
    let mut init_interval = None;
    if needs_init {
        match ops
            .initialize(action.init_payload(), timeout, concurrency)
            .await
        {
            Ok(interval) => {
                let _ = rt
                    .events
                    .send(ProxyEvent::WarmedEstablished {
                        ops: Arc::clone(&ops),
                    })
                    .await;
                init_interval = Some(interval);
            }
            Err(OpsError::Initialization { interval, response }) => {
                tracing::warn!(
                    txn = %message.transid,
                    kind = %response.kind,
                    "Initialization rejected the action"
                );
                let record = build_record(
                    &rt,
                    &action,
                    &message,
                    Some(interval),
                    None,
                    response,
                    Vec::new(),
                );
                publish(&rt, &action, &message, &record).await;
                rt.finish(JobDisposition::FatalInit).await;
                return;
            }
            Err(e) => {
                tracing::error!(txn = %message.transid, error = %e, "Initialization failed");
                let now = rt.clock.now();
                let record = build_record(
                    &rt,
                    &action,
                    &message,
                    Some(Interval::point(now)),
                    None,
                    ActivationResponse::platform_error(e.to_string()),
                    Vec::new(),
                );
                publish(&rt, &action, &message, &record).await;
                rt.finish(JobDisposition::FatalInit).await;
                return;
            }
        }
    }

    // Run.
    let args = message
        .content
        .as_ref()
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let (env_args, params) = partition_arguments(&args);
    let deadline = rt.clock.now() + ChronoDuration::milliseconds(limits.timeout_ms as i64);
    let mut env = RunEnv::new(&action, &message, deadline).build();
    if let Value::Object(map) = &mut env {
        map.extend(env_args);
    }

    match ops.run(Value::Object(params), env, timeout, concurrency).await {
        Ok((run_interval, response)) => {
            let mut record = build_record(
                &rt,
                &action,
                &message,
                init_interval,
                Some(run_interval),
                response,
                Vec::new(),
            );
            let mut disposition = JobDisposition::Reusable;
            if limits.log_limit_bytes > 0 {
                match rt
                    .log_collector
                    .collect(&message.transid, &message.user, &record, ops.as_ref(), &action)
                    .await
                {
                    Ok(logs) => record.logs = logs.into_lines(),
                    Err(LogCollectError::Partial { logs, reason }) => {
                        tracing::warn!(
                            txn = %message.transid,
                            reason = %reason,
                            "Partial log collection, container is forfeit"
                        );
                        record.logs = logs;
                        disposition = JobDisposition::FatalLogs;
                    }
                    Err(LogCollectError::Terminal(reason)) => {
                        tracing::warn!(
                            txn = %message.transid,
                            reason = %reason,
                            "Log collection failed, container is forfeit"
                        );
                        disposition = JobDisposition::FatalLogs;
                    }
                }
            }
            publish(&rt, &action, &message, &record).await;
            rt.finish(disposition).await;
        }
        Err(e) => {
            tracing::error!(txn = %message.transid, error = %e, "Run failed, container is forfeit");
            let response = match &e {
                OpsError::Timeout { after, .. } => ActivationResponse::developer_error(format!(
                    "the action exceeded its time limit of {} milliseconds",
                    after.as_millis()
                )),
                other => ActivationResponse::platform_error(other.to_string()),
            };
            let now = rt.clock.now();
            let record = build_record(
                &rt,
                &action,
                &message,
                init_interval,
                Some(Interval::point(now)),
                response,
                Vec::new(),
            );
            publish(&rt, &action, &message, &record).await;
            rt.finish(JobDisposition::FatalRun).await;
        }
    }
}

/// Assemble the activation record with its timing annotations.
///
/// The accounting laws: `waitTime` spans request arrival to the start of
/// init (cold) or run (warm); `initTime` exists only when an init interval
/// does; billed duration is init + run for cold starts, run alone for warm.
fn build_record(
    rt: &JobRuntime,
    action: &ActionSpec,
    message: &ActivationMessage,
    init: Option<Interval>,
    run: Option<Interval>,
    response: ActivationResponse,
    logs: Vec<String>,
) -> ActivationRecord {
    let arrived = message.transid.started();
    let now = rt.clock.now();
    let (start, end) = match (init, run) {
        (Some(init), Some(run)) => (init.start, run.end),
        (Some(init), None) => (init.start, init.end),
        (None, Some(run)) => (run.start, run.end),
        (None, None) => (now, now),
    };
    let duration_ms = init.map(|i| i.duration_ms()).unwrap_or(0)
        + run.map(|r| r.duration_ms()).unwrap_or(0);

    let mut annotations = Annotations::new();
    annotations.set(annotation::PATH, action.fully_qualified_name());
    annotations.set(annotation::KIND, action.kind.clone());
    annotations.set(
        annotation::LIMITS,
        serde_json::to_value(&action.limits).unwrap_or(Value::Null),
    );
    let first_work = init
        .map(|i| i.start)
        .or(run.map(|r| r.start))
        .unwrap_or(now);
    annotations.set(
        annotation::WAIT_TIME,
        (first_work - arrived).num_milliseconds().max(0),
    );
    if let Some(init) = init {
        annotations.set(annotation::INIT_TIME, init.duration_ms());
    }

    ActivationRecord {
        namespace: message.user.namespace.clone(),
        name: action.name.clone(),
        activation_id: message.activation_id,
        start,
        end,
        duration_ms,
        response,
        logs,
        annotations,
    }
}

/// Ack, then store. The ack happens exactly once and always first; both are
/// bounded so a hung broker cannot wedge shutdown. Store is skipped when the
/// action collects no logs and the response rides inline in the ack.
async fn publish(
    rt: &JobRuntime,
    action: &ActionSpec,
    message: &ActivationMessage,
    record: &ActivationRecord,
) {
    let acknowledgment = if message.blocking {
        Acknowledgment::CombinedResult
    } else {
        Acknowledgment::Completion
    };
    let ack = rt.acker.ack(
        &message.transid,
        record,
        message.blocking,
        &message.controller,
        &message.user.user_id,
        acknowledgment,
    );
    match tokio::time::timeout(rt.config.publish_timeout(), ack).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(txn = %message.transid, error = %e, "Failed to ack activation")
        }
        Err(_) => tracing::error!(txn = %message.transid, "Ack timed out"),
    }

    let skip_store = action.limits.log_limit_bytes == 0
        && record.response.result_size() <= rt.config.inline_response_limit;
    if skip_store {
        tracing::debug!(txn = %message.transid, "Response rides inline, skipping store");
        return;
    }
    match tokio::time::timeout(
        rt.config.publish_timeout(),
        rt.store.store(&message.transid, record, &message.user),
    )
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(txn = %message.transid, error = %e, "Failed to store activation")
        }
        Err(_) => tracing::error!(txn = %message.transid, "Activation store timed out"),
    }
}
