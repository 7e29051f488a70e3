use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use sift_ai::LlmClient;
use sift_chat::{ChatClient, ChatEvent, ChatTarget, InboundMessage, NameResolver};
use sift_config::{InstanceSpec, MonitorConfig};
use sift_store::{MessageOutcome, StatsStore, TraceStore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::evaluator::PromptEvaluator;
use crate::feedback::ReactionFeedbackTracker;
use crate::forwarding::ForwardingEngine;
use crate::instance::Instance;
use crate::observe::TraceSink;
use crate::policy::{Decision, MatchPolicy};
use crate::registry::{hydrate_prompts, PromptRegistry};
use crate::resolver::ChatIdResolver;
use crate::state::{SharedStats, SharedTraces};

/// Delay before re-polling the transport after an event-stream error.
const EVENT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Everything the monitor runtime needs, with capabilities injected as trait
/// objects so tests and alternative transports can swap them.
pub struct MonitorRuntimeConfig {
    pub chat: Arc<dyn ChatClient>,
    pub llm: Option<Arc<dyn LlmClient>>,
    pub registry: Arc<dyn PromptRegistry>,
    pub sink: Arc<dyn TraceSink>,
    pub config: MonitorConfig,
    pub config_path: PathBuf,
}

/// Owns the instance set and drives the single dispatch loop: inbound
/// messages through MatchPolicy and the ForwardingEngine, reaction updates
/// through the feedback tracker, with periodic rescans in the background.
pub struct Monitor {
    chat: Arc<dyn ChatClient>,
    names: Arc<NameResolver>,
    policy: MatchPolicy,
    engine: ForwardingEngine,
    tracker: ReactionFeedbackTracker,
    resolver: ChatIdResolver,
    registry: Arc<dyn PromptRegistry>,
    stats: SharedStats,
    traces: SharedTraces,
    instances: Arc<RwLock<Vec<Instance>>>,
    ignore_usernames: HashSet<String>,
    ignore_user_ids: HashSet<i64>,
    config_path: PathBuf,
    rescan_interval: Duration,
}

impl Monitor {
    pub fn new(runtime: MonitorRuntimeConfig) -> Self {
        let names = Arc::new(NameResolver::new(runtime.chat.clone()));
        let stats = SharedStats::new(StatsStore::load(
            runtime.config.stats_path(),
            runtime.config.flush_interval(),
        ));
        let traces = SharedTraces::new(TraceStore::load(
            runtime.config.trace_path(),
            runtime.config.flush_interval(),
        ));
        let evaluator = PromptEvaluator::new(
            runtime.llm.clone(),
            runtime.config.openai_model.clone(),
            stats.clone(),
            runtime.sink.clone(),
        );
        let instances: Vec<Instance> = runtime
            .config
            .effective_instances()
            .into_iter()
            .map(Instance::from_spec)
            .collect();

        Self {
            policy: MatchPolicy::new(evaluator),
            engine: ForwardingEngine::new(runtime.chat.clone(), names.clone()),
            tracker: ReactionFeedbackTracker::new(runtime.chat.clone(), names.clone()),
            resolver: ChatIdResolver::new(runtime.chat.clone(), names.clone()),
            registry: runtime.registry,
            chat: runtime.chat,
            names,
            stats,
            traces,
            instances: Arc::new(RwLock::new(instances)),
            ignore_usernames: runtime
                .config
                .ignore_usernames
                .iter()
                .map(|username| username.to_lowercase())
                .collect(),
            ignore_user_ids: runtime.config.ignore_user_ids.iter().copied().collect(),
            config_path: runtime.config_path,
            rescan_interval: runtime.config.rescan_interval(),
        }
    }

    pub fn stats(&self) -> &SharedStats {
        &self.stats
    }

    pub fn traces(&self) -> &SharedTraces {
        &self.traces
    }

    pub fn instance_snapshot(&self) -> Vec<Instance> {
        self.instances
            .read()
            .map(|instances| instances.clone())
            .unwrap_or_default()
    }

    /// Runs until ctrl-c. The initial hydration/resolution pass completes
    /// before the first event is handled.
    pub async fn run(&self) -> Result<()> {
        refresh_instances(
            &self.resolver,
            self.registry.as_ref(),
            &self.instances,
            None,
            true,
        )
        .await;
        let rescan = self.spawn_rescan_loop();
        let result = self.event_loop().await;
        rescan.abort();
        self.stats
            .flush()
            .context("failed to flush stats at shutdown")?;
        self.traces
            .flush()
            .context("failed to flush traces at shutdown")?;
        result
    }

    async fn event_loop(&self) -> Result<()> {
        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    if let Err(error) = signal {
                        error!(%error, "failed to listen for shutdown signal");
                    }
                    info!("shutdown requested");
                    return Ok(());
                }
                event = self.chat.next_event() => match event {
                    Ok(event) => self.handle_event(event).await,
                    Err(error) => {
                        error!(%error, "event stream error");
                        tokio::time::sleep(EVENT_RETRY_DELAY).await;
                    }
                }
            }
        }
    }

    pub async fn handle_event(&self, event: ChatEvent) {
        match event {
            ChatEvent::Message(message) => self.handle_message(message).await,
            ChatEvent::Reactions(update) => {
                let snapshot = self.instance_snapshot();
                self.tracker.handle_reaction(&snapshot, &update).await;
            }
        }
    }

    async fn handle_message(&self, message: InboundMessage) {
        if let Some(sender) = &message.sender {
            if let Some(username) = sender.username.as_deref() {
                if self.ignore_usernames.contains(&username.to_lowercase()) {
                    debug!(username, "ignoring message from blocked sender");
                    return;
                }
            }
            if let Some(sender_id) = sender.id {
                if self.ignore_user_ids.contains(&sender_id) {
                    debug!(sender_id, "ignoring message from blocked sender");
                    return;
                }
            }
        }

        let matching: Vec<Instance> = self
            .instance_snapshot()
            .into_iter()
            .filter(|instance| instance.chat_ids.contains(&message.chat.id))
            .collect();
        for instance in &matching {
            self.process_message(instance, &message).await;
        }
    }

    async fn process_message(&self, instance: &Instance, message: &InboundMessage) {
        let chat_name = self
            .names
            .chat_name(&ChatTarget::Chat(message.chat.id), true)
            .await;
        let decision = self
            .policy
            .decide(instance, message.text.as_deref(), &chat_name)
            .await;
        match &decision {
            Decision::Dropped(reason) => debug!(
                message_id = message.id,
                instance = %instance.name,
                reason = reason.as_str(),
                "dropping message"
            ),
            Decision::ForwardWord(_) => {
                self.stats
                    .record_message(&instance.name, MessageOutcome::ForwardedByWord);
                self.engine.forward(instance, message, &decision).await;
            }
            Decision::ForwardPrompt(_) => {
                self.stats
                    .record_message(&instance.name, MessageOutcome::ForwardedByPrompt);
                self.engine.forward(instance, message, &decision).await;
            }
            Decision::NoMatch(best) => {
                self.stats
                    .record_message(&instance.name, MessageOutcome::NotForwarded);
                debug!(
                    message_id = message.id,
                    instance = %instance.name,
                    from = %chat_name,
                    best_score = best.as_ref().map(|best| best.score).unwrap_or(0),
                    "message not forwarded"
                );
            }
        }
    }

    /// Background loop: reload the config file, fold spec changes into the
    /// live instances, re-hydrate prompts, and refresh chat-id sets.
    fn spawn_rescan_loop(&self) -> JoinHandle<()> {
        let resolver = self.resolver.clone();
        let registry = self.registry.clone();
        let instances = self.instances.clone();
        let config_path = self.config_path.clone();
        let interval = self.rescan_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let specs = match sift_config::load_config(&config_path) {
                    Ok(config) => Some(config.effective_instances()),
                    Err(error) => {
                        error!(%error, "failed to reload config during rescan");
                        None
                    }
                };
                refresh_instances(&resolver, registry.as_ref(), &instances, specs, false).await;
            }
        })
    }
}

/// Refreshes every instance in turn; a failure in one instance never aborts
/// the others, and chat-id sets only ever grow.
async fn refresh_instances(
    resolver: &ChatIdResolver,
    registry: &dyn PromptRegistry,
    instances: &Arc<RwLock<Vec<Instance>>>,
    specs: Option<Vec<InstanceSpec>>,
    first_run: bool,
) {
    let snapshot: Vec<Instance> = match instances.read() {
        Ok(guard) => guard.clone(),
        Err(_) => {
            error!("instances lock is poisoned, skipping refresh");
            return;
        }
    };
    for mut instance in snapshot {
        if let Some(specs) = &specs {
            if let Some(spec) = specs.iter().find(|spec| spec.name == instance.name) {
                instance.apply_spec(spec.clone());
            }
        }
        hydrate_prompts(registry, &mut instance).await;
        resolver.refresh(&mut instance, first_run).await;
        match instances.write() {
            Ok(mut guard) => {
                if let Some(slot) = guard
                    .iter_mut()
                    .find(|candidate| candidate.name == instance.name)
                {
                    instance.chat_ids.extend(slot.chat_ids.iter().copied());
                    *slot = instance;
                }
            }
            Err(_) => error!("instances lock is poisoned, dropping refresh result"),
        }
    }
}

/// Convenience entry point mirroring the transport-runtime style used by the
/// CLI: build the monitor from injected capabilities and run it to
/// completion.
pub async fn run_monitor(runtime: MonitorRuntimeConfig) -> Result<()> {
    Monitor::new(runtime).run().await
}
