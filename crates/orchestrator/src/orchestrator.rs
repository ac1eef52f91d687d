use std::sync::Arc;

use action_flow::{ActionExecutor, MemoryRetriever, RecoveryManager};
use agent_core::{AgentError, AnalysisProvider, Goal, GoalAnalyzer, Plan, PlanGenerator, Step, TaskType};
use page_driver::{PageContextProvider, PageDriver};
use parking_lot::Mutex;
use state_verifier::{StateTable, StateVerifier};
use tabpilot_core_types::OriginId;
use tabpilot_event_bus::{EventRouter, TaskEvent};
use tabpilot_registry::{RegistryError, SessionRegistry};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::error::OrchestratorError;
use crate::model::{
    OrchestratorConfig, SessionStatus, StartReceipt, StatusSnapshot, StopOutcome, SweepSummary,
};
use crate::runner::Runner;

/// Owns every task session and the runners that drive them.
///
/// One runner task per running origin; runners for different origins share
/// only the registry and the event router.
pub struct SessionOrchestrator {
    registry: Arc<SessionRegistry>,
    events: Arc<EventRouter<TaskEvent>>,
    contexts: Arc<dyn PageContextProvider>,
    analyzer: GoalAnalyzer,
    planner: Arc<PlanGenerator>,
    executor: Arc<ActionExecutor>,
    provider: Option<Arc<dyn AnalysisProvider>>,
    config: OrchestratorConfig,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

pub struct OrchestratorBuilder {
    contexts: Arc<dyn PageContextProvider>,
    config: OrchestratorConfig,
    provider: Option<Arc<dyn AnalysisProvider>>,
    memory: Option<Arc<dyn MemoryRetriever>>,
    states: Option<Arc<StateTable>>,
    planner: Option<PlanGenerator>,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn AnalysisProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn memory(mut self, memory: Arc<dyn MemoryRetriever>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// State table shared with callers that register their own states
    pub fn states(mut self, states: Arc<StateTable>) -> Self {
        self.states = Some(states);
        self
    }

    /// Use a ready-made planner instead of loading templates from config
    pub fn planner(mut self, planner: PlanGenerator) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn build(self) -> Result<SessionOrchestrator, OrchestratorError> {
        let config = self.config;
        let planner = match self.planner {
            Some(planner) => planner,
            None => PlanGenerator::from_config(&config.planner)?,
        };
        let states = self
            .states
            .unwrap_or_else(|| Arc::new(StateTable::with_builtins()));
        let verifier = Arc::new(StateVerifier::new(states, config.execution.verifier_config()));

        let mut recovery = RecoveryManager::new(config.recovery, config.execution.extended_settle_ms);
        if let Some(provider) = &self.provider {
            recovery = recovery.with_provider(Arc::clone(provider));
        }
        let mut executor = ActionExecutor::new(verifier, recovery, config.execution);
        if let Some(memory) = self.memory {
            executor = executor.with_memory(memory);
        }

        Ok(SessionOrchestrator {
            registry: Arc::new(SessionRegistry::new()),
            events: Arc::new(EventRouter::new(config.event_capacity)),
            contexts: self.contexts,
            analyzer: GoalAnalyzer::new(),
            planner: Arc::new(planner),
            executor: Arc::new(executor),
            provider: self.provider,
            config,
            sweeper: Mutex::new(None),
        })
    }
}

impl SessionOrchestrator {
    pub fn builder(contexts: Arc<dyn PageContextProvider>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            contexts,
            config: OrchestratorConfig::default(),
            provider: None,
            memory: None,
            states: None,
            planner: None,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Plan `goal` for `origin` and spawn its runner.
    ///
    /// Fails with a session conflict while the origin already has a running
    /// task. An idle or finished session is reused with a new generation.
    #[instrument(skip(self, origin), fields(origin = %origin))]
    pub async fn start_task(
        &self,
        goal: &str,
        origin: &OriginId,
    ) -> Result<StartReceipt, OrchestratorError> {
        let text = goal.trim();
        if text.is_empty() {
            return Err(OrchestratorError::EmptyGoal);
        }
        // cheap early exit; the claim below is the authoritative check
        if self.registry.is_running(origin) {
            return Err(RegistryError::Conflict(origin.clone()).into());
        }

        let page = self.page_for(origin).await?;
        let goal = self.analyzer.analyze(text);
        let plan = self.plan_for(&goal, page.as_ref()).await;

        let claim = match self
            .registry
            .claim(origin, goal, plan, Arc::clone(&page))
        {
            Ok(claim) => claim,
            Err(err) => {
                self.return_unclaimed(origin, page).await;
                return Err(err.into());
            }
        };
        let (receipt, cancel) = {
            let session = claim.session.read();
            let receipt = StartReceipt {
                origin: origin.clone(),
                run_id: session.run_id.clone(),
                generation: session.generation,
                task_type: session.plan.task_type,
                plan: session.plan.clone(),
                created: claim.created,
            };
            (receipt, session.cancel.clone())
        };

        info!(
            run_id = %receipt.run_id,
            generation = receipt.generation,
            task_type = %receipt.task_type,
            steps = receipt.plan.len(),
            "task started"
        );
        self.events.publish(
            origin,
            TaskEvent::PlanCreated {
                origin: origin.clone(),
                run_id: receipt.run_id.clone(),
                generation: receipt.generation,
                task_type: receipt.task_type,
                title: receipt.plan.title.clone(),
                steps: receipt.plan.steps.iter().map(Step::describe).collect(),
            },
        );

        let runner = Runner {
            origin: origin.clone(),
            session: claim.session,
            page,
            cancel,
            executor: Arc::clone(&self.executor),
            planner: Arc::clone(&self.planner),
            provider: self.provider.clone(),
            events: Arc::clone(&self.events),
            recovery: self.config.recovery,
            replan_on_failure: self.config.planner.replan_on_failure,
        };
        tokio::spawn(runner.run());
        Ok(receipt)
    }

    /// Request cancellation; the runner stops at the next step boundary
    pub fn stop_task(&self, origin: &OriginId) -> Result<StopOutcome, OrchestratorError> {
        let Some(session) = self.registry.get(origin) else {
            return Ok(StopOutcome::NotFound);
        };
        let mut session = session.write();
        if !session.is_running() {
            return Ok(StopOutcome::NotRunning {
                status: session.status,
            });
        }
        if !session.cancel.is_cancelled() {
            session.cancel.cancel();
            session.think("Stop requested");
            info!(origin = %origin, "stop requested");
        }
        Ok(StopOutcome::Stopping)
    }

    pub fn get_status(&self, origin: &OriginId) -> StatusSnapshot {
        self.registry
            .with_session(origin, SessionStatus::from_session)
            .map(StatusSnapshot::Found)
            .unwrap_or(StatusSnapshot::NotFound)
    }

    /// Events for one origin only
    pub fn subscribe(&self, origin: &OriginId) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe(origin)
    }

    /// Run one sweep pass now
    pub async fn sweep_now(&self) -> SweepSummary {
        let report = self.registry.sweep(Instant::now(), &self.config.session);
        let released = report.released.len();
        for (origin, handle) in report.released {
            self.contexts.release(&origin, handle).await;
        }
        for origin in &report.evicted {
            self.events.close(origin);
        }
        SweepSummary {
            released,
            evicted: report.evicted,
        }
    }

    /// Start the periodic sweep. Holds only a weak reference, so dropping
    /// the orchestrator ends the task at its next tick.
    pub fn spawn_sweeper(self: &Arc<Self>) {
        let mut guard = self.sweeper.lock();
        if guard.is_some() {
            return;
        }
        let weak = Arc::downgrade(self);
        let period = self.config.session.sweep_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(orchestrator) = weak.upgrade() else {
                    break;
                };
                let summary = orchestrator.sweep_now().await;
                debug!(
                    released = summary.released,
                    evicted = summary.evicted.len(),
                    "sweep tick"
                );
            }
        });
        *guard = Some(handle);
    }

    /// Stop the sweeper and ask every running session to stop
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        for origin in self.registry.origins() {
            if let Err(err) = self.stop_task(&origin) {
                warn!(origin = %origin, error = %err, "stop during shutdown failed");
            }
        }
    }

    /// Give back a page acquired for a start that lost its claim, unless the
    /// session that won holds the same handle.
    async fn return_unclaimed(&self, origin: &OriginId, page: Arc<dyn PageDriver>) {
        let held = self
            .registry
            .with_session(origin, |session| session.page.clone())
            .flatten();
        if held.is_some_and(|held| same_handle(&held, &page)) {
            return;
        }
        debug!(origin = %origin, "releasing page context of a conflicting start");
        self.contexts.release(origin, page).await;
    }

    async fn page_for(&self, origin: &OriginId) -> Result<Arc<dyn PageDriver>, OrchestratorError> {
        let held = self
            .registry
            .with_session(origin, |session| session.page.clone())
            .flatten();
        if let Some(page) = held {
            return Ok(page);
        }
        self.contexts
            .acquire(origin)
            .await
            .map_err(|source| OrchestratorError::Context {
                origin: origin.clone(),
                source,
            })
    }

    /// Template plan for classified goals; unclassified goals go to the
    /// analysis provider first when one is configured
    async fn plan_for(&self, goal: &Goal, page: &dyn PageDriver) -> Plan {
        let provider = match (&self.provider, goal.task_type) {
            (Some(provider), TaskType::Generic) => provider,
            _ => return self.planner.generate(goal),
        };
        match self.analyze(provider.as_ref(), goal, page).await {
            Ok(plan) if !plan.is_empty() => plan,
            Ok(_) => self.planner.generate(goal),
            Err(err) => {
                warn!(error = %err, "analysis unusable, falling back to template plan");
                self.planner.generate(goal)
            }
        }
    }

    async fn analyze(
        &self,
        provider: &dyn AnalysisProvider,
        goal: &Goal,
        page: &dyn PageDriver,
    ) -> Result<Plan, AgentError> {
        let snapshot = page
            .snapshot()
            .await
            .map_err(|err| AgentError::provider(err.to_string()))?;
        let value = provider.analyze_goal(&snapshot, &goal.text).await?;
        self.planner.from_analysis(goal, &value)
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

fn same_handle(a: &Arc<dyn PageDriver>, b: &Arc<dyn PageDriver>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}
