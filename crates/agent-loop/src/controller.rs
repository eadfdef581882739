//! The loop controller: one command in, a terminal result out.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tabpilot_action_executor::{ActionExecutor, ExecError};
use tabpilot_core_types::{
    Action, ActionRequest, AgentMode, DriverStatus, LogKind, PageContext, TabHandle,
};
use tabpilot_event_bus::EventBus;
use tabpilot_llm_dispatcher::{Dispatcher, LlmError, SEARCH_RESULTS_HEADER};
use tabpilot_quiz_oracle::{iframe_context, QuizOracle};
use tabpilot_snapshot::{compute_diff, SnapshotService};

use crate::config::LoopConfig;
use crate::state::ExecutionState;

/// Corrective re-ask when a decision carried no usable actions.
const CORRECTIVE_MESSAGE: &str = "Your previous reply contained no usable actions. Respond with ONLY a JSON object whose \"actions\" array holds at least one real action (snapshot counts; describe alone does not).";

/// Continuation message for normal-mode steps after the first.
const NORMAL_CONTINUATION: &str = "Continue working on the command. Review the current page state above and emit the next actions; set done:true with a summary when the command is complete.";

/// Continuation rubric for quiz-mode steps after the first.
const QUIZ_CONTINUATION: &str = "Continue the assessment. Work through your reasoning in \"thinking\" first: state the current question and decide the correct answer BEFORE any click on Next/Submit. Handle exactly one question item now. For drag questions move exactly one tile and verify the previous tile actually landed before moving another; tile selectors shift between steps, so only use selectors from the page state above. End the batch with a snapshot action.";

#[derive(Debug, Error)]
pub enum LoopError {
    /// Another command is already executing.
    #[error("a command is already executing")]
    Busy,

    /// Configuration or authorization failure that no retry can fix.
    #[error(transparent)]
    Fatal(#[from] LlmError),
}

/// How a command run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    /// Planner signalled done.
    Completed,
    /// STOP was requested and observed.
    Stopped,
    /// Step budget exhausted.
    MaxSteps,
    /// No usable decision / perception on the first step.
    Failed,
}

#[derive(Debug, Clone)]
pub struct LoopResult {
    pub status: LoopStatus,
    pub steps: u32,
    pub summary: Option<String>,
    pub mode: AgentMode,
}

/// Which break-point ended the last executed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakPoint {
    Snapshot,
    Screenshot,
    Search,
    Drag,
}

/// Break-point classification: these actions end the batch and yield
/// perception back to the loop (`drag` only in quiz mode).
fn break_point(action: &Action, mode: AgentMode) -> Option<BreakPoint> {
    match action {
        Action::Snapshot => Some(BreakPoint::Snapshot),
        Action::Screenshot => Some(BreakPoint::Screenshot),
        Action::Search { .. } => Some(BreakPoint::Search),
        Action::Drag { .. } if mode.is_quiz() => Some(BreakPoint::Drag),
        _ => None,
    }
}

fn is_fatal(err: &LlmError) -> bool {
    matches!(
        err,
        LlmError::MissingConfig(_) | LlmError::InvalidKey | LlmError::ModelNotFound { .. }
    )
}

pub struct AgentLoop {
    dispatcher: Arc<Dispatcher>,
    executor: Arc<ActionExecutor>,
    snapshots: SnapshotService,
    oracle: QuizOracle,
    bus: Arc<EventBus>,
    state: Arc<ExecutionState>,
    config: LoopConfig,
}

/// Mutable run state threaded through one command.
struct RunState {
    mode: AgentMode,
    step: u32,
    /// Full map captured this step, stored before diffing so the next
    /// diff runs against full state.
    last_full_map: Option<String>,
    last_search_key: Option<String>,
    buffered_search: Option<String>,
    last_break: Option<BreakPoint>,
    clicked_in_batch: bool,
}

impl AgentLoop {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        executor: Arc<ActionExecutor>,
        snapshots: SnapshotService,
        oracle: QuizOracle,
        bus: Arc<EventBus>,
        state: Arc<ExecutionState>,
        config: LoopConfig,
    ) -> Self {
        Self {
            dispatcher,
            executor,
            snapshots,
            oracle,
            bus,
            state,
            config,
        }
    }

    pub fn state(&self) -> Arc<ExecutionState> {
        Arc::clone(&self.state)
    }

    /// Execute one natural-language command against the tab.
    ///
    /// Rejects with [`LoopError::Busy`] when a command is already running;
    /// concurrent requests are never queued.
    pub async fn run(&self, tab: &dyn TabHandle, command: &str) -> Result<LoopResult, LoopError> {
        let Some(guard) = self.state.try_claim() else {
            self.bus.log(
                LogKind::Error,
                "a command is already executing; send STOP first",
            );
            return Err(LoopError::Busy);
        };
        let token = guard.token();

        self.bus.running(true);
        self.bus
            .status(DriverStatus::Busy, format!("Working on: {command}"));
        self.dispatcher.clear_history();

        let result = self.run_command(tab, command, &token).await;

        self.bus.running(false);
        match &result {
            Ok(outcome) => {
                let text = match outcome.status {
                    LoopStatus::Completed => outcome
                        .summary
                        .clone()
                        .unwrap_or_else(|| "Command completed".to_string()),
                    LoopStatus::Stopped => "Stopped by user".to_string(),
                    LoopStatus::MaxSteps => {
                        format!("Stopped after {} steps without completion", outcome.steps)
                    }
                    LoopStatus::Failed => "Could not make progress on the command".to_string(),
                };
                let status = match outcome.status {
                    LoopStatus::Failed => DriverStatus::Error,
                    _ => DriverStatus::Ready,
                };
                self.bus.status(status, text);
            }
            Err(err) => {
                self.bus.status(DriverStatus::Error, err.to_string());
            }
        }
        drop(guard);
        result
    }

    async fn run_command(
        &self,
        tab: &dyn TabHandle,
        command: &str,
        token: &CancellationToken,
    ) -> Result<LoopResult, LoopError> {
        let mut run = RunState {
            mode: AgentMode::Normal,
            step: 0,
            last_full_map: None,
            last_search_key: None,
            buffered_search: None,
            last_break: None,
            clicked_in_batch: false,
        };

        loop {
            if token.is_cancelled() {
                return Ok(self.finish(LoopStatus::Stopped, &run, None));
            }
            if run.step >= self.config.budget(run.mode.is_quiz()) {
                return Ok(self.finish(LoopStatus::MaxSteps, &run, None));
            }

            match self.run_step(tab, command, token, &mut run).await? {
                StepVerdict::Continue => {}
                StepVerdict::Done(summary) => {
                    return Ok(self.finish(LoopStatus::Completed, &run, summary));
                }
                StepVerdict::Stopped => {
                    return Ok(self.finish(LoopStatus::Stopped, &run, None));
                }
                StepVerdict::AbortedFirstStep => {
                    return Ok(self.finish(LoopStatus::Failed, &run, None));
                }
            }
            run.step += 1;
        }
    }

    fn finish(&self, status: LoopStatus, run: &RunState, summary: Option<String>) -> LoopResult {
        LoopResult {
            status,
            steps: run.step,
            summary,
            mode: run.mode,
        }
    }
}

enum StepVerdict {
    Continue,
    Done(Option<String>),
    Stopped,
    AbortedFirstStep,
}

impl AgentLoop {
    async fn run_step(
        &self,
        tab: &dyn TabHandle,
        command: &str,
        token: &CancellationToken,
        run: &mut RunState,
    ) -> Result<StepVerdict, LoopError> {
        let quiz = run.mode.is_quiz();
        debug!(target: "agent_loop", step = run.step, mode = ?run.mode, "step start");

        // Iframes may have navigated since the last step; re-arm probes.
        if quiz {
            if let Err(err) = self.snapshots.coordinator().inject_probes(tab).await {
                warn!(target: "agent_loop", error = %err, "probe injection failed");
            }
        }

        // Perception.
        let collected = if quiz {
            self.snapshots.collect_with_iframe_retry(tab).await
        } else {
            self.snapshots.collect_all_frames(tab).await
        };
        let map = match collected {
            Ok(map) => map,
            Err(err) => {
                self.bus
                    .log(LogKind::Error, format!("page snapshot failed: {err}"));
                if run.step == 0 {
                    return Ok(StepVerdict::AbortedFirstStep);
                }
                self.pause(token, self.config.step_pause).await;
                return Ok(StepVerdict::Continue);
            }
        };

        let url = tab.url().await.unwrap_or_default();
        let title = tab.title().await.unwrap_or_default();
        let mut page = PageContext::new(url, title, map.clone());

        // Vision need is judged on the full map, before diff substitution.
        page.needs_vision = self.oracle.needs_vision(&page);
        if page.needs_vision {
            self.attach_screenshot(tab, &mut page).await;
        }

        // Quiz detection fires once, on the first normal-mode perception.
        if run.step == 0 && !quiz && self.oracle.detect(&page) {
            info!(target: "agent_loop", "quiz page detected, switching mode");
            self.bus
                .log(LogKind::Info, "Assessment detected, switching to quiz mode");
            run.mode = AgentMode::Quiz;
        }
        let quiz = run.mode.is_quiz();

        // Diff substitution for follow-up quiz steps; the full map is
        // stored first so the next diff is against full state.
        if quiz {
            if let Some(previous) = run.last_full_map.replace(map.clone()) {
                page.visual_map = compute_diff(&previous, &map);
            }
        } else {
            run.last_full_map = Some(map.clone());
        }

        // Build this step's instruction; a search result buffered on the
        // previous step is injected here.
        let mut message = if run.step == 0 {
            command.to_string()
        } else if quiz {
            QUIZ_CONTINUATION.to_string()
        } else {
            NORMAL_CONTINUATION.to_string()
        };
        if let Some(search) = run.buffered_search.take() {
            message.push_str("\n\n");
            message.push_str(SEARCH_RESULTS_HEADER);
            message.push('\n');
            message.push_str(&search);
        }

        // Search analyst: fire when the question key moves; the answer is
        // remembered for the next step's message.
        if quiz && self.dispatcher.search_enabled() {
            self.maybe_search(&map, run).await;
        }

        // Deliberation, with bounded corrective retries.
        let decision = match self.decide(command, &message, &page, run, token).await? {
            Some(decision) => decision,
            None if token.is_cancelled() => return Ok(StepVerdict::Stopped),
            None => {
                if run.step == 0 {
                    self.bus.log(
                        LogKind::Error,
                        "model produced no usable actions; giving up",
                    );
                    return Ok(StepVerdict::AbortedFirstStep);
                }
                self.pause(token, self.config.step_pause).await;
                return Ok(StepVerdict::Continue);
            }
        };

        // Mode switches: upgrade any time, downgrade only alongside done.
        match decision.mode {
            Some(AgentMode::Quiz) if !run.mode.is_quiz() => {
                self.bus
                    .log(LogKind::Info, "Planner switched to quiz mode");
                run.mode = AgentMode::Quiz;
            }
            Some(AgentMode::Normal) if run.mode.is_quiz() && decision.done => {
                run.mode = AgentMode::Normal;
            }
            _ => {}
        }

        // Actuation.
        run.last_break = None;
        run.clicked_in_batch = false;
        for request in &decision.actions {
            if token.is_cancelled() {
                return Ok(StepVerdict::Stopped);
            }
            self.execute_one(tab, request, run).await;

            if let Some(kind) = break_point(&request.action, run.mode) {
                run.last_break = Some(kind);
                if kind == BreakPoint::Drag {
                    self.pause(token, self.config.drag_settle).await;
                }
                break;
            }
        }

        // Done semantics: after a quiz snapshot break the planner has not
        // seen the new state, so done is not trusted.
        let snapshot_blind = run.mode.is_quiz() && run.last_break == Some(BreakPoint::Snapshot);
        if decision.done && !snapshot_blind {
            return Ok(StepVerdict::Done(decision.summary.clone()));
        }

        let pause = if run.mode.is_quiz() && run.clicked_in_batch {
            self.config.quiz_click_pause
        } else {
            self.config.step_pause
        };
        self.pause(token, pause).await;
        Ok(StepVerdict::Continue)
    }

    /// Inner decision retry loop; `None` means no usable decision.
    async fn decide(
        &self,
        command: &str,
        first_message: &str,
        page: &PageContext,
        run: &RunState,
        token: &CancellationToken,
    ) -> Result<Option<tabpilot_core_types::ModelDecision>, LoopError> {
        let mut message = first_message.to_string();
        for attempt in 0..self.config.decision_attempts {
            if token.is_cancelled() {
                return Ok(None);
            }
            match self.dispatcher.send(command, &message, page, run.mode).await {
                Ok(decision) if decision.has_progress() => {
                    return Ok(Some(decision));
                }
                Ok(_) => {
                    debug!(target: "agent_loop", attempt, "decision without real actions");
                    self.dispatcher.drop_last_exchange();
                    message = CORRECTIVE_MESSAGE.to_string();
                }
                Err(err) if is_fatal(&err) => return Err(LoopError::Fatal(err)),
                Err(err) => {
                    warn!(target: "agent_loop", attempt, error = %err, "dispatcher call failed");
                    self.bus
                        .log(LogKind::Error, format!("model call failed: {err}"));
                }
            }
        }
        Ok(None)
    }

    /// Execute one action with pending/success/error logging.
    async fn execute_one(&self, tab: &dyn TabHandle, request: &ActionRequest, run: &mut RunState) {
        let label = request.action.summary();
        self.bus.log(LogKind::Pending, label.clone());

        match &request.action {
            // The search break-point runs through the dispatcher, not the
            // executor; its result feeds the next step's message.
            Action::Search { query } => {
                let context = run
                    .last_full_map
                    .as_deref()
                    .and_then(iframe_context)
                    .unwrap_or("");
                match self.dispatcher.run_search(query, context).await {
                    Ok(answer) => {
                        run.buffered_search = Some(answer);
                        self.bus.log(LogKind::Success, format!("searched: {query}"));
                    }
                    Err(err) => {
                        self.bus
                            .log(LogKind::Error, format!("search failed: {err}"));
                    }
                }
                return;
            }
            Action::Click { .. } => run.clicked_in_batch = true,
            _ => {}
        }

        match self.executor.execute(tab, request, run.mode).await {
            Ok(outcome) if outcome.success => {
                self.bus.log(LogKind::Success, outcome.message);
            }
            Ok(outcome) => {
                self.bus
                    .log(LogKind::Error, format!("{label}: {}", outcome.message));
            }
            Err(ExecError::DragFailed(reason)) => {
                self.bus
                    .log(LogKind::Error, format!("{label}: {reason}"));
            }
            Err(err) => {
                self.bus.log(LogKind::Error, format!("{label}: {err}"));
            }
        }
    }

    async fn attach_screenshot(&self, tab: &dyn TabHandle, page: &mut PageContext) {
        let request = ActionRequest::top(Action::Screenshot);
        match self.executor.execute(tab, &request, AgentMode::Normal).await {
            Ok(outcome) if outcome.success => {
                page.screenshot = outcome
                    .data
                    .as_ref()
                    .and_then(|d| d.get("screenshot"))
                    .and_then(|s| s.as_str())
                    .map(str::to_string);
            }
            Ok(outcome) => {
                // Non-fatal; the step proceeds without an image.
                warn!(target: "agent_loop", message = %outcome.message, "screenshot unavailable");
            }
            Err(err) => {
                warn!(target: "agent_loop", error = %err, "screenshot failed");
            }
        }
    }

    async fn maybe_search(&self, full_map: &str, run: &mut RunState) {
        let Some(key) = self.oracle.stable_question_key(full_map) else {
            return;
        };
        if run.last_search_key.as_deref() == Some(key.as_str()) {
            return;
        }

        let question = self
            .oracle
            .extract_question_text(full_map)
            .unwrap_or_else(|| key.clone());
        let context = iframe_context(full_map).unwrap_or("");
        match self.dispatcher.run_search(&question, context).await {
            Ok(answer) => {
                info!(target: "agent_loop", %key, "search analyst answered");
                run.buffered_search = Some(answer);
                run.last_search_key = Some(key);
            }
            Err(err) => {
                warn!(target: "agent_loop", error = %err, "search analyst failed");
            }
        }
    }

    /// Cancellation-aware sleep: STOP interrupts every pause immediately.
    async fn pause(&self, token: &CancellationToken, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn break_points_depend_on_mode() {
        let snapshot = Action::Snapshot;
        let drag = Action::Drag {
            from_selector: ".a".into(),
            to_selector: ".b".into(),
        };
        let click = Action::Click {
            selector: "#x".into(),
        };

        assert_eq!(
            break_point(&snapshot, AgentMode::Normal),
            Some(BreakPoint::Snapshot)
        );
        assert_eq!(break_point(&drag, AgentMode::Normal), None);
        assert_eq!(break_point(&drag, AgentMode::Quiz), Some(BreakPoint::Drag));
        assert_eq!(break_point(&click, AgentMode::Quiz), None);
    }

    #[test]
    fn fatal_errors_are_the_unrecoverable_ones() {
        assert!(is_fatal(&LlmError::InvalidKey));
        assert!(is_fatal(&LlmError::ModelNotFound { model: "m".into() }));
        assert!(!is_fatal(&LlmError::RateLimited { status: 429 }));
        assert!(!is_fatal(&LlmError::NoContent));
    }
}
