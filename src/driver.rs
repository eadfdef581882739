//! Driver wiring: one façade over the subsystem crates.

use std::sync::Arc;

use anyhow::Result;

use tabpilot_action_executor::{ActionExecutor, ExecutorConfig};
use tabpilot_agent_loop::{AgentLoop, ExecutionState, LoopConfig, LoopError, LoopResult};
use tabpilot_core_types::TabHandle;
use tabpilot_event_bus::EventBus;
use tabpilot_frame_coordinator::{CoordinatorConfig, FrameCoordinator};
use tabpilot_llm_dispatcher::{
    ChatApi, ChatOptions, Dispatcher, HttpChatApi, ProviderConfig,
};
use tabpilot_quiz_oracle::{OracleConfig, QuizOracle};
use tabpilot_snapshot::{SnapshotConfig, SnapshotService};

use crate::config::Settings;

/// Timing and budget knobs for every subsystem, bundled so embedders and
/// tests can tune the whole driver at once.
#[derive(Debug, Clone, Default)]
pub struct DriverTuning {
    pub loop_config: LoopConfig,
    pub executor: ExecutorConfig,
    pub coordinator: CoordinatorConfig,
    pub snapshot: SnapshotConfig,
    pub oracle: OracleConfig,
}

impl DriverTuning {
    /// Zero-delay preset for tests.
    pub fn instant() -> Self {
        Self {
            loop_config: LoopConfig::instant(),
            executor: ExecutorConfig::instant(),
            coordinator: CoordinatorConfig::default(),
            snapshot: SnapshotConfig::instant(),
            oracle: OracleConfig::default(),
        }
    }
}

pub struct DriverBuilder {
    planner: Arc<dyn ChatApi>,
    vision: Option<Arc<dyn ChatApi>>,
    search: Option<Arc<dyn ChatApi>>,
    chat_options: ChatOptions,
    tuning: DriverTuning,
    bus: Option<Arc<EventBus>>,
}

impl DriverBuilder {
    /// Build the provider clients from user settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let planner = HttpChatApi::new(ProviderConfig::new(
            settings.provider,
            settings.model.clone(),
            settings.api_key.clone(),
        ))?;

        // The analysts ride the same provider binding with their own
        // models.
        let vision = HttpChatApi::new(ProviderConfig::new(
            settings.provider,
            settings.vision_model.clone(),
            settings.api_key.clone(),
        ))?;

        let search = if settings.search_enabled {
            Some(Arc::new(HttpChatApi::new(ProviderConfig::new(
                settings.provider,
                settings.search_model.clone(),
                settings.api_key.clone(),
            ))?) as Arc<dyn ChatApi>)
        } else {
            None
        };

        Ok(Self {
            planner: Arc::new(planner),
            vision: Some(Arc::new(vision)),
            search,
            chat_options: ChatOptions::default(),
            tuning: DriverTuning::default(),
            bus: None,
        })
    }

    /// Wire explicit chat backends (tests, embedders with custom clients).
    pub fn from_apis(planner: Arc<dyn ChatApi>) -> Self {
        Self {
            planner,
            vision: None,
            search: None,
            chat_options: ChatOptions::default(),
            tuning: DriverTuning::default(),
            bus: None,
        }
    }

    pub fn vision(mut self, api: Arc<dyn ChatApi>) -> Self {
        self.vision = Some(api);
        self
    }

    pub fn search(mut self, api: Arc<dyn ChatApi>) -> Self {
        self.search = Some(api);
        self
    }

    pub fn tuning(mut self, tuning: DriverTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn build(self) -> Driver {
        let bus = self.bus.unwrap_or_else(|| EventBus::new(256));
        let state = ExecutionState::new();

        let mut dispatcher = Dispatcher::builder(self.planner).options(self.chat_options);
        if let Some(vision) = self.vision {
            dispatcher = dispatcher.vision(vision);
        }
        if let Some(search) = self.search {
            dispatcher = dispatcher.search(search);
        }
        let dispatcher = Arc::new(dispatcher.build());

        let coordinator = FrameCoordinator::new(self.tuning.coordinator);
        let snapshots = SnapshotService::new(coordinator.clone(), self.tuning.snapshot);
        let executor = Arc::new(ActionExecutor::new(
            coordinator,
            state.debug_registry(),
            self.tuning.executor,
        ));
        let oracle = QuizOracle::new(self.tuning.oracle);

        let agent_loop = AgentLoop::new(
            dispatcher,
            executor,
            snapshots,
            oracle,
            Arc::clone(&bus),
            Arc::clone(&state),
            self.tuning.loop_config,
        );

        Driver {
            agent_loop,
            bus,
            state,
        }
    }
}

/// The embedded driver: execute commands, observe events, stop.
pub struct Driver {
    agent_loop: AgentLoop,
    bus: Arc<EventBus>,
    state: Arc<ExecutionState>,
}

impl Driver {
    /// Run one command against a tab. Rejects with [`LoopError::Busy`]
    /// while another command is executing.
    pub async fn execute(
        &self,
        tab: &dyn TabHandle,
        command: &str,
    ) -> Result<LoopResult, LoopError> {
        self.agent_loop.run(tab, command).await
    }

    /// Request cooperative cancellation of the running command.
    pub fn stop(&self) {
        self.state.request_stop();
    }

    pub fn is_executing(&self) -> bool {
        self.state.is_executing()
    }

    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    pub fn state(&self) -> Arc<ExecutionState> {
        Arc::clone(&self.state)
    }
}
