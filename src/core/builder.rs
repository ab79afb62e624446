//! 编排器构建器：按配置装配分类、改写、规划、网关与存储
//!
//! 每个协作方都可以单独替换（测试中注入脚本化实现）；未替换的部分由配置中的 LLM 后端驱动。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::{AppConfig, StoreBackend, ToolKind};
use crate::core::orchestrator::{TurnOrchestrator, TurnSettings};
use crate::core::{ConversationGate, RecoveryEngine, TurnEvent};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::{ConversationStore, FileConversationStore, MemoryConversationStore};
use crate::planning::{LlmPlanProposer, PlanProposer, Planner};
use crate::routing::{
    ClassificationCollaborator, IntentClassifier, LlmClassifier, LlmRewriter, RequestRewriter,
};
use crate::tools::{EchoTool, ExecutorCatalog, LlmStepTool, StepTool, ToolGateway, ToolRegistry};

/// 根据 [llm] 配置创建客户端；openai 缺少 OPENAI_API_KEY 时回退到 Mock
pub fn create_llm_from_config(config: &AppConfig) -> Arc<dyn LlmClient> {
    match config.llm.provider.as_str() {
        "mock" => Arc::new(MockLlmClient),
        provider => match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => {
                tracing::info!(provider, model = %config.llm.model, "using OpenAI-compatible backend");
                Arc::new(OpenAiClient::new(
                    config.llm.base_url.as_deref(),
                    &config.llm.model,
                    &key,
                ))
            }
            _ => {
                tracing::warn!(provider, "OPENAI_API_KEY not set, falling back to mock LLM");
                Arc::new(MockLlmClient)
            }
        },
    }
}

/// 根据 [store] 配置创建对话存储
pub fn create_store_from_config(config: &AppConfig) -> Arc<dyn ConversationStore> {
    match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryConversationStore::new()),
        StoreBackend::File => Arc::new(FileConversationStore::new(&config.store.dir)),
    }
}

pub struct OrchestratorBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    classifier: Option<Arc<dyn ClassificationCollaborator>>,
    rewriter: Option<Arc<dyn RequestRewriter>>,
    proposer: Option<Arc<dyn PlanProposer>>,
    catalog: Option<ExecutorCatalog>,
    tools: Vec<Arc<dyn StepTool>>,
    store: Option<Arc<dyn ConversationStore>>,
    events: Option<mpsc::UnboundedSender<TurnEvent>>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            classifier: None,
            rewriter: None,
            proposer: None,
            catalog: None,
            tools: Vec::new(),
            store: None,
            events: None,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ClassificationCollaborator>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_rewriter(mut self, rewriter: Arc<dyn RequestRewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    pub fn with_proposer(mut self, proposer: Arc<dyn PlanProposer>) -> Self {
        self.proposer = Some(proposer);
        self
    }

    /// 替换配置中的执行器目录
    pub fn with_catalog(mut self, catalog: ExecutorCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// 注册步骤执行器；覆盖同名的默认执行器
    pub fn with_tool(mut self, tool: Arc<dyn StepTool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 订阅回合过程事件
    pub fn with_events(mut self, events: mpsc::UnboundedSender<TurnEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// 目录中没有显式注册的执行器按配置的 kind 生成（不在配置里的按 llm 处理）
    fn build_tool_registry(&self, catalog: &ExecutorCatalog, llm: &Arc<dyn LlmClient>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for entry in catalog.entries() {
            let kind = self
                .config
                .tools
                .catalog
                .iter()
                .find(|c| c.reference == entry.reference)
                .map(|c| c.kind)
                .unwrap_or_default();
            match kind {
                ToolKind::Llm => registry.register(LlmStepTool::new(entry.clone(), llm.clone())),
                ToolKind::Echo => registry.register(EchoTool::new(entry.reference.clone())),
            }
        }
        for tool in &self.tools {
            registry.register_arc(tool.clone());
        }
        registry
    }

    pub fn build(self) -> TurnOrchestrator {
        let llm = self
            .llm
            .clone()
            .unwrap_or_else(|| create_llm_from_config(&self.config));
        let catalog = self
            .catalog
            .clone()
            .unwrap_or_else(|| ExecutorCatalog::from_config(&self.config.tools.catalog));
        let registry = self.build_tool_registry(&catalog, &llm);
        let request_timeout = self.config.llm.timeouts.request;

        let classifier = self
            .classifier
            .unwrap_or_else(|| Arc::new(LlmClassifier::new(llm.clone())));
        let rewriter = self
            .rewriter
            .unwrap_or_else(|| Arc::new(LlmRewriter::new(llm.clone())));
        let proposer = self
            .proposer
            .unwrap_or_else(|| Arc::new(LlmPlanProposer::new(llm.clone())));
        let store = self
            .store
            .unwrap_or_else(|| create_store_from_config(&self.config));

        tracing::info!(
            executors = catalog.entries().len(),
            yolo = self.config.agent.yolo_mode,
            max_iterations = self.config.agent.max_iterations,
            "turn orchestrator ready"
        );

        TurnOrchestrator {
            classifier: IntentClassifier::new(classifier, request_timeout),
            rewriter,
            rewrite_timeout: Duration::from_secs(request_timeout),
            planner: Planner::new(proposer, catalog.clone(), request_timeout),
            gateway: ToolGateway::new(catalog, registry, self.config.tools.tool_timeout_secs)
                .with_yolo(self.config.agent.yolo_mode),
            store,
            gate: ConversationGate::new(),
            recovery: RecoveryEngine::new(),
            settings: TurnSettings {
                short_term_turns: self.config.agent.short_term_turns,
                max_iterations: self.config.agent.max_iterations.max(1),
            },
            events: self.events,
        }
    }
}
