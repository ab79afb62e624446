//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BI_AGENT__*` 覆盖（双下划线表示嵌套，如 `BI_AGENT__AGENT__YOLO_MODE=true`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub agent: AgentSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub store: StoreSection,
}

/// [app] 段
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [agent] 段：回合编排参数
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// 送入分类、改写与规划的短期记忆窗口（最近 N 条回合记录）
    #[serde(default = "default_short_term_turns")]
    pub short_term_turns: usize,
    /// 单个用户回合内最多连续执行的步骤数
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// YOLO 模式：不允许任何步骤中途澄清
    #[serde(default)]
    pub yolo_mode: bool,
}

fn default_short_term_turns() -> usize {
    3
}

fn default_max_iterations() -> usize {
    10
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            short_term_turns: default_short_term_turns(),
            max_iterations: default_max_iterations(),
            yolo_mode: false,
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / mock；openai 缺少 OPENAI_API_KEY 时回退到 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 分类 / 改写 / 规划单次调用超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

/// [tools] 段：执行器目录与单步超时
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次步骤执行超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_catalog")]
    pub catalog: Vec<CatalogEntryConfig>,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            catalog: default_catalog(),
        }
    }
}

/// 执行器的实现方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// 由 LLM 完成的通用步骤
    #[default]
    Llm,
    /// 复述步骤即完成（本地调试用）
    Echo,
}

/// [[tools.catalog]] 条目
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntryConfig {
    pub reference: String,
    pub capability: String,
    #[serde(default)]
    pub description: String,
    /// 该执行器是否允许中途发起澄清
    #[serde(default)]
    pub clarifiable: bool,
    /// 是否为取数步骤（产出 Query Metadata）
    #[serde(default)]
    pub data_retrieval: bool,
    #[serde(default)]
    pub kind: ToolKind,
}

impl CatalogEntryConfig {
    fn new(reference: &str, capability: &str, description: &str, clarifiable: bool) -> Self {
        Self {
            reference: reference.to_string(),
            capability: capability.to_string(),
            description: description.to_string(),
            clarifiable,
            data_retrieval: false,
            kind: ToolKind::Llm,
        }
    }
}

/// 默认 BI 流水线：实体解析 → 字段映射 → 构建查询 → 执行查询 → 格式化结果
fn default_catalog() -> Vec<CatalogEntryConfig> {
    vec![
        CatalogEntryConfig::new(
            "entity_resolution",
            "entity resolution",
            "Resolve places, organisations and time ranges mentioned in the request.",
            true,
        ),
        CatalogEntryConfig::new(
            "field_mapping",
            "field mapping",
            "Map business terms onto fields of the data source schema.",
            true,
        ),
        CatalogEntryConfig::new(
            "query_builder",
            "query building",
            "Build a data source query from resolved entities and mapped fields.",
            true,
        ),
        CatalogEntryConfig {
            data_retrieval: true,
            ..CatalogEntryConfig::new(
                "query_executor",
                "query execution",
                "Execute the built query and summarise the result set.",
                false,
            )
        },
        CatalogEntryConfig {
            kind: ToolKind::Echo,
            ..CatalogEntryConfig::new(
                "result_formatter",
                "result formatting",
                "Present the results to the user.",
                false,
            )
        },
    ]
}

/// 对话状态存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
}

/// [store] 段
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default)]
    pub backend: StoreBackend,
    /// file 后端的目录：每个对话一个 JSON 文件
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("data/conversations")
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            dir: default_store_dir(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 BI_AGENT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BI_AGENT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path.filter(|p| p.exists()) {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BI_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let config: AppConfig = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

impl AppConfig {
    /// 拒绝无法运行的取值
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.agent.max_iterations == 0 {
            return Err(config::ConfigError::Message(
                "agent.max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.agent.short_term_turns, 3);
        assert_eq!(config.agent.max_iterations, 10);
        assert!(!config.agent.yolo_mode);
        assert_eq!(config.tools.tool_timeout_secs, 30);
        assert_eq!(config.llm.timeouts.request, 60);
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_default_catalog_shape() {
        let catalog = ToolsSection::default().catalog;
        assert_eq!(catalog.len(), 5);
        assert_eq!(catalog[0].reference, "entity_resolution");
        assert!(catalog[0].clarifiable);
        let executor = catalog.iter().find(|e| e.reference == "query_executor").unwrap();
        assert!(executor.data_retrieval);
        assert!(!executor.clarifiable);
        assert_eq!(catalog[4].kind, ToolKind::Echo);
    }

    #[test]
    fn test_load_from_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[agent]
max_iterations = 4
yolo_mode = true

[store]
backend = "file"
dir = "/tmp/bi"

[[tools.catalog]]
reference = "lookup"
capability = "lookup"
clarifiable = true
kind = "echo"
"#
        )
        .unwrap();

        let config = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.agent.max_iterations, 4);
        assert_eq!(config.agent.short_term_turns, 3);
        assert!(config.agent.yolo_mode);
        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(config.tools.catalog.len(), 1);
        assert_eq!(config.tools.catalog[0].kind, ToolKind::Echo);
        assert!(!config.tools.catalog[0].data_retrieval);
    }

    #[test]
    fn test_zero_max_iterations_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[agent]\nmax_iterations = 0").unwrap();

        let err = load_config(Some(file.path().to_path_buf())).unwrap_err();
        assert!(err.to_string().contains("max_iterations"));
        assert!(AppConfig::default().validate().is_ok());
    }
}
