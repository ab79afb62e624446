//! Echo 执行器（本地调试用）：复述步骤即视为完成

use async_trait::async_trait;

use crate::tools::{StepInput, StepTool, ToolError, ToolReply};

pub struct EchoTool {
    name: String,
}

impl EchoTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl StepTool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Completes a step by restating it (for testing)."
    }

    async fn execute(&self, input: &StepInput) -> Result<ToolReply, ToolError> {
        let action = match &input.clarification_answer {
            Some(answer) => format!("{} (using '{answer}')", input.description),
            None => input.description.clone(),
        };
        Ok(ToolReply::Done {
            action,
            tools_invoked: vec![self.name.clone()],
            query: None,
        })
    }
}
