//! 规划层：由规划协作方提出步骤，本地校验后构建 Todo List

pub mod planner;

pub use planner::{
    plan_step_schema_json, LlmPlanProposer, PlanProposer, PlanRequest, Planner, PlanningContext,
    ProposedStep,
};
