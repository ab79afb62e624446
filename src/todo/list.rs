//! Todo List：有序步骤 + 游标
//!
//! 步骤顺序在规划时固定（插入顺序即执行顺序）。游标始终指向一个存在的步骤；
//! 所有步骤完成后游标清空，列表视为耗尽，由编排器退役。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{PlanViolation, TodoError};
use crate::todo::{Step, StepStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoList {
    list_id: Uuid,
    original_request: String,
    rewritten_request: String,
    steps: Vec<Step>,
    cursor: Option<String>,
}

impl TodoList {
    /// 构建新列表：拒绝空计划、空白 key 与重复 key；游标指向第一个步骤
    pub fn new(
        original_request: impl Into<String>,
        rewritten_request: impl Into<String>,
        steps: Vec<Step>,
    ) -> Result<Self, PlanViolation> {
        if steps.is_empty() {
            return Err(PlanViolation::Empty);
        }
        let mut seen = HashSet::new();
        for (i, step) in steps.iter().enumerate() {
            if step.key.trim().is_empty() {
                return Err(PlanViolation::BlankKey(i));
            }
            if !seen.insert(step.key.as_str()) {
                return Err(PlanViolation::DuplicateKey(step.key.clone()));
            }
        }

        let steps: Vec<Step> = steps
            .into_iter()
            .map(|s| Step {
                status: StepStatus::Pending,
                ..s
            })
            .collect();
        let cursor = steps.first().map(|s| s.key.clone());
        Ok(Self {
            list_id: Uuid::new_v4(),
            original_request: original_request.into(),
            rewritten_request: rewritten_request.into(),
            steps,
            cursor,
        })
    }

    pub fn list_id(&self) -> Uuid {
        self.list_id
    }

    pub fn original_request(&self) -> &str {
        &self.original_request
    }

    pub fn rewritten_request(&self) -> &str {
        &self.rewritten_request
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn step(&self, key: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.key == key)
    }

    /// 步骤在列表中的位置（从 0 开始）
    pub fn position(&self, key: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.key == key)
    }

    /// 游标所指步骤
    pub fn current(&self) -> Option<&Step> {
        self.cursor.as_deref().and_then(|k| self.step(k))
    }

    pub fn completed(&self) -> usize {
        self.steps.iter().filter(|s| s.is_complete()).count()
    }

    pub fn is_exhausted(&self) -> bool {
        self.steps.iter().all(Step::is_complete)
    }

    /// 更新步骤状态；已完成的步骤不可再改
    pub fn set_status(&mut self, key: &str, status: StepStatus) -> Result<(), TodoError> {
        let step = self
            .steps
            .iter_mut()
            .find(|s| s.key == key)
            .ok_or_else(|| TodoError::UnknownStep(key.to_string()))?;
        if step.is_complete() {
            return Err(TodoError::StepAlreadyComplete(key.to_string()));
        }
        step.status = status;
        Ok(())
    }

    /// 游标前移到插入顺序中下一个未完成的步骤；没有则清空游标并返回 None
    pub fn advance(&mut self) -> Option<&Step> {
        let from = self
            .cursor
            .as_deref()
            .and_then(|k| self.position(k))
            .unwrap_or(0);
        let next = self.steps[from..]
            .iter()
            .chain(self.steps[..from].iter())
            .find(|s| !s.is_complete())
            .map(|s| s.key.clone());
        self.cursor = next;
        self.current()
    }

    /// 重跑前把游标步骤（澄清中 / 出错）复位为 pending
    pub fn reopen_current(&mut self) -> Result<&Step, TodoError> {
        let key = self
            .cursor
            .clone()
            .ok_or(TodoError::NoActiveList)?;
        if self.step(&key).is_some_and(|s| s.status != StepStatus::Pending) {
            self.set_status(&key, StepStatus::Pending)?;
        }
        self.step(&key)
            .ok_or_else(|| TodoError::UnknownStep(key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(keys: &[&str]) -> Vec<Step> {
        keys.iter()
            .map(|k| Step::new(*k, format!("do {k}"), "echo", false))
            .collect()
    }

    #[test]
    fn test_new_sets_cursor_to_first_step() {
        let list = TodoList::new("raw", "clean", steps(&["a", "b", "c"])).unwrap();
        assert_eq!(list.cursor(), Some("a"));
        assert_eq!(list.len(), 3);
        assert!(!list.is_exhausted());
    }

    #[test]
    fn test_new_rejects_invalid_plans() {
        assert_eq!(
            TodoList::new("r", "r", Vec::new()).unwrap_err(),
            PlanViolation::Empty
        );
        assert_eq!(
            TodoList::new("r", "r", steps(&["a", "b", "a"])).unwrap_err(),
            PlanViolation::DuplicateKey("a".into())
        );
        assert_eq!(
            TodoList::new("r", "r", steps(&["a", " "])).unwrap_err(),
            PlanViolation::BlankKey(1)
        );
    }

    #[test]
    fn test_new_forces_pending_status() {
        let mut planned = steps(&["a"]);
        planned[0].status = StepStatus::Complete;
        let list = TodoList::new("r", "r", planned).unwrap();
        assert_eq!(list.steps()[0].status, StepStatus::Pending);
    }

    #[test]
    fn test_advance_in_insertion_order_until_exhausted() {
        let mut list = TodoList::new("r", "r", steps(&["a", "b"])).unwrap();
        list.set_status("a", StepStatus::Complete).unwrap();
        assert_eq!(list.advance().map(|s| s.key.as_str()), Some("b"));
        list.set_status("b", StepStatus::Complete).unwrap();
        assert!(list.advance().is_none());
        assert!(list.is_exhausted());
        assert_eq!(list.cursor(), None);
    }

    #[test]
    fn test_complete_step_is_immutable() {
        let mut list = TodoList::new("r", "r", steps(&["a"])).unwrap();
        list.set_status("a", StepStatus::Complete).unwrap();
        assert_eq!(
            list.set_status("a", StepStatus::Errored),
            Err(TodoError::StepAlreadyComplete("a".into()))
        );
    }

    #[test]
    fn test_reopen_current_after_clarification() {
        let mut list = TodoList::new("r", "r", steps(&["a", "b"])).unwrap();
        list.set_status("a", StepStatus::ClarificationNeeded).unwrap();
        let step = list.reopen_current().unwrap();
        assert_eq!(step.key, "a");
        assert_eq!(step.status, StepStatus::Pending);
        assert_eq!(list.cursor(), Some("a"));
    }

    #[test]
    fn test_unknown_step() {
        let mut list = TodoList::new("r", "r", steps(&["a"])).unwrap();
        assert_eq!(
            list.set_status("zz", StepStatus::Complete),
            Err(TodoError::UnknownStep("zz".into()))
        );
    }
}
