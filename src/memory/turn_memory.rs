//! 回合记忆：只追加的回合记录日志
//!
//! append 是唯一的写入路径，没有更新或删除；纠正通过追加新记录完成。

use serde::{Deserialize, Serialize};

use crate::memory::{QueryMetadata, TurnId, TurnRecord};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnMemory {
    records: Vec<TurnRecord>,
}

impl TurnMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加记录并分配 turn_id（上一条 + 1，从 1 开始）
    pub fn append(&mut self, mut record: TurnRecord) -> TurnId {
        let turn_id = self.records.last().map_or(1, |r| r.turn_id + 1);
        record.turn_id = turn_id;
        self.records.push(record);
        turn_id
    }

    /// 最近 n 条记录（按时间顺序，最新在末尾）
    pub fn recent(&self, n: usize) -> &[TurnRecord] {
        &self.records[self.records.len().saturating_sub(n)..]
    }

    pub fn last(&self) -> Option<&TurnRecord> {
        self.records.last()
    }

    pub fn get(&self, turn_id: TurnId) -> Option<&TurnRecord> {
        let index = usize::try_from(turn_id).ok()?.checked_sub(1)?;
        self.records.get(index).filter(|r| r.turn_id == turn_id)
    }

    pub fn records(&self) -> &[TurnRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 从后往前找最近一条带 Query Metadata 的记录
    pub fn latest_query_record(&self) -> Option<&TurnRecord> {
        self.records.iter().rev().find(|r| r.query_metadata.is_some())
    }

    pub fn latest_query_metadata(&self) -> Option<&QueryMetadata> {
        self.latest_query_record()
            .and_then(|r| r.query_metadata.as_ref())
    }

    /// 短期记忆窗口的文本形式，供分类 / 改写 / 规划提示使用
    pub fn context_window(&self, n: usize) -> String {
        let recent = self.recent(n);
        if recent.is_empty() {
            return "(no previous turns)".to_string();
        }
        recent
            .iter()
            .map(TurnRecord::to_context_string)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::todo::{Step, TodoList};
    use serde_json::json;

    fn list() -> TodoList {
        TodoList::new("r", "r", vec![Step::new("a", "resolve", "echo", true)]).unwrap()
    }

    fn metadata(summary: &str) -> QueryMetadata {
        QueryMetadata {
            query_kind: "elasticsearch".into(),
            query_body: json!({"query": {"match_all": {}}}),
            result_summary: summary.into(),
            retrieval_description: "all shipments".into(),
            executed_at: 0,
        }
    }

    #[test]
    fn test_append_assigns_gap_free_ids() {
        let list = list();
        let step = &list.steps()[0];
        let mut memory = TurnMemory::new();
        for expected in 1..=3 {
            let id = memory.append(TurnRecord::complete(step, "hi", "done".into(), vec![], None, &list));
            assert_eq!(id, expected);
        }
        assert_eq!(memory.get(2).map(|r| r.turn_id), Some(2));
        assert!(memory.get(0).is_none());
        assert!(memory.get(4).is_none());
    }

    #[test]
    fn test_recent_returns_most_recent_last() {
        let list = list();
        let step = &list.steps()[0];
        let mut memory = TurnMemory::new();
        for input in ["one", "two", "three", "four"] {
            memory.append(TurnRecord::complete(step, input, "ok".into(), vec![], None, &list));
        }
        let recent: Vec<_> = memory.recent(3).iter().map(|r| r.user_input.as_str()).collect();
        assert_eq!(recent, vec!["two", "three", "four"]);
        assert_eq!(memory.recent(10).len(), 4);
    }

    #[test]
    fn test_latest_query_metadata_scans_backward() {
        let list = list();
        let step = &list.steps()[0];
        let mut memory = TurnMemory::new();
        assert!(memory.latest_query_metadata().is_none());
        memory.append(TurnRecord::complete(step, "q1", "ran".into(), vec![], Some(metadata("first")), &list));
        memory.append(TurnRecord::complete(step, "q2", "ran".into(), vec![], Some(metadata("second")), &list));
        memory.append(TurnRecord::clarification(step, "q3", "Which one?".into(), &list));
        assert_eq!(
            memory.latest_query_metadata().map(|m| m.result_summary.as_str()),
            Some("second")
        );
    }

    #[test]
    fn test_context_window_formats_turns() {
        let list = list();
        let step = &list.steps()[0];
        let mut memory = TurnMemory::new();
        assert_eq!(memory.context_window(3), "(no previous turns)");
        memory.append(TurnRecord::clarification(step, "arrivals in Miami", "Which Miami?".into(), &list));
        assert_eq!(
            memory.context_window(3),
            "User: arrivals in Miami\nAssistant: Which Miami?"
        );
    }
}
