use std::collections::{BTreeSet, VecDeque};
use chrono::NaiveDateTime;
use super::types::UploadId;

/// 待上传队列
///
/// 按 `(scheduled_time, id)` 排序，时间相同时按 id 排序。
/// 失败重试的条目放在单独的重试队列里，只有没有新的到期条目时才会取出，
/// 这样一个反复失败的条目不会挡住后面的上传。
#[derive(Debug, Default)]
pub struct UploadQueue {
    entries: BTreeSet<(NaiveDateTime, UploadId)>,
    retries: VecDeque<UploadId>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已在队列中时返回 false
    pub fn push(&mut self, scheduled_time: NaiveDateTime, id: UploadId) -> bool {
        if self.retries.contains(&id) {
            return false;
        }
        self.entries.insert((scheduled_time, id))
    }

    /// 放到重试队列末尾
    pub fn push_retry(&mut self, id: UploadId) -> bool {
        if self.retries.contains(&id) || self.entries.iter().any(|(_, queued)| *queued == id) {
            return false;
        }
        self.retries.push_back(id);
        true
    }

    pub fn remove(&mut self, scheduled_time: NaiveDateTime, id: UploadId) -> bool {
        if self.entries.remove(&(scheduled_time, id)) {
            return true;
        }
        match self.retries.iter().position(|queued| *queued == id) {
            Some(index) => self.retries.remove(index).is_some(),
            None => false,
        }
    }

    /// 最早的计划条目，不出队
    pub fn peek(&self) -> Option<(NaiveDateTime, UploadId)> {
        self.entries.first().copied()
    }

    /// 取出下一个可执行的条目：先取到期的计划条目，再取重试条目
    pub fn pop_due(&mut self, now: NaiveDateTime) -> Option<UploadId> {
        match self.entries.first() {
            Some((time, _)) if *time <= now => self.entries.pop_first().map(|(_, id)| id),
            _ => self.retries.pop_front(),
        }
    }

    pub fn contains(&self, scheduled_time: NaiveDateTime, id: UploadId) -> bool {
        self.entries.contains(&(scheduled_time, id)) || self.retries.contains(&id)
    }

    pub fn retry_len(&self) -> usize {
        self.retries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.retries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.retries.is_empty()
    }
}
