use std::collections::HashMap;
use chrono::NaiveDateTime;
use tracing::warn;
use super::queue::UploadQueue;
use super::types::{GeneratedMetadata, MetadataUpdate, ScheduledUpload, UploadId};

/// 取下一个到期上传的结果
#[derive(Debug)]
pub enum Checkout {
    Empty,
    NotDue(NaiveDateTime),
    /// 已出队，但记录不再是待上传状态
    Stale(UploadId),
    Ready(ScheduledUpload),
}

/// 失败后记录的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// 进入重试队列，计划时间不变
    Retry { attempts: u32 },
    /// 达到失败次数上限
    GaveUp { attempts: u32 },
}

/// 内存中的计划表
///
/// 按 id 保存记录，`order` 保留写入文件时的插入顺序，`queue` 只索引待上传的记录。
#[derive(Debug, Default)]
pub struct ScheduleBook {
    uploads: HashMap<UploadId, ScheduledUpload>,
    order: Vec<UploadId>,
    queue: UploadQueue,
    in_flight: Option<UploadId>,
}

impl ScheduleBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从持久化记录重建，待上传的重新入队
    pub fn from_records(records: Vec<ScheduledUpload>) -> Self {
        let mut book = Self::new();
        for record in records {
            let id = record.id;
            if !book.insert(record) {
                warn!("Dropping duplicate schedule record {}", id);
            }
        }
        book
    }

    /// 添加记录，id 已存在时返回 false
    pub fn insert(&mut self, upload: ScheduledUpload) -> bool {
        if self.uploads.contains_key(&upload.id) {
            return false;
        }

        if upload.is_pending() {
            self.queue.push(upload.scheduled_time, upload.id);
        }
        self.order.push(upload.id);
        self.uploads.insert(upload.id, upload);
        true
    }

    pub fn get(&self, id: &UploadId) -> Option<&ScheduledUpload> {
        self.uploads.get(id)
    }

    /// 按插入顺序复制全部记录
    pub fn snapshot(&self) -> Vec<ScheduledUpload> {
        self.order
            .iter()
            .filter_map(|id| self.uploads.get(id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.uploads.values().filter(|u| u.is_pending()).count()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> Option<UploadId> {
        self.in_flight
    }

    /// 取出下一个可执行的上传并标记为进行中
    ///
    /// 到期的计划条目优先，重试条目排在它们之后。
    pub fn checkout(&mut self, now: NaiveDateTime) -> Checkout {
        let Some(id) = self.queue.pop_due(now) else {
            return match self.queue.peek() {
                Some((next, _)) => Checkout::NotDue(next),
                None => Checkout::Empty,
            };
        };

        match self.uploads.get(&id) {
            Some(upload) if upload.is_pending() => {
                self.in_flight = Some(id);
                Checkout::Ready(upload.clone())
            }
            _ => Checkout::Stale(id),
        }
    }

    /// 记录上传成功
    pub fn complete(
        &mut self,
        id: UploadId,
        video_id: String,
        generated: Option<&GeneratedMetadata>,
        now: NaiveDateTime,
    ) -> bool {
        self.release(id);
        let Some(upload) = self.uploads.get_mut(&id) else {
            return false;
        };

        if let Some(generated) = generated {
            fill_empty(upload, generated);
        }
        upload.uploaded = true;
        upload.cancelled = false;
        upload.failed = false;
        upload.video_id = Some(video_id);
        upload.error = None;
        upload.attempts += 1;
        upload.last_attempt_at = Some(now);
        upload.uploaded_at = Some(now);
        true
    }

    /// 记录一次失败
    ///
    /// 未达到 `max_failed` 时记录保持待上传，进入重试队列，等其他到期条目先执行。
    pub fn fail(
        &mut self,
        id: UploadId,
        error: String,
        generated: Option<&GeneratedMetadata>,
        now: NaiveDateTime,
        max_failed: Option<u32>,
    ) -> Option<FailureDisposition> {
        self.release(id);
        let upload = self.uploads.get_mut(&id)?;

        if let Some(generated) = generated {
            fill_empty(upload, generated);
        }
        upload.error = Some(error);
        upload.attempts += 1;
        upload.last_attempt_at = Some(now);

        if !upload.is_pending() {
            return Some(FailureDisposition::GaveUp { attempts: upload.attempts });
        }

        if max_failed.is_some_and(|max| upload.attempts >= max) {
            upload.failed = true;
            return Some(FailureDisposition::GaveUp { attempts: upload.attempts });
        }

        self.queue.push_retry(id);
        Some(FailureDisposition::Retry { attempts: upload.attempts })
    }

    /// 把中断的进行中上传放回队列
    pub fn release_in_flight(&mut self) -> Option<UploadId> {
        let id = self.in_flight.take()?;
        if let Some(upload) = self.uploads.get(&id) {
            if upload.is_pending() {
                self.queue.push(upload.scheduled_time, id);
            }
        }
        Some(id)
    }

    /// 取消待上传记录，进行中和非待上传的拒绝
    pub fn cancel(&mut self, id: &UploadId) -> bool {
        if self.in_flight == Some(*id) {
            return false;
        }
        match self.uploads.get_mut(id) {
            Some(upload) if upload.is_pending() => {
                upload.cancelled = true;
                self.queue.remove(upload.scheduled_time, *id);
                true
            }
            _ => false,
        }
    }

    /// 取消所有未在进行中的待上传记录
    pub fn cancel_all_pending(&mut self) -> Vec<UploadId> {
        let in_flight = self.in_flight;
        let mut cancelled = Vec::new();

        for id in &self.order {
            if Some(*id) == in_flight {
                continue;
            }
            if let Some(upload) = self.uploads.get_mut(id) {
                if upload.is_pending() {
                    upload.cancelled = true;
                    self.queue.remove(upload.scheduled_time, *id);
                    cancelled.push(*id);
                }
            }
        }

        cancelled
    }

    /// 部分更新元数据，已上传的记录不可修改
    pub fn update_metadata(&mut self, id: &UploadId, update: MetadataUpdate) -> bool {
        match self.uploads.get_mut(id) {
            Some(upload) if !upload.uploaded => {
                if let Some(title) = update.title {
                    upload.title = title;
                }
                if let Some(description) = update.description {
                    upload.description = description;
                }
                if let Some(tags) = update.tags {
                    upload.tags = tags;
                }
                true
            }
            _ => false,
        }
    }

    fn release(&mut self, id: UploadId) {
        if self.in_flight == Some(id) {
            self.in_flight = None;
        }
    }
}

fn fill_empty(upload: &mut ScheduledUpload, generated: &GeneratedMetadata) {
    if upload.title.is_empty() {
        upload.title = generated.title.clone();
    }
    if upload.description.is_empty() {
        upload.description = generated.description.clone();
    }
    if upload.tags.is_empty() {
        upload.tags = generated.tags.clone();
    }
}
