use tokio::sync::broadcast;
use super::types::{ScheduleEvent, UploadId};

/// 单次上传的进度回调，交给远程上传器
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    upload_id: UploadId,
    event_tx: broadcast::Sender<ScheduleEvent>,
}

impl ProgressReporter {
    pub fn new(upload_id: UploadId, event_tx: broadcast::Sender<ScheduleEvent>) -> Self {
        Self { upload_id, event_tx }
    }

    pub fn upload_id(&self) -> UploadId {
        self.upload_id
    }

    /// 上报百分比，限制在 0..=100
    pub fn report(&self, percentage: f64) {
        let percentage = if percentage.is_finite() {
            percentage.clamp(0.0, 100.0)
        } else {
            0.0
        };
        self.event_tx
            .send(ScheduleEvent::Progress {
                id: self.upload_id,
                percentage,
            })
            .ok();
    }

    pub fn report_bytes(&self, uploaded: u64, total: u64) {
        if total == 0 {
            self.report(100.0);
        } else {
            self.report(uploaded as f64 / total as f64 * 100.0);
        }
    }
}
