use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{Client, Response, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};
use url::Url;
use crate::config::SchedulerConfig;
use crate::core::{AccountContext, ProgressReporter, RemoteError, RemoteUploader, UploadRequest};

/// 分块大小必须是它的整数倍，最后一块除外
const CHUNK_GRANULARITY: usize = 256 * 1024;
const RESUME_INCOMPLETE: u16 = 308;

/// 可续传会话的状态
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    /// 服务器期望的下一个字节
    Offset(u64),
    /// 上传完成，远程视频 id
    Done(String),
}

/// YouTube Data API 可续传上传器
///
/// 失败后会话会保留，同一账号同一文件的下一次尝试从服务器记录的位置继续。
pub struct YouTubeUploader {
    client: Client,
    endpoint: String,
    chunk_size: usize,
    sessions: Mutex<HashMap<(String, PathBuf), String>>,
}

impl YouTubeUploader {
    pub fn new(endpoint: &str, chunk_size: usize) -> Self {
        // 向下取整到协议粒度，至少一个单位
        let chunk_size = (chunk_size / CHUNK_GRANULARITY).max(1) * CHUNK_GRANULARITY;
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            chunk_size,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(&config.api_endpoint, config.chunk_size)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn session_key(account: &AccountContext, path: &Path) -> (String, PathBuf) {
        (account.account_id.clone(), path.to_path_buf())
    }

    fn cached_session(&self, key: &(String, PathBuf)) -> Option<String> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn remember_session(&self, key: (String, PathBuf), session_url: String) {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, session_url);
    }

    fn forget_session(&self, key: &(String, PathBuf)) {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
    }

    /// 创建可续传会话，返回会话 URL
    async fn start_session(
        &self,
        account: &AccountContext,
        request: &UploadRequest,
        file_size: u64,
    ) -> Result<String, RemoteError> {
        let notify = if request.notify_subscribers { "true" } else { "false" };
        let url = Url::parse_with_params(
            &self.endpoint,
            &[
                ("uploadType", "resumable"),
                ("part", "snippet,status"),
                ("notifySubscribers", notify),
            ],
        )
        .map_err(|err| RemoteError::permanent(format!("Invalid endpoint {}: {}", self.endpoint, err)))?;

        let body = serde_json::json!({
            "snippet": {
                "title": request.title,
                "description": request.description,
                "tags": request.tags,
                "categoryId": request.category_id,
            },
            "status": {
                "privacyStatus": request.privacy_status.as_str(),
                "selfDeclaredMadeForKids": false,
            },
        });

        let response = self
            .client
            .post(url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", account.credentials.bearer_token()))
            .header("X-Upload-Content-Length", file_size.to_string())
            .header("X-Upload-Content-Type", "video/*")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "Failed to start upload session").await);
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| RemoteError::transient("No 'location' header in session response"))?;

        let session_url = url
            .join(location)
            .map_err(|err| RemoteError::permanent(format!("Invalid session url {}: {}", location, err)))?;

        debug!("Upload session started for {}", request.file_path.display());
        Ok(session_url.to_string())
    }

    /// 查询服务器已收到的字节数
    async fn query_session(&self, session_url: &str, file_size: u64) -> Result<SessionState, RemoteError> {
        let response = self
            .client
            .put(session_url)
            .header(CONTENT_RANGE, format!("bytes */{}", file_size))
            .header(CONTENT_LENGTH, "0")
            .send()
            .await?;

        self.session_state(response).await
    }

    async fn upload_chunk(
        &self,
        session_url: &str,
        file: &mut File,
        offset: u64,
        file_size: u64,
    ) -> Result<SessionState, RemoteError> {
        let len = chunk_len(offset, file_size, self.chunk_size).ok_or_else(|| {
            RemoteError::permanent(format!("Server offset {} is past the end of {} bytes", offset, file_size))
        })?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        let mut buffer = Vec::with_capacity(len as usize);
        (&mut *file).take(len).read_to_end(&mut buffer).await?;

        if buffer.is_empty() {
            return Err(RemoteError::permanent(format!(
                "File ended at {} of {} bytes",
                offset, file_size
            )));
        }

        let end = offset + buffer.len() as u64 - 1;
        let response = self
            .client
            .put(session_url)
            .header(CONTENT_RANGE, format!("bytes {}-{}/{}", offset, end, file_size))
            .header(CONTENT_TYPE, "video/*")
            .body(buffer)
            .send()
            .await?;

        self.session_state(response).await
    }

    async fn session_state(&self, response: Response) -> Result<SessionState, RemoteError> {
        let status = response.status();
        if status.as_u16() == RESUME_INCOMPLETE {
            let offset = parse_range_end(response.headers()).map_or(0, |end| end + 1);
            return Ok(SessionState::Offset(offset));
        }

        if status == StatusCode::OK || status == StatusCode::CREATED {
            let value: serde_json::Value = response.json().await?;
            let video_id = value["id"]
                .as_str()
                .ok_or_else(|| RemoteError::permanent("No 'id' in upload response"))?;
            return Ok(SessionState::Done(video_id.to_string()));
        }

        Err(error_from_response(response, "Chunk upload failed").await)
    }
}

#[async_trait]
impl RemoteUploader for YouTubeUploader {
    async fn upload(
        &self,
        account: &AccountContext,
        request: &UploadRequest,
        progress: &ProgressReporter,
    ) -> Result<String, RemoteError> {
        let file_size = tokio::fs::metadata(&request.file_path)
            .await
            .map_err(|err| RemoteError::permanent(format!("{}: {}", request.file_path.display(), err)))?
            .len();
        if file_size == 0 {
            return Err(RemoteError::permanent("Refusing to upload an empty file"));
        }

        let key = Self::session_key(account, &request.file_path);
        let mut state = None;

        if let Some(session_url) = self.cached_session(&key) {
            match self.query_session(&session_url, file_size).await {
                Ok(resumed) => {
                    info!("Resuming upload of {} at {:?}", request.file_path.display(), resumed);
                    state = Some((session_url, resumed));
                }
                Err(err) if err.is_transient() => return Err(err),
                Err(err) => {
                    warn!("Discarding expired upload session: {}", err);
                    self.forget_session(&key);
                }
            }
        }

        let (session_url, mut state) = match state {
            Some(resumed) => resumed,
            None => {
                let session_url = self.start_session(account, request, file_size).await?;
                self.remember_session(key.clone(), session_url.clone());
                (session_url, SessionState::Offset(0))
            }
        };

        let mut file = File::open(&request.file_path).await?;
        loop {
            match state {
                SessionState::Done(video_id) => {
                    self.forget_session(&key);
                    progress.report(100.0);
                    return Ok(video_id);
                }
                SessionState::Offset(offset) => {
                    progress.report_bytes(offset, file_size);
                    let next = match self.upload_chunk(&session_url, &mut file, offset, file_size).await {
                        Ok(next) => next,
                        Err(err) => {
                            if !err.is_transient() {
                                self.forget_session(&key);
                            }
                            return Err(err);
                        }
                    };
                    if next == SessionState::Offset(offset) {
                        return Err(RemoteError::transient(format!("No progress at offset {}", offset)));
                    }
                    state = next;
                }
            }
        }
    }
}

/// 从 offset 开始的下一块长度，offset 不在文件内时返回 None
fn chunk_len(offset: u64, file_size: u64, chunk_size: usize) -> Option<u64> {
    if offset >= file_size {
        return None;
    }
    Some((file_size - offset).min(chunk_size as u64))
}

/// 从 `Range: bytes=0-N` 头解析最后一个字节的下标
fn parse_range_end(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(RANGE)?.to_str().ok()?;
    let (_, end) = value.trim().strip_prefix("bytes=")?.split_once('-')?;
    end.trim().parse().ok()
}

async fn error_from_response(response: Response, context: &str) -> RemoteError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let detail: String = body.chars().take(300).collect();
    if detail.is_empty() {
        RemoteError::from_status(status, context)
    } else {
        RemoteError::from_status(status, format!("{}: {}", context, detail))
    }
}
