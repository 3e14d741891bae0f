use std::path::Path;
use async_trait::async_trait;
use crate::core::{GeneratedMetadata, MetadataGenerator, MetadataHints};

/// 根据文件名生成标题，没有配置内容识别生成器时使用
#[derive(Debug, Default, Clone, Copy)]
pub struct FilenameMetadata;

impl FilenameMetadata {
    pub fn new() -> Self {
        Self
    }

    /// `my_clip-final.mp4` -> `my clip final`，截断到 `max_len` 个字符
    pub fn title_for(path: &Path, max_len: usize) -> Option<String> {
        let stem = path.file_stem()?.to_string_lossy();
        let words: Vec<&str> = stem
            .split(|c: char| c == '_' || c == '-' || c == '.' || c.is_whitespace())
            .filter(|word| !word.is_empty())
            .collect();
        if words.is_empty() {
            return None;
        }

        let title: String = words.join(" ").chars().take(max_len.max(1)).collect();
        Some(title.trim_end().to_string())
    }
}

#[async_trait]
impl MetadataGenerator for FilenameMetadata {
    async fn generate(&self, file_path: &Path, hints: &MetadataHints) -> Result<GeneratedMetadata, String> {
        let title = Self::title_for(file_path, hints.max_title_length)
            .ok_or_else(|| format!("no usable file name in {}", file_path.display()))?;

        Ok(GeneratedMetadata {
            title,
            ..GeneratedMetadata::default()
        })
    }
}
