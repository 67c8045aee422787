use crate::error::Result;
use crate::types::{SpeechOptions, TtsEngineType, Voice};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 内容过滤设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentFilterSettings {
    pub include_images: bool,
    pub include_tables: bool,
    pub include_blockquotes: bool,
    pub include_links: bool,
    pub max_code_block_length: usize,
}

impl Default for ContentFilterSettings {
    fn default() -> Self {
        Self {
            include_images: true,
            include_tables: true,
            include_blockquotes: true,
            include_links: false,
            max_code_block_length: 500,
        }
    }
}

/// 用户偏好设置
///
/// 对核心只读：每次抽取或朗读调用时传入快照，核心从不持久化它。
/// 缺失的字段按默认值补齐，因此部分 JSON 也能解析。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessiReaderSettings {
    pub tts_engine: TtsEngineType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevenlabs_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_model: Option<String>,
    pub voice_id: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub language: String,
    pub auto_scroll: bool,
    pub highlight_current: bool,
    pub skip_ads: bool,
    pub skip_nav: bool,
    pub skip_code: bool,
    pub announce_headings: bool,
    pub announce_code_blocks: bool,
    pub content_filter: ContentFilterSettings,
}

impl Default for AccessiReaderSettings {
    fn default() -> Self {
        Self {
            tts_engine: TtsEngineType::WebSpeech,
            openai_api_key: None,
            elevenlabs_api_key: None,
            openai_model: None,
            voice_id: String::new(),
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            language: "pt-BR".to_string(),
            auto_scroll: true,
            highlight_current: true,
            skip_ads: true,
            skip_nav: true,
            skip_code: true,
            announce_headings: true,
            announce_code_blocks: true,
            content_filter: ContentFilterSettings::default(),
        }
    }
}

impl AccessiReaderSettings {
    /// 从 JSON 字符串解析设置
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// 从文件加载设置
    ///
    /// 文件不存在时返回默认设置
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("settings file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// 合并部分更新
    ///
    /// # 参数
    /// - `partial`: 只包含需要修改字段的 JSON 对象
    ///
    /// # 返回
    /// 合并后的新设置；原设置不变
    pub fn merge_json(&self, partial: &serde_json::Value) -> Result<Self> {
        let mut current = serde_json::to_value(self)?;
        merge_values(&mut current, partial);
        Ok(serde_json::from_value(current)?)
    }

    /// 恢复默认设置
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// 引擎或凭据变化时需要重建语音后端
    pub fn requires_new_backend(&self, other: &Self) -> bool {
        self.tts_engine != other.tts_engine
            || self.openai_api_key != other.openai_api_key
            || self.elevenlabs_api_key != other.elevenlabs_api_key
            || self.openai_model != other.openai_model
    }

    /// 构建单次朗读参数
    pub fn speech_options(&self) -> SpeechOptions {
        let voice = if self.voice_id.is_empty() {
            None
        } else {
            Some(Voice {
                id: self.voice_id.clone(),
                name: self.voice_id.clone(),
                language: self.language.clone(),
                provider: self.tts_engine,
            })
        };

        SpeechOptions {
            rate: self.rate,
            pitch: self.pitch,
            volume: self.volume,
            language: self.language.clone(),
            voice,
        }
    }
}

fn merge_values(target: &mut serde_json::Value, patch: &serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(target), serde_json::Value::Object(patch)) => {
            for (key, value) in patch {
                merge_values(
                    target.entry(key.clone()).or_insert(serde_json::Value::Null),
                    value,
                );
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}
