use serde::{Deserialize, Serialize};

/// 内容块类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockType {
    Heading,
    Paragraph,
    Code,
    List,
    ListItem,
    Blockquote,
    Link,
    ImageAlt,
    Table,
    Ad,
    Nav,
    Interactive,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heading => "heading",
            Self::Paragraph => "paragraph",
            Self::Code => "code",
            Self::List => "list",
            Self::ListItem => "list-item",
            Self::Blockquote => "blockquote",
            Self::Link => "link",
            Self::ImageAlt => "image-alt",
            Self::Table => "table",
            Self::Ad => "ad",
            Self::Nav => "nav",
            Self::Interactive => "interactive",
        }
    }

    /// 类型切换时播报的标签；不在表中的类型不播报
    pub fn label(&self) -> Option<&'static str> {
        match self {
            Self::Heading => Some("Heading"),
            Self::Code => Some("Code block"),
            Self::Blockquote => Some("Block quote"),
            Self::List => Some("List"),
            Self::ListItem => Some("List item"),
            Self::ImageAlt => Some("Image"),
            Self::Table => Some("Table"),
            _ => None,
        }
    }
}

/// 内容块优先级：0=广告，1=导航，2=普通，3=正文
pub mod priority {
    pub const AD: u8 = 0;
    pub const NAV: u8 = 1;
    pub const NORMAL: u8 = 2;
    pub const MAIN: u8 = 3;
}

/// 内容块的描述性属性，不参与控制流
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMetadata {
    pub tag_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

/// Content Block（内容块）
/// 朗读的最小单元，创建后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlock {
    pub id: String,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    /// 已按类型格式化、可直接朗读的文本，进入队列时从不为空
    pub text: String,
    /// 指回源节点的 CSS 路径，页面变化后可能失效
    pub locator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub priority: u8,
    pub metadata: BlockMetadata,
}

/// TTS 引擎类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TtsEngineType {
    #[default]
    WebSpeech,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "elevenlabs")]
    ElevenLabs,
}

impl TtsEngineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebSpeech => "web-speech",
            Self::OpenAi => "openai",
            Self::ElevenLabs => "elevenlabs",
        }
    }
}

/// 语音
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub language: String,
    pub provider: TtsEngineType,
}

/// 单次朗读参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechOptions {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub language: String,
    pub voice: Option<Voice>,
}

impl Default for SpeechOptions {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            language: "en-US".to_string(),
            voice: None,
        }
    }
}

/// 朗读模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadingMode {
    FullPage,
    Selector,
    #[default]
    Idle,
}

/// 朗读进度
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingProgress {
    pub current_index: usize,
    pub total_blocks: usize,
    pub percentage: f64,
}

impl ReadingProgress {
    pub fn at(current_index: usize, total_blocks: usize) -> Self {
        let percentage = if total_blocks > 0 {
            (current_index + 1) as f64 / total_blocks as f64 * 100.0
        } else {
            0.0
        };
        Self {
            current_index,
            total_blocks,
            percentage,
        }
    }
}
