use thiserror::Error;

/// 朗读器错误
///
/// 覆盖会话启动、设置解析与选择模式的失败情况。
/// 抽取阶段本身不会返回错误：无效选择器或游离节点一律视为“不匹配”。
#[derive(Debug, Error)]
pub enum ReaderError {
    /// 过滤之后没有任何可朗读的内容块
    #[error("no readable content found on this page")]
    NothingToRead,

    /// 选择模式下尚未选中任何元素
    #[error("no elements selected")]
    NoSelection,

    /// 跳转时没有进行中的朗读会话
    #[error("no active reading session")]
    NotReading,

    /// 暂停时并未在播放
    #[error("reading is not playing")]
    NotPlaying,

    /// 恢复时会话并未暂停
    #[error("reading is not paused")]
    NotPaused,

    /// 定位器无法解析到页面节点
    #[error("element not found: {locator}")]
    ElementNotFound { locator: String },

    /// 语音后端错误
    #[error("speech error: {0}")]
    Speech(#[from] SpeechError),

    /// 设置 JSON 无法解析
    #[error("invalid settings: {0}")]
    InvalidSettings(#[from] serde_json::Error),

    /// 读取设置或页面文件失败
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 语音后端错误
///
/// 对于朗读会话而言全部是非致命的：序列器记录日志后继续下一个块。
#[derive(Debug, Error)]
pub enum SpeechError {
    /// 云端后端缺少 API key，直接失败而不发起网络请求
    #[error("API key required for {provider}")]
    CredentialsRequired { provider: String },

    /// HTTP 请求失败
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// 云端接口返回非 2xx 状态
    #[error("{provider} TTS error: {status}")]
    Api { provider: String, status: u16 },

    /// 平台播放失败
    #[error("playback failed: {0}")]
    Playback(String),

    /// 语音被取消（stop 或新的 speak 打断）
    #[error("speech cancelled")]
    Cancelled,

    /// 当前平台不支持该后端
    #[error("speech backend unavailable")]
    Unavailable,
}

/// 朗读器操作结果
pub type Result<T> = std::result::Result<T, ReaderError>;

/// 语音操作结果
pub type SpeechResult<T> = std::result::Result<T, SpeechError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_message_names_provider() {
        let err = SpeechError::CredentialsRequired {
            provider: "openai".to_string(),
        };
        assert_eq!(err.to_string(), "API key required for openai");
    }

    #[test]
    fn test_speech_error_converts_into_reader_error() {
        let err: ReaderError = SpeechError::Unavailable.into();
        assert!(matches!(err, ReaderError::Speech(SpeechError::Unavailable)));
    }
}
