// TTS 模块
// 可插拔的语音合成后端：设备语音与云端语音

pub mod device;
pub mod cloud;

use crate::error::SpeechResult;
use crate::settings::AccessiReaderSettings;
use crate::types::{SpeechOptions, TtsEngineType, Voice};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

pub use cloud::{AudioSink, CloudProvider, CloudSpeech};
pub use device::{DeviceSpeech, TracingSink, UtteranceSink};

/// 一次朗读的完成信号
///
/// 创建时语音已经发出；await 只等待其结束。
pub struct Utterance(BoxFuture<'static, SpeechResult<()>>);

impl Utterance {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = SpeechResult<()>> + Send + 'static,
    {
        Self(Box::pin(future))
    }

    /// 立即完成的朗读（空文本或立即失败）
    pub fn ready(result: SpeechResult<()>) -> Self {
        Self::new(futures::future::ready(result))
    }
}

impl Future for Utterance {
    type Output = SpeechResult<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().0.as_mut().poll(cx)
    }
}

/// 语音后端能力
///
/// `speak` 必须在调用栈内同步发出语音，再返回完成信号；
/// `stop` 幂等，没有活动语音时也可调用。
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    fn engine_type(&self) -> TtsEngineType;

    fn speak(&self, text: &str, options: &SpeechOptions) -> Utterance;

    fn pause(&self);

    fn resume(&self);

    fn stop(&self);

    async fn list_voices(&self) -> Vec<Voice>;

    fn is_available(&self) -> bool;
}

/// 宿主平台提供的输出通道
#[derive(Clone)]
pub struct SpeechPlatform {
    /// 设备语音合成
    pub utterances: Arc<dyn UtteranceSink>,
    /// 云端音频播放
    pub audio: Arc<dyn AudioSink>,
}

impl SpeechPlatform {
    pub fn new(utterances: Arc<dyn UtteranceSink>, audio: Arc<dyn AudioSink>) -> Self {
        Self { utterances, audio }
    }
}

/// 按设置创建语音后端
///
/// 空字符串形式的 API key 视为未配置
pub fn create_backend(
    settings: &AccessiReaderSettings,
    platform: &SpeechPlatform,
) -> Arc<dyn SpeechBackend> {
    let key = |k: &Option<String>| k.clone().filter(|k| !k.trim().is_empty());

    tracing::info!("creating {} speech backend", settings.tts_engine.as_str());
    match settings.tts_engine {
        TtsEngineType::WebSpeech => Arc::new(DeviceSpeech::new(platform.utterances.clone())),
        TtsEngineType::OpenAi => Arc::new(CloudSpeech::new(
            CloudProvider::OpenAi,
            key(&settings.openai_api_key),
            settings.openai_model.clone(),
            platform.audio.clone(),
        )),
        TtsEngineType::ElevenLabs => Arc::new(CloudSpeech::new(
            CloudProvider::ElevenLabs,
            key(&settings.elevenlabs_api_key),
            None,
            platform.audio.clone(),
        )),
    }
}

/// 取消不是错误：被打断的语音视为正常结束
pub(crate) fn settle(result: SpeechResult<()>) -> SpeechResult<()> {
    match result {
        Err(crate::error::SpeechError::Cancelled) => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpeechError;

    fn platform() -> SpeechPlatform {
        let sink = Arc::new(TracingSink::new());
        SpeechPlatform::new(sink.clone(), sink)
    }

    #[test]
    fn test_create_backend_by_engine() {
        let mut settings = AccessiReaderSettings::default();
        let backend = create_backend(&settings, &platform());
        assert_eq!(backend.engine_type(), TtsEngineType::WebSpeech);
        assert!(backend.is_available());

        settings.tts_engine = TtsEngineType::OpenAi;
        settings.openai_api_key = Some("   ".to_string());
        let backend = create_backend(&settings, &platform());
        assert_eq!(backend.engine_type(), TtsEngineType::OpenAi);
        assert!(!backend.is_available());

        settings.tts_engine = TtsEngineType::ElevenLabs;
        settings.elevenlabs_api_key = Some("key".to_string());
        let backend = create_backend(&settings, &platform());
        assert_eq!(backend.engine_type(), TtsEngineType::ElevenLabs);
        assert!(backend.is_available());
    }

    #[tokio::test]
    async fn test_ready_utterance() {
        assert!(Utterance::ready(Ok(())).await.is_ok());
        let failed = Utterance::ready(Err(SpeechError::Unavailable)).await;
        assert!(matches!(failed, Err(SpeechError::Unavailable)));
    }

    #[test]
    fn test_settle_treats_cancel_as_done() {
        assert!(settle(Err(SpeechError::Cancelled)).is_ok());
        assert!(settle(Err(SpeechError::Playback("x".to_string()))).is_err());
    }
}
