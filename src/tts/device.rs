use crate::content::text_processor::split_into_sentences;
use crate::tts::{settle, SpeechBackend, Utterance};
use crate::types::{SpeechOptions, TtsEngineType, Voice};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// 单次平台语音的目标最大长度（字符）
pub const MAX_CHUNK_LENGTH: usize = 250;

/// 平台语音合成通道
///
/// 对应宿主环境的 speechSynthesis：一次 utter 发出一段语音，
/// cancel 会让未完成的 Utterance 以 `SpeechError::Cancelled` 结束。
pub trait UtteranceSink: Send + Sync {
    fn utter(&self, text: &str, options: &SpeechOptions) -> Utterance;

    fn pause(&self);

    fn resume(&self);

    fn cancel(&self);

    fn voices(&self) -> Vec<Voice>;

    fn is_supported(&self) -> bool {
        true
    }
}

/// Device Speech
/// 设备语音后端：长文本按句子切块后依次发出
pub struct DeviceSpeech {
    sink: Arc<dyn UtteranceSink>,
    cancel: Mutex<CancellationToken>,
    max_chunk: usize,
}

impl DeviceSpeech {
    pub fn new(sink: Arc<dyn UtteranceSink>) -> Self {
        Self {
            sink,
            cancel: Mutex::new(CancellationToken::new()),
            max_chunk: MAX_CHUNK_LENGTH,
        }
    }

    pub fn with_max_chunk(mut self, max_chunk: usize) -> Self {
        self.max_chunk = max_chunk.max(1);
        self
    }

    fn fresh_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut slot = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        *slot = token.clone();
        token
    }
}

#[async_trait]
impl SpeechBackend for DeviceSpeech {
    fn engine_type(&self) -> TtsEngineType {
        TtsEngineType::WebSpeech
    }

    fn speak(&self, text: &str, options: &SpeechOptions) -> Utterance {
        self.stop();
        let token = self.fresh_token();

        let mut chunks = chunk_text(text, self.max_chunk).into_iter();
        let Some(first) = chunks.next() else {
            return Utterance::ready(Ok(()));
        };

        // 第一段必须在调用栈内发出
        let first = self.sink.utter(&first, options);
        let rest: Vec<String> = chunks.collect();
        let sink = self.sink.clone();
        let options = options.clone();

        Utterance::new(async move {
            settle(first.await)?;
            for chunk in rest {
                if token.is_cancelled() {
                    return Ok(());
                }
                settle(sink.utter(&chunk, &options).await)?;
            }
            Ok(())
        })
    }

    fn pause(&self) {
        self.sink.pause();
    }

    fn resume(&self) {
        self.sink.resume();
    }

    fn stop(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
        self.sink.cancel();
    }

    async fn list_voices(&self) -> Vec<Voice> {
        self.sink.voices()
    }

    fn is_available(&self) -> bool {
        self.sink.is_supported()
    }
}

/// 在句子边界切块
///
/// 相邻句子累积到不超过 `max_chunk` 个字符；单句超长时独占一块。
/// 拼接结果保持原顺序，不丢失也不重复。
pub fn chunk_text(text: &str, max_chunk: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in split_into_sentences(text) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        if !current.is_empty()
            && current.chars().count() + 1 + sentence.chars().count() > max_chunk
        {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(sentence);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// 只写日志的语音通道
///
/// 没有音频输出的环境（命令行、测试）使用，每段语音立即完成
#[derive(Debug, Default)]
pub struct TracingSink;

impl TracingSink {
    pub fn new() -> Self {
        Self
    }
}

impl UtteranceSink for TracingSink {
    fn utter(&self, text: &str, options: &SpeechOptions) -> Utterance {
        tracing::info!(language = %options.language, rate = options.rate, "speak: {}", text);
        Utterance::ready(Ok(()))
    }

    fn pause(&self) {
        tracing::debug!("speech paused");
    }

    fn resume(&self) {
        tracing::debug!("speech resumed");
    }

    fn cancel(&self) {
        tracing::debug!("speech cancelled");
    }

    fn voices(&self) -> Vec<Voice> {
        Vec::new()
    }
}
