use crate::content::{ContentExtractor, PageDocument};
use crate::error::{ReaderError, Result, SpeechError, SpeechResult};
use crate::playback::queue::{transition, ReadingQueue};
use crate::playback::state::{PlaybackState, SessionState, StatusSnapshot};
use crate::settings::AccessiReaderSettings;
use crate::tts::{SpeechBackend, Utterance};
use crate::types::{BlockType, ContentBlock, ReadingMode, SpeechOptions};
use futures::future::BoxFuture;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::watch;

/// 日志中块文本预览的长度
const PREVIEW_CHARS: usize = 60;

/// 宿主视图能力：滚动与高亮当前块
///
/// 两者都是尽力而为，定位器失效时返回的错误只记录日志
pub trait Viewport: Send + Sync {
    fn scroll_into_view(&self, locator: &str) -> Result<()>;

    /// 高亮定位器指向的节点；None 清除高亮
    fn highlight(&self, _locator: Option<&str>) -> Result<()> {
        Ok(())
    }
}

/// 一次朗读会话的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationOutcome {
    /// 队列自然耗尽
    Completed,
    /// 被 stop、跳转或新会话打断
    Interrupted,
}

/// 朗读驱动
///
/// 第一段语音在创建时已经发出；await（或 spawn）它来驱动后续块。
/// 丢弃它只会停止推进，不会停止正在播放的语音。
#[must_use = "narration only advances past the first block while it is polled"]
pub struct Narration {
    inner: BoxFuture<'static, NarrationOutcome>,
}

impl Future for Narration {
    type Output = NarrationOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().inner.as_mut().poll(cx)
    }
}

/// 一个块要说的话：先说 `first`，结束后再说 `then`
struct SpeechPlan {
    first: String,
    then: Option<String>,
    options: SpeechOptions,
}

/// 开始一个块时对宿主视图的动作
struct ViewUpdate {
    scroll: Option<String>,
    highlight: Option<String>,
}

/// 单个块的朗读步骤：已发出的第一段语音，以及其后要读的正文
struct BlockStep {
    first: Utterance,
    then: Option<String>,
    options: SpeechOptions,
}

enum Step {
    Speak(BlockStep),
    /// 暂停中未发出的语音；None 表示恢复后取下一个块
    Held(Option<SpeechPlan>),
    Exhausted,
    Stale,
}

struct Inner {
    queue: ReadingQueue,
    session: SessionState,
    settings: AccessiReaderSettings,
}

struct Shared {
    inner: Mutex<Inner>,
    backend: Mutex<Arc<dyn SpeechBackend>>,
    viewport: Mutex<Option<Arc<dyn Viewport>>>,
    /// 每次 start / stop / 跳转递增；旧的驱动发现不一致即退出
    generation: AtomicU64,
    state_tx: watch::Sender<PlaybackState>,
}

/// Playback Sequencer
/// 独占队列和当前语音后端，驱动逐块朗读
///
/// 状态：idle → playing ⇄ paused → idle。发出语音与检查会话代次都在
/// 同一把锁内完成，stop 之后不会再有新的语音发出。
#[derive(Clone)]
pub struct Sequencer {
    shared: Arc<Shared>,
}

impl Sequencer {
    pub fn new(backend: Arc<dyn SpeechBackend>) -> Self {
        let (state_tx, _) = watch::channel(PlaybackState::Idle);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    queue: ReadingQueue::new(),
                    session: SessionState::default(),
                    settings: AccessiReaderSettings::default(),
                }),
                backend: Mutex::new(backend),
                viewport: Mutex::new(None),
                generation: AtomicU64::new(0),
                state_tx,
            }),
        }
    }

    /// 朗读整页
    ///
    /// 抽取、过滤后替换队列，并在本次调用内发出第一段语音
    ///
    /// # 返回
    /// 驱动后续块的 `Narration`；过滤后无内容时返回 `NothingToRead`，不创建队列
    pub fn start_full_page(
        &self,
        extractor: &ContentExtractor,
        page: &PageDocument,
        settings: &AccessiReaderSettings,
    ) -> Result<Narration> {
        let blocks = extractor.extract_all(page);
        let extracted = blocks.len();
        let blocks = extractor.filter_by_settings(blocks, settings);
        tracing::info!(
            "extracted {} blocks, {} after filtering",
            extracted,
            blocks.len()
        );

        if blocks.is_empty() {
            return Err(ReaderError::NothingToRead);
        }
        self.start(blocks, ReadingMode::FullPage, settings)
    }

    /// 朗读用户选中的块（不做抽取）
    pub fn start_selection(
        &self,
        blocks: &[ContentBlock],
        settings: &AccessiReaderSettings,
    ) -> Result<Narration> {
        if blocks.is_empty() {
            return Err(ReaderError::NoSelection);
        }
        self.start(blocks.to_vec(), ReadingMode::Selector, settings)
    }

    /// 开始新会话；正在进行的会话会先被停止
    pub fn start(
        &self,
        blocks: Vec<ContentBlock>,
        mode: ReadingMode,
        settings: &AccessiReaderSettings,
    ) -> Result<Narration> {
        if blocks.is_empty() {
            return Err(match mode {
                ReadingMode::Selector => ReaderError::NoSelection,
                _ => ReaderError::NothingToRead,
            });
        }

        let generation = {
            let mut inner = self.lock();
            let generation = self.bump_generation();
            let total = blocks.len();
            inner.settings = settings.clone();
            inner.queue.replace(blocks);
            inner.session.start(mode, total);
            self.set_playback(&mut inner, PlaybackState::Playing);
            generation
        };
        self.backend().stop();

        tracing::info!("reading session started ({:?})", mode);
        let step = self.begin_block(generation);
        Ok(self.drive(generation, step))
    }

    /// 暂停；不在播放状态时返回 false
    pub fn pause(&self) -> bool {
        {
            let mut inner = self.lock();
            if inner.session.playback != PlaybackState::Playing {
                return false;
            }
            self.set_playback(&mut inner, PlaybackState::Paused);
        }
        self.backend().pause();
        tracing::debug!("reading paused");
        true
    }

    /// 从暂停处继续同一段语音；不在暂停状态时返回 false
    pub fn resume(&self) -> bool {
        {
            let mut inner = self.lock();
            if inner.session.playback != PlaybackState::Paused {
                return false;
            }
            self.set_playback(&mut inner, PlaybackState::Playing);
        }
        self.backend().resume();
        tracing::debug!("reading resumed");
        true
    }

    /// 停止：立即取消语音，清空队列并重置会话状态
    pub fn stop(&self) {
        {
            let mut inner = self.lock();
            self.bump_generation();
            inner.queue.clear();
            inner.session.reset();
            self.set_playback(&mut inner, PlaybackState::Idle);
        }
        self.backend().stop();
        self.highlight(None);
        tracing::info!("reading stopped");
    }

    /// 跳到下一个块
    ///
    /// # 返回
    /// 新的朗读驱动；没有进行中的会话时返回 None
    pub fn next_block(&self) -> Option<Narration> {
        let generation = self.interrupt(|_| {})?;
        let step = self.begin_block(generation);
        Some(self.drive(generation, step))
    }

    /// 回到上一个块
    ///
    /// 游标指向正在朗读的块，因此后退两次再由正常推进前进一次；
    /// 在前两个块上时从第一个块重新开始
    pub fn previous_block(&self) -> Option<Narration> {
        let generation = self.interrupt(|queue| match queue.current_index() {
            Some(index) if index >= 2 => {
                queue.previous();
                queue.previous();
            }
            _ => queue.rewind(),
        })?;
        let step = self.begin_block(generation);
        Some(self.drive(generation, step))
    }

    pub fn status(&self) -> StatusSnapshot {
        self.lock().session.snapshot()
    }

    pub fn state(&self) -> PlaybackState {
        *self.shared.state_tx.borrow()
    }

    pub fn current_block(&self) -> Option<ContentBlock> {
        self.lock().session.current_block.clone()
    }

    /// 订阅播放状态变化
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.shared.state_tx.subscribe()
    }

    /// 替换语音后端
    ///
    /// 旧后端先停止再丢弃；进行中的会话随之结束
    pub fn set_backend(&self, backend: Arc<dyn SpeechBackend>) {
        if self.state() != PlaybackState::Idle {
            self.stop();
        }
        let previous = {
            let mut slot = self.shared.backend.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *slot, backend)
        };
        previous.stop();
        tracing::info!("speech backend switched to {}", self.backend().engine_type().as_str());
    }

    pub fn backend(&self) -> Arc<dyn SpeechBackend> {
        self.shared
            .backend
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 更新设置快照，从下一个块开始生效
    pub fn update_settings(&self, settings: AccessiReaderSettings) {
        self.lock().settings = settings;
    }

    pub fn set_viewport(&self, viewport: Option<Arc<dyn Viewport>>) {
        *self.shared.viewport.lock().unwrap_or_else(|e| e.into_inner()) = viewport;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump_generation(&self) -> u64 {
        self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.shared.generation.load(Ordering::SeqCst) == generation
    }

    fn set_playback(&self, inner: &mut Inner, state: PlaybackState) {
        inner.session.playback = state;
        self.shared.state_tx.send_replace(state);
    }

    /// 打断当前块以便跳转
    ///
    /// 在锁内推进代次并调整队列游标，然后取消正在播放的语音
    fn interrupt(&self, reposition: impl FnOnce(&mut ReadingQueue)) -> Option<u64> {
        let generation = {
            let mut inner = self.lock();
            if inner.session.playback == PlaybackState::Idle {
                return None;
            }
            let generation = self.bump_generation();
            reposition(&mut inner.queue);
            self.set_playback(&mut inner, PlaybackState::Playing);
            generation
        };
        self.backend().stop();
        Some(generation)
    }

    /// 开始朗读下一个块
    ///
    /// 取出下一个块、滚动到可见区域、决定是否先播报类型，然后同步发出第一段语音。
    /// 滚动在锁外进行，视图回调可以再调用序列器。
    fn begin_block(&self, generation: u64) -> Step {
        let (plan, view) = {
            let mut inner = self.lock();
            match self.turn(&inner, generation) {
                PlaybackState::Playing => {}
                PlaybackState::Paused => return Step::Held(None),
                PlaybackState::Idle => return Step::Stale,
            }
            let Some(planned) = self.plan_next(&mut inner) else {
                return Step::Exhausted;
            };
            planned
        };

        if let Some(locator) = &view.scroll {
            self.scroll_to(locator);
        }
        if let Some(locator) = &view.highlight {
            self.highlight(Some(locator));
        }
        self.speak_plan(generation, plan)
    }

    /// 推进队列并决定下一个块怎么读
    ///
    /// # 返回
    /// 朗读计划和视图动作；队列耗尽时为 None
    fn plan_next(&self, inner: &mut Inner) -> Option<(SpeechPlan, ViewUpdate)> {
        let previous = inner.queue.current().cloned();
        let block = inner.queue.next().cloned()?;
        let index = inner.queue.current_index().unwrap_or(0);
        let total = inner.queue.len();
        inner.session.set_current(block.clone(), index, total);

        tracing::info!(
            "reading block {}/{} [{}]: {}",
            index + 1,
            total,
            block.block_type.as_str(),
            preview(&block.text)
        );

        let settings = &inner.settings;
        let view = ViewUpdate {
            scroll: settings.auto_scroll.then(|| block.locator.clone()),
            highlight: settings.highlight_current.then(|| block.locator.clone()),
        };

        let announcement = transition(previous.as_ref(), &block);
        let announce = !announcement.is_empty()
            && match block.block_type {
                BlockType::Heading => settings.announce_headings,
                BlockType::Code => settings.announce_code_blocks,
                BlockType::Paragraph => false,
                _ => true,
            };

        let options = settings.speech_options();
        let plan = if announce {
            SpeechPlan {
                first: announcement,
                then: Some(block.text),
                options,
            }
        } else {
            SpeechPlan {
                first: block.text,
                then: None,
                options,
            }
        };
        Some((plan, view))
    }

    /// 仅在本会话处于播放状态时发出语音
    ///
    /// 锁内发出：stop 必须等这次 speak 返回后才能取消它；暂停时保留计划
    fn speak_plan(&self, generation: u64, plan: SpeechPlan) -> Step {
        let inner = self.lock();
        match self.turn(&inner, generation) {
            PlaybackState::Playing => Step::Speak(BlockStep {
                first: self.backend().speak(&plan.first, &plan.options),
                then: plan.then,
                options: plan.options,
            }),
            PlaybackState::Paused => Step::Held(Some(plan)),
            PlaybackState::Idle => Step::Stale,
        }
    }

    /// 本会话眼下的播放状态；已被取代的会话视为 idle
    fn turn(&self, inner: &Inner, generation: u64) -> PlaybackState {
        if self.is_current(generation) {
            inner.session.playback
        } else {
            PlaybackState::Idle
        }
    }

    /// 当前视图；克隆出来后再回调，不持有任何锁
    fn viewport(&self) -> Option<Arc<dyn Viewport>> {
        self.shared
            .viewport
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn scroll_to(&self, locator: &str) {
        if let Some(viewport) = self.viewport() {
            if let Err(e) = viewport.scroll_into_view(locator) {
                tracing::debug!("could not scroll to {}: {}", locator, e);
            }
        }
    }

    fn highlight(&self, locator: Option<&str>) {
        if let Some(viewport) = self.viewport() {
            if let Err(e) = viewport.highlight(locator) {
                tracing::debug!("could not highlight {:?}: {}", locator, e);
            }
        }
    }

    fn drive(&self, generation: u64, step: Step) -> Narration {
        let sequencer = self.clone();
        Narration {
            inner: Box::pin(async move { sequencer.narrate(generation, step).await }),
        }
    }

    /// 朗读循环
    ///
    /// 每轮等待一段语音结束，再检查会话状态决定是否继续。
    /// 语音失败只记录日志，不中断会话。
    async fn narrate(self, generation: u64, mut step: Step) -> NarrationOutcome {
        loop {
            let block = match step {
                Step::Speak(block) => block,
                Step::Held(plan) => {
                    if !self.wait_until_playing(generation).await {
                        return NarrationOutcome::Interrupted;
                    }
                    step = match plan {
                        Some(plan) => self.speak_plan(generation, plan),
                        None => self.begin_block(generation),
                    };
                    continue;
                }
                Step::Exhausted => return self.finish(generation),
                Step::Stale => return NarrationOutcome::Interrupted,
            };

            log_speech_result(block.first.await);
            if !self.wait_until_playing(generation).await {
                return NarrationOutcome::Interrupted;
            }

            step = match block.then {
                Some(text) => self.speak_plan(
                    generation,
                    SpeechPlan {
                        first: text,
                        then: None,
                        options: block.options,
                    },
                ),
                None => self.begin_block(generation),
            };
        }
    }

    /// 暂停时挂起，直到恢复播放
    ///
    /// # 返回
    /// 会话仍在播放时为 true；已停止或被新会话取代时为 false
    async fn wait_until_playing(&self, generation: u64) -> bool {
        let mut state_rx = self.shared.state_tx.subscribe();
        loop {
            if !self.is_current(generation) {
                return false;
            }
            let state = *state_rx.borrow_and_update();
            match state {
                PlaybackState::Playing => return true,
                PlaybackState::Idle => return false,
                PlaybackState::Paused => {}
            }
            if state_rx.changed().await.is_err() {
                return false;
            }
        }
    }

    /// 队列耗尽：自然结束，回到 idle
    fn finish(&self, generation: u64) -> NarrationOutcome {
        {
            let mut inner = self.lock();
            if !self.is_current(generation) {
                return NarrationOutcome::Interrupted;
            }
            inner.queue.clear();
            inner.session.reset();
            self.set_playback(&mut inner, PlaybackState::Idle);
        }
        self.highlight(None);
        tracing::info!("finished reading");
        NarrationOutcome::Completed
    }
}

fn log_speech_result(result: SpeechResult<()>) {
    match result {
        Ok(()) => {}
        Err(SpeechError::Cancelled) => tracing::debug!("utterance cancelled"),
        Err(e) => tracing::warn!("speech failed, continuing with next block: {}", e),
    }
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}
