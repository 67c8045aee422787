use crate::content::{ContentExtractor, PageDocument};
use crate::error::{ReaderError, Result};
use crate::playback::{Narration, SelectionState, Sequencer, StatusSnapshot, Viewport};
use crate::settings::AccessiReaderSettings;
use crate::tts::{create_backend, SpeechPlatform};
use crate::types::ContentBlock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 外部消息层转发来的命令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    StartReading,
    StopReading,
    PauseReading,
    ResumeReading,
    NextBlock,
    PrevBlock,
    ReadSelection,
    GetStatus,
    ActivateSelector,
    DeactivateSelector,
    SelectElement { locator: String },
    ClearSelection,
    SettingsUpdated(serde_json::Value),
}

/// 命令应答
///
/// GET_STATUS 时附带状态快照（与 success 平铺在同一层）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub status: Option<StatusSnapshot>,
}

impl CommandResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            status: None,
        }
    }

    pub fn failed(error: &ReaderError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            status: None,
        }
    }

    pub fn with_status(status: StatusSnapshot) -> Self {
        Self {
            success: true,
            error: None,
            status: Some(status),
        }
    }
}

/// Reader
/// 应用状态对象：抽取器、序列器、用户偏好与选择状态
///
/// 会话状态（队列、进度）由序列器持有，stop 时重置；
/// 偏好只能通过 `update_settings` 修改。
pub struct Reader {
    extractor: ContentExtractor,
    sequencer: Sequencer,
    preferences: AccessiReaderSettings,
    platform: SpeechPlatform,
    selection: SelectionState,
}

impl Reader {
    pub fn new(preferences: AccessiReaderSettings, platform: SpeechPlatform) -> Self {
        let backend = create_backend(&preferences, &platform);
        let sequencer = Sequencer::new(backend);
        sequencer.update_settings(preferences.clone());

        Self {
            extractor: ContentExtractor::new(),
            sequencer,
            preferences,
            platform,
            selection: SelectionState::default(),
        }
    }

    pub fn with_extractor(mut self, extractor: ContentExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn set_viewport(&self, viewport: Option<Arc<dyn Viewport>>) {
        self.sequencer.set_viewport(viewport);
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn preferences(&self) -> &AccessiReaderSettings {
        &self.preferences
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    /// 处理一条命令
    ///
    /// 开始朗读的命令会把驱动交给 tokio 运行时，因此需要在运行时内调用
    pub fn dispatch(&mut self, command: Command, page: &PageDocument) -> CommandResponse {
        tracing::debug!("command: {:?}", command);
        let result = match command {
            Command::StartReading => self.read_page(page).map(spawn_narration),
            Command::ReadSelection => self.read_selection().map(spawn_narration),
            Command::StopReading => {
                self.sequencer.stop();
                Ok(())
            }
            Command::PauseReading => self
                .sequencer
                .pause()
                .then_some(())
                .ok_or(ReaderError::NotPlaying),
            Command::ResumeReading => self
                .sequencer
                .resume()
                .then_some(())
                .ok_or(ReaderError::NotPaused),
            Command::NextBlock => self
                .sequencer
                .next_block()
                .map(spawn_narration)
                .ok_or(ReaderError::NotReading),
            Command::PrevBlock => self
                .sequencer
                .previous_block()
                .map(spawn_narration)
                .ok_or(ReaderError::NotReading),
            Command::GetStatus => return CommandResponse::with_status(self.sequencer.status()),
            Command::ActivateSelector => {
                self.selection.activate();
                Ok(())
            }
            Command::DeactivateSelector => {
                self.selection.deactivate();
                Ok(())
            }
            Command::SelectElement { locator } => self.add_selection(page, &locator).map(|_| ()),
            Command::ClearSelection => {
                self.clear_selection();
                Ok(())
            }
            Command::SettingsUpdated(partial) => self.update_settings(&partial),
        };

        match result {
            Ok(()) => CommandResponse::ok(),
            Err(e) => {
                tracing::warn!("command failed: {}", e);
                CommandResponse::failed(&e)
            }
        }
    }

    /// 朗读整页，返回驱动
    pub fn read_page(&self, page: &PageDocument) -> Result<Narration> {
        self.sequencer
            .start_full_page(&self.extractor, page, &self.preferences)
    }

    /// 朗读已选中的块；开始后退出选择模式
    pub fn read_selection(&mut self) -> Result<Narration> {
        let narration = self
            .sequencer
            .start_selection(&self.selection.blocks, &self.preferences)?;
        self.selection.deactivate();
        Ok(narration)
    }

    /// 把定位器指向的元素加入选择
    ///
    /// # 返回
    /// 新加入的块；元素不可见或没有可读文本时返回 None
    pub fn add_selection(
        &mut self,
        page: &PageDocument,
        locator: &str,
    ) -> Result<Option<ContentBlock>> {
        let element = page
            .resolve(locator)
            .ok_or_else(|| ReaderError::ElementNotFound {
                locator: locator.to_string(),
            })?;

        let block = self.extractor.extract_single(element);
        match &block {
            Some(block) => {
                tracing::debug!("selected {} block", block.block_type.as_str());
                self.selection.add(block.clone());
            }
            None => tracing::debug!("selected element {} has nothing to read", locator),
        }
        Ok(block)
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// 合并部分设置
    ///
    /// 引擎或凭据变化时先停止旧后端，再按新设置创建
    pub fn update_settings(&mut self, partial: &serde_json::Value) -> Result<()> {
        let updated = self.preferences.merge_json(partial)?;
        if self.preferences.requires_new_backend(&updated) {
            self.sequencer
                .set_backend(create_backend(&updated, &self.platform));
        }
        self.sequencer.update_settings(updated.clone());
        self.preferences = updated;
        Ok(())
    }
}

fn spawn_narration(narration: Narration) {
    tokio::spawn(async move {
        let outcome = narration.await;
        tracing::debug!("narration ended: {:?}", outcome);
    });
}
