use crate::types::{ContentBlock, ReadingMode, ReadingProgress};
use serde::{Deserialize, Serialize};

/// 播放状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Paused,
}

/// 会话状态
///
/// 只在一次朗读会话内有效，stop 时整体重置。用户偏好单独保存在
/// `AccessiReaderSettings` 中，不在这里。
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub playback: PlaybackState,
    pub mode: ReadingMode,
    pub current_block: Option<ContentBlock>,
    pub progress: ReadingProgress,
}

impl SessionState {
    pub fn start(&mut self, mode: ReadingMode, total_blocks: usize) {
        self.playback = PlaybackState::Playing;
        self.mode = mode;
        self.current_block = None;
        self.progress = ReadingProgress::at(0, total_blocks);
    }

    /// 记录正在朗读的块
    pub fn set_current(&mut self, block: ContentBlock, index: usize, total_blocks: usize) {
        self.current_block = Some(block);
        self.progress = ReadingProgress::at(index, total_blocks);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            is_reading: self.playback != PlaybackState::Idle,
            is_paused: self.playback == PlaybackState::Paused,
            current_index: self.progress.current_index,
            total_blocks: self.progress.total_blocks,
            mode: self.mode,
        }
    }
}

/// 状态查询结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub is_reading: bool,
    pub is_paused: bool,
    pub current_index: usize,
    pub total_blocks: usize,
    pub mode: ReadingMode,
}

/// 选择模式状态
///
/// 用户手动选中的块按选择顺序累积，直到开始朗读或清空
#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    pub active: bool,
    pub blocks: Vec<ContentBlock>,
}

impl SelectionState {
    pub fn activate(&mut self) {
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn add(&mut self, block: ContentBlock) {
        self.blocks.push(block);
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }
}
