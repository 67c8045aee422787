// Playback 模块
// 阅读队列、会话状态与逐块朗读的状态机

pub mod queue;
pub mod state;
pub mod sequencer;


// 重新导出主要类型
pub use queue::{transition, ReadingQueue};
pub use state::{PlaybackState, SelectionState, SessionState, StatusSnapshot};
pub use sequencer::{Narration, NarrationOutcome, Sequencer, Viewport};
