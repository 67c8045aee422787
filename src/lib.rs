// AccessiReader
// 网页内容抽取与逐块朗读

pub mod error;
pub mod types;
pub mod settings;
pub mod content;
pub mod playback;
pub mod tts;
pub mod reader;
pub mod logging;

// 重新导出主要类型
pub use error::{ReaderError, Result, SpeechError, SpeechResult};
pub use types::*;
pub use settings::{AccessiReaderSettings, ContentFilterSettings};
pub use content::{ContentExtractor, DomClassifier, DomProbe, PageDocument, StaticDomProbe};
pub use playback::{
    Narration, NarrationOutcome, PlaybackState, ReadingQueue, Sequencer, StatusSnapshot, Viewport,
};
pub use tts::{create_backend, SpeechBackend, SpeechPlatform, Utterance};
pub use reader::{Command, CommandResponse, Reader};
pub use logging::init_logging;
