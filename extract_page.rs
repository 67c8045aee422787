/// 抽取并朗读本地 HTML 页面
///
/// 打印过滤后的内容块（JSON）；带 --play 时通过日志语音通道逐块朗读

use accessi_reader_lib::tts::TracingSink;
use accessi_reader_lib::{
    init_logging, AccessiReaderSettings, ContentExtractor, NarrationOutcome, PageDocument,
    Reader, SpeechPlatform,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "extract_page")]
#[command(version, about = "Extract readable blocks from an HTML page", long_about = None)]
struct Args {
    /// HTML 页面路径
    #[arg(value_name = "PAGE")]
    page: PathBuf,

    /// 设置文件（JSON）
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// 抽取后逐块朗读
    #[arg(long)]
    play: bool,
}

#[tokio::main]
async fn main() {
    init_logging("info");
    let args = Args::parse();

    let settings = match &args.settings {
        Some(path) => AccessiReaderSettings::load(path),
        None => Ok(AccessiReaderSettings::default()),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("✗ 设置加载失败: {}", e);
            std::process::exit(1);
        }
    };

    let page = match PageDocument::from_path(&args.page) {
        Ok(page) => page,
        Err(e) => {
            eprintln!("✗ 无法读取页面 {:?}: {}", args.page, e);
            std::process::exit(1);
        }
    };

    let extractor = ContentExtractor::new();
    let extracted = extractor.extract_all(&page);
    let total = extracted.len();
    let blocks = extractor.filter_by_settings(extracted, &settings);

    println!("✓ 抽取 {} 个内容块，过滤后 {} 个", total, blocks.len());
    match serde_json::to_string_pretty(&blocks) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("✗ 序列化失败: {}", e),
    }

    if !args.play {
        return;
    }

    let sink = Arc::new(TracingSink::new());
    let reader = Reader::new(settings, SpeechPlatform::new(sink.clone(), sink));
    match reader.read_page(&page) {
        Ok(narration) => match narration.await {
            NarrationOutcome::Completed => println!("✓ 朗读完成"),
            NarrationOutcome::Interrupted => println!("⚠ 朗读被中断"),
        },
        Err(e) => eprintln!("✗ 无法开始朗读: {}", e),
    }
}
