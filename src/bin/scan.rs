/// 扫描会话演示 (Scan Session Demo)
///
/// 回放JSON场景驱动一次完整的扫描会话
///
/// 线程结构:
/// 1. 处理线程: 帧源 → 检测 → 跟踪 → 去重 (会话内部)
/// 2. 渲染线程: 监听叠加层变更, 可选输出PNG
/// 3. 主线程:   启动会话并等待结果
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam_channel::{select, tick};
use log::{info, warn};

use scan_session::detection::{Detection, Rect};
use scan_session::input::Scenario;
use scan_session::session::{
    CenterVisual, Delivery, ScanHooks, ScanSession, ScannerBuilder, SessionState,
};
use scan_session::{CanvasRenderer, ScanError, ScannerConfig, Surface, TrackerMode};

/// 扫描演示参数
#[derive(Parser, Debug)]
#[command(author, version, about = "扫描会话 - 场景回放演示", long_about = None)]
struct Args {
    /// 扫描配置文件 (不存在时写出默认配置)
    #[arg(short, long, default_value = "scanner_config.json")]
    config: PathBuf,

    /// 场景文件; 省略时使用内置演示场景
    #[arg(short, long)]
    scenario: Option<PathBuf>,

    /// 叠加层PNG输出目录
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 标签字体 (TTF/OTF)
    #[arg(long)]
    font: Option<PathBuf>,

    /// 视图宽度
    #[arg(long, default_value_t = 1080)]
    view_width: u32,

    /// 视图高度
    #[arg(long, default_value_t = 1920)]
    view_height: u32,

    /// 不绑定目标表面 (演示配置错误)
    #[arg(long, default_value_t = false)]
    no_surface: bool,

    /// 使用中心框模式
    #[arg(long, default_value_t = false)]
    center: bool,

    /// 超时后取消 (秒, 0 表示不限)
    #[arg(short, long, default_value_t = 0)]
    timeout: u64,

    /// 启动失败 (权限/资源) 时的重试次数
    #[arg(long, default_value_t = 3)]
    retries: u32,
}

/// 把钩子事件打印到日志
struct ConsoleHooks;

impl ScanHooks for ConsoleHooks {
    fn on_new_detection_count(&self, count: usize) {
        info!("🔢 已扫描 {} 个不同内容", count);
    }

    fn on_play_sound(&self) {
        info!("🔔 哔");
    }

    fn on_center_tracker_state_change(&self, state: CenterVisual) {
        info!("🎯 中心框: {:?}", state);
    }

    fn on_torch_change(&self, on: bool) {
        info!("🔦 闪光灯: {}", if on { "开" } else { "关" });
    }
}

fn demo_scenario() -> Scenario {
    let bbox = |l: f32, t: f32| Rect::new(l, t, l + 240.0, t + 120.0);
    Scenario {
        frame_interval_ms: 33,
        ..Scenario::from_frames(
            720,
            1280,
            vec![
                vec![],
                vec![Detection::new(1, "https://example.com/item/42", bbox(200.0, 500.0))],
                vec![Detection::new(1, "https://example.com/item/42", bbox(210.0, 505.0))],
                vec![
                    Detection::new(1, "https://example.com/item/42", bbox(220.0, 510.0)),
                    Detection::new(2, "4006381333931", bbox(300.0, 900.0)),
                ],
            ],
        )
    }
}

/// 渲染线程: 每次叠加层变更或会话结束前重新投影
fn spawn_renderer(
    session: ScanSession,
    mut renderer: CanvasRenderer,
    output: PathBuf,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let changes = session.overlay().changes();
        let poll = tick(Duration::from_millis(50));
        loop {
            select! {
                recv(changes) -> msg => {
                    if msg.is_err() {
                        break;
                    }
                    match session.config().tracker_mode {
                        TrackerMode::Free => renderer.render(&session.overlay_shapes()),
                        TrackerMode::Center => {
                            renderer.render_center_tracker(session.center_tracker_state())
                        }
                    }
                    if let Err(e) = renderer.save_png(&output) {
                        warn!("❌ 保存叠加层失败: {:#}", e);
                    }
                }
                recv(poll) -> _ => {
                    if matches!(session.state(), SessionState::Completed | SessionState::Cleaned) {
                        break;
                    }
                }
            }
        }
        info!("🖼️  渲染线程退出, 共 {} 帧", renderer.frames_drawn());
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = ScannerConfig::load(&args.config);
    if args.center {
        config.tracker_mode = TrackerMode::Center;
    }

    let scenario = match &args.scenario {
        Some(path) => Scenario::load(path)?,
        None => {
            info!("📦 使用内置演示场景");
            demo_scenario()
        }
    };
    let (source, detector) = scenario.into_pipeline();

    info!("🚀 扫描会话启动");
    let mut builder = ScannerBuilder::from_config(config)
        .with_frame_source(source)
        .with_detector(detector)
        .with_hooks(Arc::new(ConsoleHooks))
        .with_result_listener(|payload| info!("📨 结果回调: {}", payload));
    if !args.no_surface {
        builder = builder.with_surface(Surface::new("preview", args.view_width, args.view_height));
    }
    let session = builder.build().context("构建扫描会话失败")?;

    // ========== 启动 (资源不可用时重试) ==========
    let mut attempt = 0;
    loop {
        match session.start() {
            Ok(()) => break,
            Err(ScanError::ResourceUnavailable(msg)) if attempt < args.retries => {
                attempt += 1;
                warn!("⚠️  资源不可用 ({}), 第 {} 次重试", msg, attempt);
                thread::sleep(Duration::from_millis(200));
            }
            Err(e) => {
                session.stop();
                bail!("启动扫描会话失败: {}", e);
            }
        }
    }

    // ========== 渲染线程 ==========
    let render_thread = match &args.output {
        Some(dir) => {
            let mut renderer = CanvasRenderer::new(args.view_width, args.view_height);
            if let Some(font) = &args.font {
                renderer = renderer.with_font_file(font)?;
            }
            Some(spawn_renderer(session.clone(), renderer, dir.clone()))
        }
        None => None,
    };

    // ========== 超时取消 ==========
    if args.timeout > 0 {
        let session = session.clone();
        let timeout = Duration::from_secs(args.timeout);
        thread::spawn(move || {
            thread::sleep(timeout);
            if session.state() == SessionState::Active {
                warn!("⏰ 超时, 取消会话");
                session.cancel();
            }
        });
    }

    let delivery = session.await_result();
    if let Some(handle) = render_thread {
        let _ = handle.join();
    }

    match delivery? {
        Delivery::Payload(payload) => {
            info!("✅ 扫描完成");
            println!("{}", payload);
        }
        Delivery::Cancelled => {
            info!("⏹️  会话已取消, 没有结果");
        }
    }
    Ok(())
}
