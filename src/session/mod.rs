/// 扫描会话 (Scan Session)
///
/// 一次性扫描的状态机: Idle → Starting → Active → Completed → Cleaned
/// - 处理线程: 帧源 → 检测器 → 注册表 → 去重 (worker)
/// - 渲染线程: 随时读取叠加层快照 (overlay)
/// - 命令: 任意线程可发出 暂停/恢复/取消/停止/闪光灯
/// - 结果: 单槽通道, 恰好交付给一个消费者 (channel)
pub mod builder;
pub mod center_tracker;
pub mod channel;
pub mod hooks;
pub mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use log::{debug, error, info, warn};

pub use builder::{ResultCallback, ScannerBuilder};
pub use center_tracker::CenterTracker;
pub use channel::{Delivery, ResultChannel};
pub use hooks::{CenterVisual, NoHooks, ScanHooks};
pub use worker::{Command, Pipeline, MAX_CONSECUTIVE_FAILURES};

use crate::config::{ScannerConfig, Surface, TrackerMode};
use crate::detection::{
    DeduplicationFilter, Detection, DiffEvent, Frame, ObjectRegistry, TrackedObject,
};
use crate::error::{ScanError, ScanResult};
use crate::overlay::{DrawableShape, OverlayModel};

use hooks::fire;

/// 会话生命周期状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// 已构建, 尚未启动
    Idle,
    /// 正在校验配置并获取帧源
    Starting,
    /// 持续处理帧
    Active,
    /// 已产生结果或被取消, 不再接受新帧
    Completed,
    /// 终态, 所有资源已释放
    Cleaned,
}

struct Lifecycle {
    state: SessionState,
    /// 已用过一次 (启动成功或配置错误后), 不可再次启动
    spent: bool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct Inner {
    config: ScannerConfig,
    surface: Option<Surface>,
    lifecycle: Mutex<Lifecycle>,
    registry: Mutex<ObjectRegistry>,
    dedup: Mutex<DeduplicationFilter>,
    overlay: OverlayModel,
    channel: Arc<ResultChannel<String>>,
    hooks: Arc<dyn ScanHooks>,
    center: CenterTracker,
    pipeline: Mutex<Option<Pipeline>>,
    on_result: Mutex<Option<ResultCallback>>,
    commands: Mutex<Option<Sender<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    failure: Mutex<Option<ScanError>>,
    admitting: AtomicBool,
    torch: AtomicBool,
}

impl Inner {
    pub(crate) fn is_admitting(&self) -> bool {
        self.admitting.load(Ordering::SeqCst)
    }

    pub(crate) fn has_failed(&self) -> bool {
        lock(&self.failure).is_some()
    }

    /// 记录致命错误并停止接收新帧
    pub(crate) fn fail(&self, err: ScanError) {
        error!("❌ 会话失败: {}", err);
        self.admitting.store(false, Ordering::SeqCst);
        lock(&self.failure).get_or_insert(err);
    }

    /// 处理一帧检测结果 (处理线程调用)
    pub(crate) fn process_frame(&self, frame: &Frame, detections: Vec<Detection>) {
        let formats = self.config.barcode_formats;
        let detections: Vec<Detection> = detections
            .into_iter()
            .filter(|d| match d.format {
                Some(f) if !f.is_empty() && !formats.intersects(f) => {
                    debug!("🚫 忽略未启用格式 {:?}: {}", f, d.payload);
                    false
                }
                _ => true,
            })
            .collect();

        let events = {
            let mut registry = lock(&self.registry);
            let events = registry.apply_frame(&detections);
            self.overlay
                .publish(registry.snapshot(), frame.width, frame.height);
            events
        };

        for event in events {
            let DiffEvent::Created(obj) = event else {
                continue;
            };
            debug!("🆕 新目标 #{}: {}", obj.id, obj.payload);
            if self.config.tracker_mode == TrackerMode::Center {
                self.center.trigger();
            }
            let first = {
                let mut dedup = lock(&self.dedup);
                dedup.observe(&obj.payload).then(|| dedup.len())
            };
            if let Some(count) = first {
                if self.complete_with(obj.payload, count) {
                    break;
                }
            }
        }
    }

    /// Active → Completed, 发布结果并触发钩子
    fn complete_with(&self, payload: String, count: usize) -> bool {
        {
            let mut lc = lock(&self.lifecycle);
            if lc.state != SessionState::Active {
                return false;
            }
            lc.state = SessionState::Completed;
            self.admitting.store(false, Ordering::SeqCst);
        }
        info!("✅ 检测到新条码: {}", payload);

        if let Err(e) = self.channel.publish(payload) {
            self.fail(e);
        }

        fire("on_new_detection_count", || {
            self.hooks.on_new_detection_count(count)
        });
        if self.config.bleep_on_detect {
            fire("on_play_sound", || self.hooks.on_play_sound());
        }
        true
    }

    /// Active → Completed 且没有结果 (外部取消/流结束), 唤醒等待的消费者
    pub(crate) fn cancel_active(&self, reason: &str) -> bool {
        {
            let mut lc = lock(&self.lifecycle);
            if lc.state != SessionState::Active {
                return false;
            }
            lc.state = SessionState::Completed;
            self.admitting.store(false, Ordering::SeqCst);
        }
        info!("⏹️  会话取消: {}", reason);
        self.channel.invalidate();
        if let Some(tx) = lock(&self.commands).as_ref() {
            let _ = tx.send(Command::Stop);
        }
        true
    }

    /// 转入 Cleaned: 停止处理线程、清空注册表/去重/叠加层、使结果通道失效、释放帧源
    pub(crate) fn cleanup(&self) {
        let previous = {
            let mut lc = lock(&self.lifecycle);
            if lc.state == SessionState::Cleaned {
                return;
            }
            let previous = lc.state;
            lc.state = SessionState::Cleaned;
            lc.spent = true;
            self.admitting.store(false, Ordering::SeqCst);
            previous
        };
        debug!("🧹 清理会话 (之前状态 {:?})", previous);

        // 唤醒并等待处理线程 (在途帧允许完成)
        if let Some(tx) = lock(&self.commands).take() {
            let _ = tx.send(Command::Stop);
        }
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("⚠️  处理线程异常退出");
            }
        }

        // 未交给处理线程的帧源在这里释放
        if let Some(mut pipeline) = lock(&self.pipeline).take() {
            pipeline.source.release();
        }

        lock(&self.registry).clear();
        lock(&self.dedup).clear();
        self.overlay.clear();
        self.channel.invalidate();
        self.center.stop();
        info!("🧹 会话已清理");
    }
}

/// 扫描会话句柄
///
/// 克隆得到的句柄共享同一个会话, 可以从任意线程发出命令。
#[derive(Clone)]
pub struct ScanSession {
    inner: Arc<Inner>,
}

impl ScanSession {
    pub(crate) fn new(
        config: ScannerConfig,
        surface: Option<Surface>,
        pipeline: Pipeline,
        hooks: Arc<dyn ScanHooks>,
        on_result: Option<ResultCallback>,
    ) -> Self {
        let (view_w, view_h) = surface
            .as_ref()
            .map(|s| (s.width, s.height))
            .unwrap_or((0, 0));
        let center = CenterTracker::new(
            hooks.clone(),
            config.center_tracker.hold(),
            config.center_tracker.tick(),
        );
        let inner = Inner {
            registry: Mutex::new(ObjectRegistry::new(config.tracker_color)),
            dedup: Mutex::new(DeduplicationFilter::new()),
            overlay: OverlayModel::new(view_w, view_h, config.camera_facing),
            channel: Arc::new(ResultChannel::new()),
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Idle,
                spent: false,
            }),
            pipeline: Mutex::new(Some(pipeline)),
            on_result: Mutex::new(on_result),
            commands: Mutex::new(None),
            worker: Mutex::new(None),
            failure: Mutex::new(None),
            admitting: AtomicBool::new(false),
            torch: AtomicBool::new(config.flash_on_by_default),
            center,
            hooks,
            surface,
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn state(&self) -> SessionState {
        lock(&self.inner.lifecycle).state
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.inner.config
    }

    /// 启动会话: Idle/Starting → Starting → Active
    ///
    /// - 未绑定目标表面或会话已用过: `Configuration`, 状态保持 Idle 且会话作废
    /// - 检测器未就绪或帧源获取失败: `ResourceUnavailable`, 状态保持 Starting, 可重试
    /// - 获取帧源期间被取消/停止: `Configuration`, 已获取的帧源随即释放
    ///
    /// 获取帧源时不持有任何会话锁, 其它线程可以随时取消。
    pub fn start(&self) -> ScanResult<()> {
        let inner = &self.inner;

        // ========== 1. 前置检查, 取出帧源 ==========
        let mut pipeline = {
            let mut lc = lock(&inner.lifecycle);
            match lc.state {
                SessionState::Idle | SessionState::Starting if !lc.spent => {}
                state => {
                    return Err(ScanError::Configuration(format!(
                        "scan session already used (state {:?}); build a new scanner",
                        state
                    )));
                }
            }
            if inner.surface.is_none() {
                lc.spent = true;
                return Err(ScanError::Configuration(
                    "no target surface bound to the scanner".into(),
                ));
            }
            lc.state = SessionState::Starting;

            let Some(pipeline) = lock(&inner.pipeline).take() else {
                return Err(ScanError::ResourceUnavailable(
                    "scan session start already in progress".into(),
                ));
            };
            pipeline
        };

        // ========== 2. 锁外探测检测器并获取帧源 ==========
        let mut settings = inner.config.camera_settings();
        settings.torch = inner.torch.load(Ordering::SeqCst);
        let acquired = if !pipeline.detector.is_operational() {
            warn!("⚠️  检测器依赖尚未就绪");
            Err(ScanError::ResourceUnavailable(
                "detector dependencies are not yet available".into(),
            ))
        } else {
            pipeline.source.acquire(&settings).map_err(|e| {
                warn!("⚠️  帧源获取失败: {}", e);
                ScanError::from(e)
            })
        };

        // ========== 3. 重新加锁, 确认没有被取消 ==========
        let mut lc = lock(&inner.lifecycle);
        if lc.state != SessionState::Starting {
            drop(lc);
            if acquired.is_ok() {
                pipeline.abandon("scan session stopped while starting");
            }
            info!("⏹️  启动期间会话已被取消");
            return Err(ScanError::Configuration(
                "scan session was stopped while starting".into(),
            ));
        }
        if let Err(e) = acquired {
            // 放回帧源, 允许重试
            *lock(&inner.pipeline) = Some(pipeline);
            return Err(e);
        }

        // ========== 4. 启动处理线程, 通过通道交付帧源 ==========
        let (tx, rx) = crossbeam_channel::unbounded();
        let (handoff_tx, handoff_rx) = crossbeam_channel::bounded::<Pipeline>(1);
        let worker_inner = inner.clone();
        let spawned = thread::Builder::new()
            .name("scan-processing".into())
            .spawn(move || {
                if let Ok(pipeline) = handoff_rx.recv() {
                    worker::run(worker_inner, pipeline, rx);
                }
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                drop(lc);
                pipeline.abandon("processing thread could not be spawned");
                let err = ScanError::ResourceUnavailable(format!(
                    "failed to spawn processing thread: {}",
                    e
                ));
                inner.fail(err.clone());
                inner.cleanup();
                return Err(err);
            }
        };

        lc.state = SessionState::Active;
        lc.spent = true;
        inner.admitting.store(true, Ordering::SeqCst);
        // 获取期间切换过的闪光灯状态补发给处理线程
        let torch = inner.torch.load(Ordering::SeqCst);
        if torch != settings.torch {
            let _ = tx.send(Command::Torch(torch));
        }
        *lock(&inner.commands) = Some(tx);
        *lock(&inner.worker) = Some(handle);
        if let Err(returned) = handoff_tx.send(pipeline) {
            // 处理线程已退出, 帧源从未交出
            returned.into_inner().abandon("processing thread exited before handoff");
        }
        drop(lc);

        info!("🚀 扫描会话已启动");
        inner.config.log_summary();
        Ok(())
    }

    /// 外部取消 (例如"完成"按钮): Active → Completed, 消费者得到 Cancelled
    ///
    /// 尚未进入 Active 时直接清理。
    pub fn cancel(&self) {
        let state = self.state();
        match state {
            SessionState::Active => {
                self.inner.cancel_active("cancelled by caller");
            }
            SessionState::Idle | SessionState::Starting => self.inner.cleanup(),
            SessionState::Completed | SessionState::Cleaned => {}
        }
    }

    /// 停止并清理 (幂等)
    pub fn stop(&self) {
        self.inner.cleanup();
    }

    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    pub fn resume(&self) {
        self.send(Command::Resume);
    }

    fn send(&self, command: Command) {
        if let Some(tx) = lock(&self.inner.commands).as_ref() {
            let _ = tx.send(command);
        }
    }

    /// 闪光灯开关
    pub fn set_torch(&self, on: bool) {
        let previous = self.inner.torch.swap(on, Ordering::SeqCst);
        if previous == on {
            return;
        }
        self.send(Command::Torch(on));
        fire("on_torch_change", || self.inner.hooks.on_torch_change(on));
    }

    /// 切换闪光灯, 返回新状态
    pub fn toggle_torch(&self) -> bool {
        let on = !self.inner.torch.load(Ordering::SeqCst);
        self.set_torch(on);
        on
    }

    pub fn torch(&self) -> bool {
        self.inner.torch.load(Ordering::SeqCst)
    }

    /// 视图尺寸变化 (旋转等)
    pub fn resize_view(&self, width: u32, height: u32) {
        self.inner.overlay.set_view(width, height);
    }

    /// 等待结果: 收到结果时调用结果回调, 然后清理会话
    ///
    /// 处理线程以致命错误结束时返回该错误。
    pub fn await_result(&self) -> ScanResult<Delivery<String>> {
        let delivery = self.inner.channel.consume();
        if let Delivery::Payload(payload) = &delivery {
            if let Some(callback) = lock(&self.inner.on_result).take() {
                fire("on_result", || callback(payload.clone()));
            }
        }
        self.inner.cleanup();
        match self.last_error() {
            Some(err) => Err(err),
            None => Ok(delivery),
        }
    }

    /// 结果通道 (直接消费, 不触发回调与清理)
    pub fn result_channel(&self) -> Arc<ResultChannel<String>> {
        self.inner.channel.clone()
    }

    pub fn last_error(&self) -> Option<ScanError> {
        lock(&self.inner.failure).clone()
    }

    /// 直接查询并登记去重过滤器
    pub fn observe(&self, payload: &str) -> bool {
        lock(&self.inner.dedup).observe(payload)
    }

    /// 本会话已扫描的不同内容数量
    pub fn scanned_count(&self) -> usize {
        lock(&self.inner.dedup).len()
    }

    /// 注册表快照 (按ID排序)
    pub fn tracked_objects(&self) -> Vec<TrackedObject> {
        lock(&self.inner.registry).snapshot()
    }

    pub fn overlay(&self) -> &OverlayModel {
        &self.inner.overlay
    }

    /// 当前应绘制的图形; 中心框模式下隐藏叠加层
    pub fn overlay_shapes(&self) -> Vec<DrawableShape> {
        match self.inner.config.tracker_mode {
            TrackerMode::Free => self.inner.overlay.shapes(),
            TrackerMode::Center => Vec::new(),
        }
    }

    pub fn center_tracker_state(&self) -> CenterVisual {
        self.inner.center.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::{BarcodeFormats, Rect};
    use crate::input::Scenario;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn det(id: u32, payload: &str) -> Detection {
        Detection::new(id, payload, Rect::new(10.0, 10.0, 60.0, 40.0))
    }

    fn builder(scenario: Scenario) -> ScannerBuilder {
        let (source, detector) = scenario.into_pipeline();
        ScannerBuilder::new()
            .with_surface(Surface::new("preview", 1280, 720))
            .with_frame_source(source)
            .with_detector(detector)
    }

    #[derive(Default)]
    struct Counting {
        counts: AtomicUsize,
        sounds: AtomicUsize,
    }

    impl ScanHooks for Counting {
        fn on_new_detection_count(&self, _count: usize) {
            self.counts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_play_sound(&self) {
            self.sounds.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_first_new_payload_completes_session() {
        let scenario = Scenario::from_frames(
            640,
            480,
            vec![vec![], vec![det(1, "XYZ")], vec![det(1, "XYZ")]],
        );
        let session = builder(scenario).build().unwrap();
        session.start().unwrap();

        assert_eq!(
            session.result_channel().consume(),
            Delivery::Payload("XYZ".to_string())
        );
        assert_eq!(session.state(), SessionState::Completed);
        assert!(!session.observe("XYZ"));

        session.stop();
        assert_eq!(session.state(), SessionState::Cleaned);
    }

    #[test]
    fn test_hooks_fire_on_completion() {
        let hooks = Arc::new(Counting::default());
        let scenario = Scenario::from_frames(640, 480, vec![vec![det(5, "A")]]);
        let session = builder(scenario)
            .with_hooks(hooks.clone())
            .with_bleep_enabled(true)
            .build()
            .unwrap();
        session.start().unwrap();
        assert_eq!(
            session.await_result(),
            Ok(Delivery::Payload("A".to_string()))
        );
        assert_eq!(hooks.counts.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.sounds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_start_without_surface_is_configuration_error() {
        let (source, detector) = Scenario::from_frames(10, 10, vec![]).into_pipeline();
        let session = ScannerBuilder::new()
            .with_frame_source(source)
            .with_detector(detector)
            .build()
            .unwrap();

        assert!(matches!(session.start(), Err(ScanError::Configuration(_))));
        assert_eq!(session.state(), SessionState::Idle);
        // 作废的会话不可重用
        assert!(matches!(session.start(), Err(ScanError::Configuration(_))));
    }

    #[test]
    fn test_permission_denied_then_retry() {
        let scenario = Scenario {
            denied_acquires: 1,
            ..Scenario::from_frames(640, 480, vec![vec![det(1, "RETRY")]])
        };
        let session = builder(scenario).build().unwrap();

        assert!(matches!(
            session.start(),
            Err(ScanError::ResourceUnavailable(_))
        ));
        assert_eq!(session.state(), SessionState::Starting);

        session.start().unwrap();
        assert_eq!(
            session.await_result(),
            Ok(Delivery::Payload("RETRY".to_string()))
        );
    }

    #[test]
    fn test_detector_unavailable_at_start() {
        let scenario = Scenario {
            detector_unavailable: true,
            ..Scenario::from_frames(640, 480, vec![])
        };
        let session = builder(scenario).build().unwrap();
        assert!(matches!(
            session.start(),
            Err(ScanError::ResourceUnavailable(_))
        ));
        session.stop();
        assert_eq!(session.state(), SessionState::Cleaned);
    }

    #[test]
    fn test_completed_session_cannot_restart() {
        let scenario = Scenario::from_frames(640, 480, vec![vec![det(1, "ONCE")]]);
        let session = builder(scenario).build().unwrap();
        session.start().unwrap();
        session.await_result().unwrap();
        assert!(matches!(session.start(), Err(ScanError::Configuration(_))));
    }

    #[test]
    fn test_stop_unblocks_consumer() {
        let scenario = Scenario {
            hold_open: true,
            ..Scenario::from_frames(640, 480, vec![])
        };
        let session = builder(scenario).build().unwrap();
        session.start().unwrap();

        let consumer = {
            let session = session.clone();
            thread::spawn(move || session.result_channel().consume())
        };
        thread::sleep(Duration::from_millis(30));
        session.stop();
        assert_eq!(consumer.join().unwrap(), Delivery::Cancelled);
        session.stop();
        assert_eq!(session.state(), SessionState::Cleaned);
    }

    #[test]
    fn test_three_consecutive_failures_escalate() {
        let scenario = Scenario {
            failing_frames: vec![0, 1, 2],
            ..Scenario::from_frames(640, 480, vec![vec![], vec![], vec![], vec![det(1, "LATE")]])
        };
        let session = builder(scenario).build().unwrap();
        session.start().unwrap();
        assert!(matches!(
            session.await_result(),
            Err(ScanError::ResourceUnavailable(_))
        ));
        assert_eq!(session.state(), SessionState::Cleaned);
    }

    #[test]
    fn test_isolated_failures_are_dropped() {
        let scenario = Scenario {
            failing_frames: vec![0, 1, 3],
            ..Scenario::from_frames(
                640,
                480,
                vec![vec![], vec![], vec![], vec![], vec![det(2, "OK")]],
            )
        };
        let session = builder(scenario).build().unwrap();
        session.start().unwrap();
        assert_eq!(
            session.await_result(),
            Ok(Delivery::Payload("OK".to_string()))
        );
    }

    #[test]
    fn test_disabled_format_is_ignored() {
        let scenario = Scenario::from_frames(
            640,
            480,
            vec![
                vec![det(1, "EAN").with_format(BarcodeFormats::EAN_13)],
                vec![det(2, "QR").with_format(BarcodeFormats::QR_CODE)],
            ],
        );
        let session = builder(scenario)
            .with_only_qr_code_scanning()
            .build()
            .unwrap();
        session.start().unwrap();
        assert_eq!(
            session.await_result(),
            Ok(Delivery::Payload("QR".to_string()))
        );
    }

    #[test]
    fn test_end_of_stream_cancels() {
        let scenario = Scenario::from_frames(640, 480, vec![vec![], vec![]]);
        let session = builder(scenario).build().unwrap();
        session.start().unwrap();
        assert_eq!(session.await_result(), Ok(Delivery::Cancelled));
        assert_eq!(session.state(), SessionState::Cleaned);
    }

    #[test]
    fn test_torch_toggle() {
        let (source, detector) = Scenario {
            hold_open: true,
            ..Scenario::from_frames(640, 480, vec![])
        }
        .into_pipeline();
        let probe = source.probe();
        let session = ScannerBuilder::new()
            .with_surface(Surface::new("preview", 100, 100))
            .with_frame_source(source)
            .with_detector(detector)
            .with_flash_light_enabled_by_default()
            .build()
            .unwrap();
        session.start().unwrap();
        assert!(probe.torch.load(Ordering::SeqCst));

        assert!(!session.toggle_torch());
        thread::sleep(Duration::from_millis(50));
        assert!(!probe.torch.load(Ordering::SeqCst));

        session.stop();
        assert!(probe.released.load(Ordering::SeqCst));
    }
}
