//! 处理线程 (Processing Worker)
//! 职责: 帧源取帧 → 检测 → 跟踪注册表 → 去重 → 会话状态迁移
//!
//! 每取一帧之前先处理命令并检查准入标志; 已进入处理的帧允许完成,
//! 会话离开 Active 后不再接受新帧。

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, TryRecvError};
use log::{debug, info, warn};

use super::Inner;
use crate::error::{DetectError, ScanError};
use crate::input::{Detector, FrameSource};

/// 连续失败多少帧后升级为 ResourceUnavailable
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// 处理线程命令 (任意线程 → 处理线程)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    Torch(bool),
    Stop,
}

/// 帧源 + 检测器
pub struct Pipeline {
    pub source: Box<dyn FrameSource>,
    pub detector: Box<dyn Detector>,
}

impl Pipeline {
    /// 未交给处理线程就放弃时释放帧源
    pub(crate) fn abandon(mut self, reason: &str) {
        warn!("⚠️  放弃帧源: {}", reason);
        self.source.release();
    }
}

/// 处理线程主循环
pub(crate) fn run(inner: Arc<Inner>, mut pipeline: Pipeline, commands: Receiver<Command>) {
    info!("🔍 处理线程启动");

    let mut paused = false;
    let mut consecutive_failures = 0u32;
    let mut frames = 0u64;
    let started = Instant::now();

    'frames: loop {
        // 1. 处理命令 (暂停时阻塞等待)
        loop {
            let command = if paused {
                commands.recv().map_err(|_| TryRecvError::Disconnected)
            } else {
                commands.try_recv()
            };
            match command {
                Ok(Command::Pause) => {
                    if !paused {
                        info!("⏸️  处理线程暂停");
                    }
                    paused = true;
                }
                Ok(Command::Resume) => {
                    if paused {
                        info!("▶️  处理线程恢复");
                    }
                    paused = false;
                }
                Ok(Command::Torch(on)) => pipeline.source.set_torch(on),
                Ok(Command::Stop) | Err(TryRecvError::Disconnected) => break 'frames,
                Err(TryRecvError::Empty) => break,
            }
        }

        // 2. 准入检查
        if !inner.is_admitting() {
            break;
        }

        // 3. 取帧
        let Some(frame) = pipeline.source.next_frame() else {
            info!("📭 帧源结束");
            inner.cancel_active("frame source reached end of stream");
            break;
        };
        frames += 1;

        // 4. 检测 (单帧失败丢弃, 连续失败升级)
        match pipeline.detector.detect(&frame) {
            Ok(detections) => {
                consecutive_failures = 0;
                inner.process_frame(&frame, detections);
            }
            Err(DetectError::Unavailable(msg)) => {
                warn!("❌ 检测器不可用: {}", msg);
                inner.fail(ScanError::ResourceUnavailable(msg));
                break;
            }
            Err(DetectError::Frame(msg)) => {
                consecutive_failures += 1;
                debug!(
                    "⚠️  丢弃第 {} 帧: {} (连续失败 {})",
                    frame.index, msg, consecutive_failures
                );
                if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    warn!("❌ 连续 {} 帧检测失败, 停止会话", consecutive_failures);
                    inner.fail(ScanError::ResourceUnavailable(format!(
                        "{} consecutive frame failures, last: {}",
                        consecutive_failures, msg
                    )));
                    break;
                }
            }
        }
    }

    pipeline.source.release();

    let secs = started.elapsed().as_secs_f64();
    let fps = if secs > 0.0 { frames as f64 / secs } else { 0.0 };
    info!("🛑 处理线程退出: {} 帧, {:.1} FPS", frames, fps);

    if inner.has_failed() {
        inner.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Scenario;

    #[test]
    fn test_abandoned_pipeline_releases_source() {
        let (source, detector) = Scenario::default().into_pipeline();
        let probe = source.probe();
        let pipeline = Pipeline {
            source: Box::new(source),
            detector: Box::new(detector),
        };
        pipeline.abandon("test");
        assert!(probe.released.load(std::sync::atomic::Ordering::SeqCst));
    }
}
