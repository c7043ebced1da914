//! 会话对外事件钩子 (计数、提示音、中心框、闪光灯)
//!
//! 钩子由UI/音频等外部协作者实现, 调用是尽力而为的:
//! 钩子内的 panic 会被捕获并记录, 不影响会话状态迁移。

use std::panic::{self, AssertUnwindSafe};

use log::warn;

/// 中心框视觉状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CenterVisual {
    Idle,
    Detected,
}

/// 会话事件钩子
pub trait ScanHooks: Send + Sync {
    /// 本会话已扫描的不同内容数量
    fn on_new_detection_count(&self, _count: usize) {}

    /// 请求播放提示音
    fn on_play_sound(&self) {}

    fn on_center_tracker_state_change(&self, _state: CenterVisual) {}

    fn on_torch_change(&self, _on: bool) {}
}

/// 不做任何事的钩子
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl ScanHooks for NoHooks {}

/// 调用钩子并吞掉 panic
pub(crate) fn fire<F: FnOnce()>(name: &str, f: F) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!("⚠️  钩子 {} 发生 panic, 已忽略", name);
    }
}
