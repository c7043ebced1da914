//! 中心框视觉子状态机 (Idle ↔ Detected)
//!
//! 纯视觉反馈: 新目标出现时切换为 Detected, 保持 `hold` 后回到 Idle。
//! 倒计时线程每隔 `tick` 检查一次是否被新的触发或停止信号取代。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{after, select, tick};
use log::warn;

use super::hooks::{fire, CenterVisual, ScanHooks};

struct Inner {
    state: Mutex<CenterVisual>,
    generation: AtomicU64,
    stopped: AtomicBool,
    hooks: Arc<dyn ScanHooks>,
    hold: Duration,
    tick: Duration,
}

impl Inner {
    fn transition(&self, next: CenterVisual) {
        let changed = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let changed = *state != next;
            *state = next;
            changed
        };
        if changed {
            fire("on_center_tracker_state_change", || {
                self.hooks.on_center_tracker_state_change(next)
            });
        }
    }
}

/// 中心框
#[derive(Clone)]
pub struct CenterTracker {
    inner: Arc<Inner>,
}

impl CenterTracker {
    pub fn new(hooks: Arc<dyn ScanHooks>, hold: Duration, tick: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CenterVisual::Idle),
                generation: AtomicU64::new(0),
                stopped: AtomicBool::new(false),
                hooks,
                hold,
                tick,
            }),
        }
    }

    pub fn state(&self) -> CenterVisual {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// 检测到新目标: 切换为 Detected 并重新开始倒计时
    pub fn trigger(&self) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return;
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.transition(CenterVisual::Detected);

        let inner = self.inner.clone();
        let spawned = thread::Builder::new()
            .name("center-tracker".into())
            .spawn(move || {
                let deadline = after(inner.hold);
                let ticker = tick(inner.tick);
                loop {
                    select! {
                        recv(deadline) -> _ => break,
                        recv(ticker) -> _ => {
                            if inner.stopped.load(Ordering::SeqCst)
                                || inner.generation.load(Ordering::SeqCst) != generation
                            {
                                return;
                            }
                        }
                    }
                }
                if !inner.stopped.load(Ordering::SeqCst)
                    && inner.generation.load(Ordering::SeqCst) == generation
                {
                    inner.transition(CenterVisual::Idle);
                }
            });
        if let Err(e) = spawned {
            warn!("⚠️  中心框倒计时线程启动失败: {}", e);
            self.inner.transition(CenterVisual::Idle);
        }
    }

    /// 停止: 取消倒计时并静默回到 Idle
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = CenterVisual::Idle;
    }
}
