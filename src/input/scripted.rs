//! 脚本化输入 - 按JSON场景回放检测结果
//!
//! 不接触真实摄像头: 帧源按场景产出空白帧, 检测器按帧序号返回预设的检测列表。
//! 演示程序和集成测试都通过它驱动完整会话。

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::source::{Detector, FrameSource};
use crate::config::CameraSettings;
use crate::detection::types::{Detection, Frame};
use crate::error::{DetectError, SourceError};

/// 回放场景
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub width: u32,
    pub height: u32,
    /// 帧间隔 (毫秒, 0 表示不等待)
    pub frame_interval_ms: u64,
    /// 每帧的检测列表
    pub frames: Vec<Vec<Detection>>,
    /// 检测器在这些帧上报错
    pub failing_frames: Vec<u64>,
    /// 前N次获取摄像头失败 (模拟权限未授予)
    pub denied_acquires: u32,
    /// 检测器依赖未就绪
    pub detector_unavailable: bool,
    /// 从该帧起检测器整体不可用 (运行中掉线)
    pub unavailable_from_frame: Option<u64>,
    /// 每次获取摄像头的耗时 (毫秒, 模拟慢速打开)
    pub acquire_delay_ms: u64,
    /// 流结束后保持等待而不是结束 (直到会话停止)
    pub hold_open: bool,
}

impl Scenario {
    /// 从JSON文件加载场景
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("读取场景文件 {} 失败", path.display()))?;
        let scenario: Scenario = serde_json::from_str(&json)
            .with_context(|| format!("解析场景文件 {} 失败", path.display()))?;
        info!(
            "✅ 场景已加载: {} 帧, {}x{}",
            scenario.frames.len(),
            scenario.width,
            scenario.height
        );
        Ok(scenario)
    }

    pub fn from_frames(width: u32, height: u32, frames: Vec<Vec<Detection>>) -> Self {
        Self {
            width,
            height,
            frames,
            ..Default::default()
        }
    }

    /// 拆分为帧源和检测器
    pub fn into_pipeline(self) -> (ScriptedSource, ScriptedDetector) {
        let scenario = Arc::new(self);
        (
            ScriptedSource::new(scenario.clone()),
            ScriptedDetector::new(scenario),
        )
    }
}

/// 帧源状态探针 (测试观察用)
#[derive(Debug, Default)]
pub struct SourceProbe {
    pub acquire_attempts: AtomicU32,
    pub acquired: AtomicBool,
    pub released: AtomicBool,
    pub torch: AtomicBool,
    pub frames_served: AtomicU32,
}

/// 脚本化帧源
pub struct ScriptedSource {
    scenario: Arc<Scenario>,
    probe: Arc<SourceProbe>,
    cursor: u64,
}

impl ScriptedSource {
    pub fn new(scenario: Arc<Scenario>) -> Self {
        Self {
            scenario,
            probe: Arc::new(SourceProbe::default()),
            cursor: 0,
        }
    }

    pub fn probe(&self) -> Arc<SourceProbe> {
        self.probe.clone()
    }
}

impl FrameSource for ScriptedSource {
    fn acquire(&mut self, settings: &CameraSettings) -> Result<(), SourceError> {
        let attempt = self.probe.acquire_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.scenario.acquire_delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.scenario.acquire_delay_ms));
        }
        if attempt <= self.scenario.denied_acquires {
            return Err(SourceError::PermissionDenied);
        }
        debug!("📷 脚本帧源已获取: {:?}", settings);
        self.probe.torch.store(settings.torch, Ordering::SeqCst);
        self.probe.acquired.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if self.scenario.frame_interval_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.scenario.frame_interval_ms));
        }
        if self.cursor >= self.scenario.frames.len() as u64 {
            if !self.scenario.hold_open {
                return None;
            }
            // 空帧, 让处理线程继续检查停止信号
            std::thread::sleep(Duration::from_millis(5));
        }
        let frame = Frame::blank(self.cursor, self.scenario.width, self.scenario.height);
        self.cursor += 1;
        self.probe.frames_served.fetch_add(1, Ordering::SeqCst);
        Some(frame)
    }

    fn set_torch(&mut self, on: bool) {
        self.probe.torch.store(on, Ordering::SeqCst);
    }

    fn release(&mut self) {
        self.probe.acquired.store(false, Ordering::SeqCst);
        self.probe.released.store(true, Ordering::SeqCst);
    }
}

/// 脚本化检测器
pub struct ScriptedDetector {
    scenario: Arc<Scenario>,
    failing: HashSet<u64>,
}

impl ScriptedDetector {
    pub fn new(scenario: Arc<Scenario>) -> Self {
        let failing = scenario.failing_frames.iter().copied().collect();
        Self { scenario, failing }
    }
}

impl Detector for ScriptedDetector {
    fn is_operational(&self) -> bool {
        !self.scenario.detector_unavailable
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
        if matches!(self.scenario.unavailable_from_frame, Some(from) if frame.index >= from) {
            return Err(DetectError::Unavailable(format!(
                "scripted detector lost at frame {}",
                frame.index
            )));
        }
        if self.failing.contains(&frame.index) {
            return Err(DetectError::Frame(format!("scripted failure at frame {}", frame.index)));
        }
        Ok(self
            .scenario
            .frames
            .get(frame.index as usize)
            .cloned()
            .unwrap_or_default())
    }
}
