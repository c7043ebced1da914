//! 外部协作者接口: 帧源与检测器
//!
//! 会话只通过这两个 trait 访问摄像头和检测器, 真实硬件由宿主实现。

use crate::config::CameraSettings;
use crate::detection::types::{Detection, Frame};
use crate::error::{DetectError, SourceError};

/// 帧源 (摄像头)
pub trait FrameSource: Send {
    /// 获取摄像头 (权限被拒/硬件占用时失败)
    fn acquire(&mut self, settings: &CameraSettings) -> Result<(), SourceError>;

    /// 下一帧; `None` 表示流结束
    fn next_frame(&mut self) -> Option<Frame>;

    /// 闪光灯开关
    fn set_torch(&mut self, _on: bool) {}

    /// 释放摄像头
    fn release(&mut self);
}

/// 检测器: 帧 → (跟踪ID, 内容, 边界框) 列表
pub trait Detector: Send {
    /// 检测器依赖是否就绪
    fn is_operational(&self) -> bool {
        true
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectError>;
}
