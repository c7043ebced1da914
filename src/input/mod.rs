/// 输入系统 (Input System)
///
/// 摄像头与检测器是外部协作者, 会话只依赖这里的 trait
/// - FrameSource: 帧源 (获取/取帧/闪光灯/释放)
/// - Detector:    帧 → 检测列表
/// - Scripted:    JSON场景回放 (演示与测试)
pub mod scripted;
pub mod source;

pub use scripted::{Scenario, ScriptedDetector, ScriptedSource, SourceProbe};
pub use source::{Detector, FrameSource};
