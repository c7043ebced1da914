/// 检测系统 (Detection System)
///
/// 处理线程内的纯数据部分
/// - types:   帧、检测结果、格式掩码
/// - tracker: 跟踪注册表 (跨帧稳定的目标)
/// - dedup:   内容去重 (每个会话每个内容最多一次 "新检测")
pub mod dedup;
pub mod tracker;
pub mod types;

pub use dedup::DeduplicationFilter;
pub use tracker::{DiffEvent, ObjectRegistry, TrackedObject};
pub use types::{BarcodeFormats, Detection, Frame, Rect, Rgb};
