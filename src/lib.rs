pub mod config; // 扫描配置参数
pub mod detection; // 跟踪与去重
pub mod error; // 错误类型
pub mod input; // 帧源与检测器接口
pub mod overlay; // 叠加层投影
pub mod renderer; // 画布渲染后端
pub mod session; // 扫描会话状态机

pub use crate::config::{CameraFacing, ScannerConfig, Surface, TrackerMode};
pub use crate::detection::{BarcodeFormats, Detection, Frame, Rect, Rgb};
pub use crate::error::{ScanError, ScanResult};
pub use crate::overlay::{DrawableShape, OverlayModel};
pub use crate::renderer::CanvasRenderer;
pub use crate::session::{
    CenterVisual, Delivery, ResultChannel, ScanHooks, ScanSession, ScannerBuilder, SessionState,
};

/// 时间戳字符串 (北京时间), 用于输出文件命名
pub fn gen_time_string(delimiter: &str) -> String {
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    let now = chrono::Utc::now();
    match chrono::FixedOffset::east_opt(8 * 60 * 60) {
        Some(beijing) => now.with_timezone(&beijing).format(&fmt).to_string(),
        None => now.format(&fmt).to_string(),
    }
}
