//! 扫描器构建器
//!
//! 一次性使用: `build` 取走帧源与检测器, 再次调用返回配置错误。

use std::sync::Arc;

use log::debug;

use super::hooks::{NoHooks, ScanHooks};
use super::worker::Pipeline;
use super::ScanSession;
use crate::config::{CameraFacing, ScannerConfig, Surface, TrackerMode};
use crate::detection::types::{BarcodeFormats, Rgb};
use crate::error::{ScanError, ScanResult};
use crate::input::{Detector, FrameSource};

/// 结果回调 (在 `await_result` 中调用一次)
pub type ResultCallback = Box<dyn FnOnce(String) + Send>;

pub struct ScannerBuilder {
    config: ScannerConfig,
    surface: Option<Surface>,
    source: Option<Box<dyn FrameSource>>,
    detector: Option<Box<dyn Detector>>,
    hooks: Arc<dyn ScanHooks>,
    on_result: Option<ResultCallback>,
    used: bool,
}

impl Default for ScannerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScannerBuilder {
    pub fn new() -> Self {
        Self::from_config(ScannerConfig::default())
    }

    /// 以已有配置 (例如从JSON加载) 为起点
    pub fn from_config(config: ScannerConfig) -> Self {
        Self {
            config,
            surface: None,
            source: None,
            detector: None,
            hooks: Arc::new(NoHooks),
            on_result: None,
            used: false,
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    // ========== 绑定协作者 ==========

    /// 绑定预览/叠加层目标表面 (启动前必须绑定)
    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_frame_source(mut self, source: impl FrameSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_detector(mut self, detector: impl Detector + 'static) -> Self {
        self.detector = Some(Box::new(detector));
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ScanHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_result_listener(mut self, listener: impl FnOnce(String) + Send + 'static) -> Self {
        self.on_result = Some(Box::new(listener));
        self
    }

    // ========== 摄像头 ==========

    pub fn with_back_facing_camera(self) -> Self {
        self.with_camera_facing(CameraFacing::Back)
    }

    pub fn with_front_facing_camera(self) -> Self {
        self.with_camera_facing(CameraFacing::Front)
    }

    pub fn with_camera_facing(mut self, facing: CameraFacing) -> Self {
        self.config.camera_facing = facing;
        self
    }

    pub fn with_auto_focus(mut self, enabled: bool) -> Self {
        self.config.auto_focus = enabled;
        self
    }

    pub fn with_flash_light_enabled_by_default(mut self) -> Self {
        self.config.flash_on_by_default = true;
        self
    }

    // ========== 反馈 ==========

    pub fn with_tracker_color(mut self, color: Rgb) -> Self {
        self.config.tracker_color = color;
        self
    }

    pub fn with_bleep_enabled(mut self, enabled: bool) -> Self {
        self.config.bleep_on_detect = enabled;
        self
    }

    /// 中心框模式 (隐藏逐目标的角框)
    pub fn with_center_tracker(mut self) -> Self {
        self.config.tracker_mode = TrackerMode::Center;
        self
    }

    pub fn with_center_tracker_resources(mut self, idle: u32, detected: u32) -> Self {
        self.config.tracker_mode = TrackerMode::Center;
        self.config.center_tracker.idle_resource = idle;
        self.config.center_tracker.detected_resource = detected;
        self
    }

    // ========== 格式 ==========

    pub fn with_barcode_formats(mut self, formats: BarcodeFormats) -> Self {
        self.config.barcode_formats = formats;
        self
    }

    pub fn with_only_linear_scanning(self) -> Self {
        self.with_barcode_formats(BarcodeFormats::linear())
    }

    pub fn with_only_matrix_scanning(self) -> Self {
        self.with_barcode_formats(BarcodeFormats::matrix())
    }

    pub fn with_only_qr_code_scanning(self) -> Self {
        self.with_barcode_formats(BarcodeFormats::QR_CODE)
    }

    /// 构建会话; 每个构建器只能成功构建一次
    pub fn build(&mut self) -> ScanResult<ScanSession> {
        if self.used {
            return Err(ScanError::Configuration(
                "must not reuse a scanner builder".into(),
            ));
        }
        if self.config.barcode_formats.is_empty() {
            return Err(ScanError::Configuration(
                "at least one barcode format must be enabled".into(),
            ));
        }
        let source = self
            .source
            .take()
            .ok_or_else(|| ScanError::Configuration("no frame source configured".into()))?;
        let Some(detector) = self.detector.take() else {
            self.source = Some(source);
            return Err(ScanError::Configuration("no detector configured".into()));
        };
        self.used = true;

        debug!("🔧 构建扫描会话: {:?}", self.config);
        Ok(ScanSession::new(
            self.config.clone(),
            self.surface.clone(),
            Pipeline { source, detector },
            self.hooks.clone(),
            self.on_result.take(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Scenario;
    use crate::session::SessionState;

    #[test]
    fn test_builder_is_single_use() {
        let (source, detector) = Scenario::from_frames(10, 10, vec![]).into_pipeline();
        let mut builder = ScannerBuilder::new()
            .with_surface(Surface::new("preview", 10, 10))
            .with_frame_source(source)
            .with_detector(detector);

        let session = builder.build().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(matches!(builder.build(), Err(ScanError::Configuration(_))));
    }

    #[test]
    fn test_missing_collaborators() {
        let (source, detector) = Scenario::default().into_pipeline();
        assert!(ScannerBuilder::new().build().is_err());
        assert!(ScannerBuilder::new()
            .with_frame_source(source)
            .build()
            .is_err());

        // 缺检测器时不消耗构建器
        let (source, _) = Scenario::default().into_pipeline();
        let mut builder = ScannerBuilder::new().with_frame_source(source);
        assert!(builder.build().is_err());
        let mut builder = builder.with_detector(detector);
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_format_presets() {
        let b = ScannerBuilder::new().with_only_qr_code_scanning();
        assert_eq!(b.config().barcode_formats, BarcodeFormats::QR_CODE);
        let b = b.with_only_linear_scanning();
        assert!(b.config().barcode_formats.contains(BarcodeFormats::EAN_13));
        assert!(!b.config().barcode_formats.contains(BarcodeFormats::QR_CODE));
        let b = b.with_only_matrix_scanning();
        assert!(b.config().barcode_formats.contains(BarcodeFormats::DATA_MATRIX));
    }

    #[test]
    fn test_empty_format_mask_rejected() {
        let (source, detector) = Scenario::default().into_pipeline();
        let mut builder = ScannerBuilder::new()
            .with_barcode_formats(BarcodeFormats::empty())
            .with_frame_source(source)
            .with_detector(detector);
        assert!(matches!(builder.build(), Err(ScanError::Configuration(_))));
    }

    #[test]
    fn test_camera_and_feedback_options() {
        let b = ScannerBuilder::new()
            .with_front_facing_camera()
            .with_auto_focus(true)
            .with_bleep_enabled(true)
            .with_center_tracker_resources(7, 8);
        let c = b.config();
        assert_eq!(c.camera_facing, CameraFacing::Front);
        assert!(c.auto_focus && c.bleep_on_detect);
        assert_eq!(c.tracker_mode, TrackerMode::Center);
        assert_eq!(c.center_tracker.detected_resource, 8);
    }
}
