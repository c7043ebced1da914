//! 扫描器配置 - 可通过JSON文件调整参数

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::detection::types::{BarcodeFormats, Rgb};

/// 摄像头朝向
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    #[default]
    Back,
    Front,
}

/// 跟踪框显示模式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerMode {
    /// 每个目标绘制角框
    #[default]
    Free,
    /// 固定的中心框, 检测到时切换为"已检测"样式 (纯视觉)
    Center,
}

/// 中心框样式与计时
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CenterTrackerStyle {
    pub idle_resource: u32,
    pub detected_resource: u32,
    pub hold_ms: u64, // 已检测样式保持时间
    pub tick_ms: u64, // 倒计时检查间隔 (纯视觉参数)
}

impl Default for CenterTrackerStyle {
    fn default() -> Self {
        Self {
            idle_resource: 0,
            detected_resource: 1,
            hold_ms: 500,
            tick_ms: 100,
        }
    }
}

impl CenterTrackerStyle {
    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

/// 扫描器参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    // === 检测参数 ===
    pub barcode_formats: BarcodeFormats,

    // === 摄像头参数 ===
    pub camera_facing: CameraFacing,
    pub auto_focus: bool,
    pub flash_on_by_default: bool,

    // === 反馈参数 ===
    pub bleep_on_detect: bool,
    pub tracker_mode: TrackerMode,
    pub tracker_color: Rgb,
    pub center_tracker: CenterTrackerStyle,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            barcode_formats: BarcodeFormats::all(),
            camera_facing: CameraFacing::Back,
            auto_focus: false,
            flash_on_by_default: false,
            bleep_on_detect: false,
            tracker_mode: TrackerMode::Free,
            tracker_color: Rgb::MATERIAL_RED,
            center_tracker: CenterTrackerStyle::default(),
        }
    }
}

impl ScannerConfig {
    /// 从JSON文件加载配置
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!("❌ 保存配置失败: {:#}", e);
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, json).with_context(|| format!("写入 {} 失败", path.display()))?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 交给帧源的摄像头参数
    pub fn camera_settings(&self) -> CameraSettings {
        CameraSettings {
            facing: self.camera_facing,
            auto_focus: self.auto_focus,
            torch: self.flash_on_by_default,
        }
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        info!("🎛️  当前扫描配置:");
        info!("  格式掩码: {:#06x}", self.barcode_formats.bits());
        info!("  摄像头: {:?} | 自动对焦: {}", self.camera_facing, self.auto_focus);
        info!(
            "  提示音: {} | 默认闪光灯: {}",
            self.bleep_on_detect, self.flash_on_by_default
        );
        info!(
            "  跟踪模式: {:?} | 颜色: #{:02X}{:02X}{:02X}",
            self.tracker_mode, self.tracker_color.r, self.tracker_color.g, self.tracker_color.b
        );
    }
}

/// 帧源获取时使用的摄像头参数
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CameraSettings {
    pub facing: CameraFacing,
    pub auto_focus: bool,
    pub torch: bool,
}

/// 目标显示表面 (会话绑定的宿主视图)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Surface {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl Surface {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_material_scanner() {
        let config = ScannerConfig::default();
        assert_eq!(config.tracker_color, Rgb::parse_hex("#F44336").unwrap());
        assert_eq!(config.camera_facing, CameraFacing::Back);
        assert_eq!(config.tracker_mode, TrackerMode::Free);
        assert_eq!(config.center_tracker.hold(), Duration::from_millis(500));
        assert!(!config.bleep_on_detect);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ScannerConfig =
            serde_json::from_str(r#"{ "camera_facing": "front", "tracker_mode": "center" }"#)
                .unwrap();
        assert_eq!(config.camera_facing, CameraFacing::Front);
        assert_eq!(config.tracker_mode, TrackerMode::Center);
        assert_eq!(config.barcode_formats, BarcodeFormats::all());
    }

    #[test]
    fn test_save_then_load() {
        let dir = std::env::temp_dir().join(format!("scan-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("scanner.json");

        let config = ScannerConfig {
            barcode_formats: BarcodeFormats::QR_CODE,
            bleep_on_detect: true,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(ScannerConfig::load(&path), config);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_missing_file_writes_defaults() {
        let dir = std::env::temp_dir().join(format!("scan-config-missing-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("absent.json");

        assert_eq!(ScannerConfig::load(&path), ScannerConfig::default());
        assert!(path.exists());

        fs::remove_dir_all(&dir).unwrap();
    }
}
