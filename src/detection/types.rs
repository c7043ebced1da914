/// 扫描检测系统数据结构定义
/// Data structures shared by the tracking engine
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ========== 条码格式 ==========

bitflags! {
    /// 条码格式位掩码 (与检测器约定的格式编号一致)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct BarcodeFormats: u32 {
        const CODE_128 = 1;
        const CODE_39 = 2;
        const CODE_93 = 4;
        const CODABAR = 8;
        const DATA_MATRIX = 16;
        const EAN_13 = 32;
        const EAN_8 = 64;
        const ITF = 128;
        const QR_CODE = 256;
        const UPC_A = 512;
        const UPC_E = 1024;
        const PDF417 = 2048;
        const AZTEC = 4096;
    }
}

impl BarcodeFormats {
    /// 一维码: EAN-13, EAN-8, UPC-A, UPC-E, Code-39, Code-93, Code-128, ITF, Codabar
    pub fn linear() -> Self {
        Self::EAN_13
            | Self::EAN_8
            | Self::UPC_A
            | Self::UPC_E
            | Self::CODE_39
            | Self::CODE_93
            | Self::CODE_128
            | Self::ITF
            | Self::CODABAR
    }

    /// 二维码: QR Code, Data Matrix, PDF-417, Aztec
    pub fn matrix() -> Self {
        Self::QR_CODE | Self::DATA_MATRIX | Self::PDF417 | Self::AZTEC
    }
}

impl Default for BarcodeFormats {
    fn default() -> Self {
        Self::all()
    }
}

// ========== 几何与颜色 ==========

/// 边界框 (图像坐标系)
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// 获取中心点
    pub fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }
}

/// RGB颜色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Material Red 500 (#F44336)
    pub const MATERIAL_RED: Rgb = Rgb::new(0xF4, 0x43, 0x36);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// 解析 `#RRGGBB` 格式
    pub fn parse_hex(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Self::new(r, g, b))
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Self::MATERIAL_RED
    }
}

// ========== 帧与检测结果 ==========

/// 相机帧 (帧源 → 处理线程)
#[derive(Clone, Debug)]
pub struct Frame {
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub data: Arc<Vec<u8>>, // 使用Arc共享数据,避免复制
}

impl Frame {
    /// 无像素数据的帧 (模拟源使用)
    pub fn blank(index: u64, width: u32, height: u32) -> Self {
        Self {
            index,
            width,
            height,
            data: Arc::new(Vec::new()),
        }
    }
}

/// 单帧检测结果 (检测器 → 跟踪注册表)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub tracking_id: u32,
    pub payload: String,
    pub bbox: Rect,
    /// 检测器报告的格式 (未报告时不做格式过滤)
    #[serde(default)]
    pub format: Option<BarcodeFormats>,
}

impl Detection {
    pub fn new(tracking_id: u32, payload: impl Into<String>, bbox: Rect) -> Self {
        Self {
            tracking_id,
            payload: payload.into(),
            bbox,
            format: None,
        }
    }

    pub fn with_format(mut self, format: BarcodeFormats) -> Self {
        self.format = Some(format);
        self
    }
}
