/// 画布渲染器 (Canvas Renderer)
///
/// 叠加层的参考渲染后端: 把 `DrawableShape` 画到 RGBA 画布上
/// - 角框线段: 轴对齐粗线, 用填充矩形绘制
/// - 标签: 提供字体时绘制内容文本
/// - 中心框: 中心框模式下按视觉状态切换颜色
use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect as PixelRect;
use log::{debug, info};

use crate::detection::types::Rgb;
use crate::gen_time_string;
use crate::overlay::{DrawableShape, Segment, STROKE_WIDTH};
use crate::session::CenterVisual;

/// 中心框 "已检测" 颜色
const CENTER_DETECTED: Rgba<u8> = Rgba([76, 175, 80, 255]);
/// 中心框 "空闲" 颜色
const CENTER_IDLE: Rgba<u8> = Rgba([255, 255, 255, 200]);
const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

fn rgba(c: Rgb) -> Rgba<u8> {
    Rgba([c.r, c.g, c.b, 255])
}

/// 轴对齐线段 → 线宽为 `stroke` 的像素矩形; 完全在画布外时返回 None
fn segment_rect(s: &Segment, stroke: f32, width: u32, height: u32) -> Option<PixelRect> {
    let half = stroke / 2.0;
    let (x0, x1) = (s.x1.min(s.x2), s.x1.max(s.x2));
    let (y0, y1) = (s.y1.min(s.y2), s.y1.max(s.y2));
    // 水平线在竖直方向加粗, 竖直线在水平方向加粗
    let (left, right, top, bottom) = if (y1 - y0).abs() < f32::EPSILON {
        (x0, x1, y0 - half, y0 + half)
    } else {
        (x0 - half, x0 + half, y0, y1)
    };

    let left = left.round().max(0.0);
    let top = top.round().max(0.0);
    let right = right.round().min(width as f32);
    let bottom = bottom.round().min(height as f32);
    if right - left < 1.0 || bottom - top < 1.0 {
        return None;
    }
    Some(
        PixelRect::at(left as i32, top as i32)
            .of_size((right - left) as u32, (bottom - top) as u32),
    )
}

pub struct CanvasRenderer {
    canvas: RgbaImage,
    font: Option<FontVec>,
    frames_drawn: u64,
}

impl CanvasRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::from_pixel(width.max(1), height.max(1), BACKGROUND),
            font: None,
            frames_drawn: 0,
        }
    }

    /// 加载标签字体 (TTF/OTF)
    pub fn with_font_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).with_context(|| format!("读取字体 {} 失败", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .with_context(|| format!("解析字体 {} 失败", path.display()))?;
        info!("✅ 字体已加载: {}", path.display());
        self.font = Some(font);
        Ok(self)
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// 视图尺寸变化时重建画布
    pub fn resize(&mut self, width: u32, height: u32) {
        self.canvas = RgbaImage::from_pixel(width.max(1), height.max(1), BACKGROUND);
    }

    /// 清空画布并绘制本次投影的全部图形 (不保留上一次的图形)
    pub fn render(&mut self, shapes: &[DrawableShape]) {
        let (w, h) = self.canvas.dimensions();
        for p in self.canvas.pixels_mut() {
            *p = BACKGROUND;
        }

        for shape in shapes {
            let color = rgba(shape.color);
            for segment in &shape.segments {
                if let Some(r) = segment_rect(segment, shape.stroke_width, w, h) {
                    draw_filled_rect_mut(&mut self.canvas, r, color);
                }
            }

            if let Some(font) = &self.font {
                // draw_text_mut 以文本左上角定位, 标签原点是基线
                let (x, baseline) = shape.label_origin;
                draw_text_mut(
                    &mut self.canvas,
                    color,
                    x.round() as i32,
                    (baseline - shape.text_size).round() as i32,
                    PxScale::from(shape.text_size),
                    font,
                    &shape.label,
                );
            }
        }

        self.frames_drawn += 1;
        debug!("🖼️  渲染 {} 个图形", shapes.len());
    }

    /// 中心框模式: 画布中央的固定方框
    pub fn render_center_tracker(&mut self, visual: CenterVisual) {
        let (w, h) = self.canvas.dimensions();
        for p in self.canvas.pixels_mut() {
            *p = BACKGROUND;
        }
        let color = match visual {
            CenterVisual::Idle => CENTER_IDLE,
            CenterVisual::Detected => CENTER_DETECTED,
        };

        let side = (w.min(h) as f32 * 0.6).max(1.0);
        let (cx, cy) = (w as f32 / 2.0, h as f32 / 2.0);
        let (l, t, r, b) = (cx - side / 2.0, cy - side / 2.0, cx + side / 2.0, cy + side / 2.0);
        let edge = |x1: f32, y1: f32, x2: f32, y2: f32| Segment { x1, y1, x2, y2 };
        let edges = [
            edge(l, t, r, t),
            edge(l, b, r, b),
            edge(l, t, l, b),
            edge(r, t, r, b),
        ];
        for edge in &edges {
            if let Some(rect) = segment_rect(edge, STROKE_WIDTH / 2.0, w, h) {
                draw_filled_rect_mut(&mut self.canvas, rect, color);
            }
        }
        self.frames_drawn += 1;
    }

    /// 保存当前画布为PNG, 文件名带时间戳
    pub fn save_png(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("创建目录 {} 失败", dir.display()))?;
        let path = dir.join(format!(
            "overlay-{}-{:05}.png",
            gen_time_string("-"),
            self.frames_drawn
        ));
        self.canvas
            .save(&path)
            .with_context(|| format!("保存 {} 失败", path.display()))?;
        debug!("💾 已保存 {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraFacing;
    use crate::detection::tracker::TrackedObject;
    use crate::detection::types::{BarcodeFormats, Rect};
    use crate::overlay::{project, ProjectionGeometry};

    fn shapes() -> Vec<DrawableShape> {
        let obj = TrackedObject {
            id: 1,
            payload: "XYZ".into(),
            bbox: Rect::new(100.0, 100.0, 300.0, 200.0),
            color: Rgb::MATERIAL_RED,
            format: BarcodeFormats::QR_CODE,
            frames_seen: 1,
        };
        let geometry = ProjectionGeometry {
            image_width: 640,
            image_height: 480,
            view_width: 640,
            view_height: 480,
            facing: CameraFacing::Back,
        };
        project(&[obj], &geometry)
    }

    #[test]
    fn test_corners_are_painted() {
        let mut renderer = CanvasRenderer::new(640, 480);
        renderer.render(&shapes());
        let red = rgba(Rgb::MATERIAL_RED);
        assert_eq!(*renderer.canvas().get_pixel(100, 100), red);
        assert_eq!(*renderer.canvas().get_pixel(300, 200), red);
        // 框中心不绘制
        assert_eq!(*renderer.canvas().get_pixel(200, 150), BACKGROUND);
        assert_eq!(renderer.frames_drawn(), 1);
    }

    #[test]
    fn test_render_does_not_retain_previous_shapes() {
        let mut renderer = CanvasRenderer::new(640, 480);
        renderer.render(&shapes());
        renderer.render(&[]);
        assert!(renderer.canvas().pixels().all(|p| *p == BACKGROUND));
    }

    #[test]
    fn test_offscreen_segment_is_skipped() {
        let s = Segment {
            x1: -500.0,
            y1: 10.0,
            x2: -100.0,
            y2: 10.0,
        };
        assert!(segment_rect(&s, 24.0, 640, 480).is_none());
        let s = Segment {
            x1: 10.0,
            y1: 10.0,
            x2: 10.0,
            y2: 90.0,
        };
        let r = segment_rect(&s, 24.0, 640, 480).unwrap();
        assert_eq!((r.left(), r.top(), r.width(), r.height()), (0, 10, 22, 80));
    }

    #[test]
    fn test_center_tracker_colors() {
        let mut renderer = CanvasRenderer::new(100, 100);
        renderer.render_center_tracker(CenterVisual::Detected);
        assert_eq!(*renderer.canvas().get_pixel(20, 50), CENTER_DETECTED);
        renderer.render_center_tracker(CenterVisual::Idle);
        assert_eq!(*renderer.canvas().get_pixel(20, 50), CENTER_IDLE);
    }

    #[test]
    fn test_save_png() {
        let dir = std::env::temp_dir().join(format!("scan-render-{}", std::process::id()));
        let mut renderer = CanvasRenderer::new(32, 32);
        renderer.render(&[]);
        let path = renderer.save_png(&dir).unwrap();
        assert!(path.exists());
        let _ = std::fs::remove_dir_all(dir);
    }
}
