/// 叠加层模型 (Overlay Model)
///
/// 跟踪注册表的可渲染投影:
/// - project:      纯函数, 图像坐标 → 视图坐标 + 角框线段 + 标签
/// - OverlayModel: 持有最新一帧的快照, 供渲染线程随时读取
///
/// 渲染后端只消费 `DrawableShape`, 每次收到变更通知或视图尺寸变化时重新投影,
/// 不得跨投影保留旧的图形。
use std::sync::{Arc, PoisonError, RwLock};

use crossbeam_channel::{Receiver, Sender};

use crate::config::CameraFacing;
use crate::detection::tracker::TrackedObject;
use crate::detection::types::{Rect, Rgb};

// ========== 绘制常量 ==========

/// 角框线宽
pub const STROKE_WIDTH: f32 = 24.0;
/// 角框边长
pub const CORNER_WIDTH: f32 = 64.0;
/// 水平角线外延
pub const CORNER_PADDING: f32 = STROKE_WIDTH / 2.0;
/// 标签基线距框底的距离
pub const LABEL_OFFSET: f32 = 100.0;
/// 标签字号
pub const TEXT_SIZE: f32 = 46.0;

// ========== 数据结构 ==========

/// 投影几何参数
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct ProjectionGeometry {
    pub image_width: u32,
    pub image_height: u32,
    pub view_width: u32,
    pub view_height: u32,
    pub facing: CameraFacing,
}

impl ProjectionGeometry {
    fn scale(&self) -> (f32, f32) {
        (
            self.view_width as f32 / self.image_width as f32,
            self.view_height as f32 / self.image_height as f32,
        )
    }

    fn translate_x(&self, x: f32) -> f32 {
        let (sx, _) = self.scale();
        match self.facing {
            CameraFacing::Front => self.view_width as f32 - x * sx,
            CameraFacing::Back => x * sx,
        }
    }

    fn translate_y(&self, y: f32) -> f32 {
        y * self.scale().1
    }

    /// 图像坐标框 → 视图坐标框 (前置摄像头水平镜像, 保持 left <= right)
    pub fn to_view(&self, bbox: &Rect) -> Rect {
        let x1 = self.translate_x(bbox.left);
        let x2 = self.translate_x(bbox.right);
        Rect {
            left: x1.min(x2),
            top: self.translate_y(bbox.top),
            right: x1.max(x2),
            bottom: self.translate_y(bbox.bottom),
        }
    }
}

/// 线段 (视图坐标)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Segment {
    const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

/// 可绘制图形: 一个跟踪目标的四角框与内容标签
#[derive(Clone, Debug, PartialEq)]
pub struct DrawableShape {
    pub tracking_id: u32,
    pub rect: Rect,
    pub label: String,
    pub label_origin: (f32, f32),
    pub color: Rgb,
    pub stroke_width: f32,
    pub text_size: f32,
    pub segments: [Segment; 8],
}

/// 四个角各两条线段
fn corner_segments(r: &Rect) -> [Segment; 8] {
    let (p, c) = (CORNER_PADDING, CORNER_WIDTH);
    [
        // 左上
        Segment::new(r.left - p, r.top, r.left + c, r.top),
        Segment::new(r.left, r.top, r.left, r.top + c),
        // 左下
        Segment::new(r.left, r.bottom, r.left, r.bottom - c),
        Segment::new(r.left - p, r.bottom, r.left + c, r.bottom),
        // 右上
        Segment::new(r.right + p, r.top, r.right - c, r.top),
        Segment::new(r.right, r.top, r.right, r.top + c),
        // 右下
        Segment::new(r.right + p, r.bottom, r.right - c, r.bottom),
        Segment::new(r.right, r.bottom, r.right, r.bottom - c),
    ]
}

/// 将注册表快照投影为可绘制图形 (纯函数)
///
/// 尚未收到任何帧 (图像尺寸为0) 时返回空列表。
pub fn project(snapshot: &[TrackedObject], geometry: &ProjectionGeometry) -> Vec<DrawableShape> {
    if geometry.image_width == 0 || geometry.image_height == 0 {
        return Vec::new();
    }

    snapshot
        .iter()
        .map(|obj| {
            let rect = geometry.to_view(&obj.bbox);
            DrawableShape {
                tracking_id: obj.id,
                label: obj.payload.clone(),
                label_origin: (rect.left, rect.bottom + LABEL_OFFSET),
                color: obj.color,
                stroke_width: STROKE_WIDTH,
                text_size: TEXT_SIZE,
                segments: corner_segments(&rect),
                rect,
            }
        })
        .collect()
}

// ========== 共享模型 ==========

struct OverlayState {
    objects: Arc<Vec<TrackedObject>>,
    geometry: ProjectionGeometry,
    generation: u64,
}

/// 叠加层模型: 处理线程写入快照, 渲染线程读取并投影
pub struct OverlayModel {
    state: RwLock<OverlayState>,
    notify_tx: Sender<u64>,
    notify_rx: Receiver<u64>,
}

impl OverlayModel {
    pub fn new(view_width: u32, view_height: u32, facing: CameraFacing) -> Self {
        // 容量1: 渲染线程来不及处理时合并通知, 重新投影总是读取最新快照
        let (notify_tx, notify_rx) = crossbeam_channel::bounded(1);
        Self {
            state: RwLock::new(OverlayState {
                objects: Arc::new(Vec::new()),
                geometry: ProjectionGeometry {
                    image_width: 0,
                    image_height: 0,
                    view_width,
                    view_height,
                    facing,
                },
                generation: 0,
            }),
            notify_tx,
            notify_rx,
        }
    }

    /// 发布一帧完整快照 (整体替换, 读者不会看到半帧)
    pub fn publish(&self, objects: Vec<TrackedObject>, image_width: u32, image_height: u32) {
        let generation = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.objects = Arc::new(objects);
            state.geometry.image_width = image_width;
            state.geometry.image_height = image_height;
            state.generation += 1;
            state.generation
        };
        let _ = self.notify_tx.try_send(generation);
    }

    /// 视图尺寸变化 (例如旋转)
    pub fn set_view(&self, view_width: u32, view_height: u32) {
        let generation = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.geometry.view_width = view_width;
            state.geometry.view_height = view_height;
            state.generation += 1;
            state.generation
        };
        let _ = self.notify_tx.try_send(generation);
    }

    /// 当前快照与几何参数
    pub fn snapshot(&self) -> (Arc<Vec<TrackedObject>>, ProjectionGeometry) {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        (state.objects.clone(), state.geometry)
    }

    /// 投影当前快照 (锁外计算)
    pub fn shapes(&self) -> Vec<DrawableShape> {
        let (objects, geometry) = self.snapshot();
        project(&objects, &geometry)
    }

    pub fn generation(&self) -> u64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    /// 变更通知 (携带代数), 供渲染后端等待
    pub fn changes(&self) -> Receiver<u64> {
        self.notify_rx.clone()
    }

    /// 清空快照 (会话清理), 同样通知渲染后端重绘
    pub fn clear(&self) {
        let generation = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.objects = Arc::new(Vec::new());
            state.generation += 1;
            state.generation
        };
        let _ = self.notify_tx.try_send(generation);
    }
}
