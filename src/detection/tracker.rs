//! 目标跟踪注册表
//! Tracks detector-assigned ids across frames as persistent objects

use std::collections::HashMap;

use super::types::{BarcodeFormats, Detection, Rect, Rgb};

// ========== 公共数据结构 ==========

/// 跟踪对象 (一个逻辑目标在多帧间的状态)
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedObject {
    /// 检测器分配的跟踪ID
    pub id: u32,

    /// 最近一帧的解码内容
    pub payload: String,

    /// 最近一帧的边界框 (图像坐标)
    pub bbox: Rect,

    /// 显示颜色
    pub color: Rgb,

    /// 最近一帧报告的格式 (未报告时为空集)
    pub format: BarcodeFormats,

    /// 总共被跟踪的帧数 (age)
    pub frames_seen: u32,
}

impl TrackedObject {
    fn new(detection: &Detection, color: Rgb) -> Self {
        Self {
            id: detection.tracking_id,
            payload: detection.payload.clone(),
            bbox: detection.bbox,
            color,
            format: detection.format.unwrap_or(BarcodeFormats::empty()),
            frames_seen: 1,
        }
    }

    fn update(&mut self, detection: &Detection) {
        self.payload.clone_from(&detection.payload);
        self.bbox = detection.bbox;
        self.format = detection.format.unwrap_or(BarcodeFormats::empty());
        self.frames_seen += 1;
    }
}

/// 单帧差异事件
#[derive(Clone, Debug, PartialEq)]
pub enum DiffEvent {
    Created(TrackedObject),
    Updated(TrackedObject),
    Removed(TrackedObject),
}

impl DiffEvent {
    pub fn object(&self) -> &TrackedObject {
        match self {
            DiffEvent::Created(o) | DiffEvent::Updated(o) | DiffEvent::Removed(o) => o,
        }
    }
}

// ========== 注册表 ==========

/// 跟踪ID → 跟踪对象
///
/// 每次 `apply_frame` 之后, 注册表中的ID集合恰好等于该帧检测列表中的ID集合:
/// 新ID创建, 已有ID原地更新, 本帧缺席的ID立即移除 (不保留丢失帧)。
pub struct ObjectRegistry {
    objects: HashMap<u32, TrackedObject>,
    color: Rgb,
}

impl ObjectRegistry {
    pub fn new(color: Rgb) -> Self {
        Self {
            objects: HashMap::new(),
            color,
        }
    }

    /// 应用一帧检测结果, 返回差异事件
    ///
    /// 同一帧内重复的跟踪ID以最后一个检测为准, 每个ID只产生一个事件。
    pub fn apply_frame(&mut self, detections: &[Detection]) -> Vec<DiffEvent> {
        let mut latest: HashMap<u32, &Detection> = HashMap::with_capacity(detections.len());
        let mut order = Vec::with_capacity(detections.len());
        for det in detections {
            if latest.insert(det.tracking_id, det).is_none() {
                order.push(det.tracking_id);
            }
        }

        let mut events = Vec::with_capacity(order.len() + self.objects.len());

        // 1. 移除本帧缺席的目标
        let mut gone: Vec<u32> = self
            .objects
            .keys()
            .filter(|id| !latest.contains_key(id))
            .copied()
            .collect();
        gone.sort_unstable();
        for id in gone {
            if let Some(obj) = self.objects.remove(&id) {
                events.push(DiffEvent::Removed(obj));
            }
        }

        // 2. 创建或更新
        for id in order {
            let det = latest[&id];
            match self.objects.get_mut(&id) {
                Some(obj) => {
                    obj.update(det);
                    events.push(DiffEvent::Updated(obj.clone()));
                }
                None => {
                    let obj = TrackedObject::new(det, self.color);
                    self.objects.insert(id, obj.clone());
                    events.push(DiffEvent::Created(obj));
                }
            }
        }

        events
    }

    pub fn get(&self, id: u32) -> Option<&TrackedObject> {
        self.objects.get(&id)
    }

    /// 当前所有对象的快照 (按ID排序)
    pub fn snapshot(&self) -> Vec<TrackedObject> {
        let mut objects: Vec<TrackedObject> = self.objects.values().cloned().collect();
        objects.sort_by_key(|o| o.id);
        objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// 清除所有跟踪 (会话停止时调用)
    pub fn clear(&mut self) {
        self.objects.clear();
    }
}
