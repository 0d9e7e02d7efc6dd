// 数据模型
//
// 检测记录 → 结果包 → 导出条目，三者在流水线中依次流转。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 检测到的区域类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DetectionKind {
    Face,
    Eyes,
    Mouth,
}

/// 单个检测区域（坐标相对于检测器输入的图像）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetectionRecord {
    pub kind: DetectionKind,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl DetectionRecord {
    pub fn new(kind: DetectionKind, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { kind, x, y, width, height }
    }

    /// 右下角坐标 (x + width, y + height)
    pub fn bottom_right(&self) -> (u32, u32) {
        (self.x.saturating_add(self.width), self.y.saturating_add(self.height))
    }
}

/// 结果包：一个工作项及其全部检测记录
///
/// 只有检测器返回至少一条记录时才会生成，由恰好一个导出线程消费一次。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPackage {
    pub source: PathBuf,
    pub records: Vec<DetectionRecord>,
}

impl ResultPackage {
    pub fn faces(&self) -> impl Iterator<Item = &DetectionRecord> {
        self.records.iter().filter(|r| r.kind == DetectionKind::Face)
    }
}

/// 目录汇总文件 (result.json) 中的一个元素
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FaceEntry {
    /// 裁剪出的人脸图片路径
    pub filename: String,
    /// [[x1, y1], [x2, y2]]
    pub coordinates: [[u32; 2]; 2],
}

impl FaceEntry {
    pub fn from_record(filename: String, record: &DetectionRecord) -> Self {
        let (x2, y2) = record.bottom_right();
        Self {
            filename,
            coordinates: [[record.x, record.y], [x2, y2]],
        }
    }
}
