// 人脸导出
//
// 对每个结果包：
// 1. 读取原图，按人脸记录裁剪，可选旋转 180 度，保存为 <stem>_face<N>.jpg
// 2. 把本包的人脸条目追加到同目录的汇总文件 (默认 result.json，JSON 数组)
//
// 同一目录下的图片会被不同导出线程并发处理，汇总文件的读-改-写按目录加锁。
// 不同目录之间互不阻塞。

use crate::config::ExportConfig;
use crate::error::{AppError, AppResult};
use crate::models::{DetectionRecord, FaceEntry, ResultPackage};
use crate::pipeline::Finisher;
use crate::utils::face_crop_name;
use image::DynamicImage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub struct FaceExporter {
    config: ExportConfig,
    dir_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl FaceExporter {
    pub fn new(config: ExportConfig) -> Self {
        Self {
            config,
            dir_locks: Mutex::new(HashMap::new()),
        }
    }

    /// 汇总文件路径
    pub fn result_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.config.result_file_name)
    }

    fn dir_lock(&self, dir: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.dir_locks.lock();
        Arc::clone(locks.entry(dir.to_path_buf()).or_default())
    }

    /// 裁剪并保存所有人脸，返回对应的汇总条目
    fn export_crops(&self, package: &ResultPackage, dir: &Path) -> AppResult<Vec<FaceEntry>> {
        let faces: Vec<&DetectionRecord> = package.faces().collect();

        if !self.config.crop_faces {
            let source = package.source.to_string_lossy().to_string();
            return Ok(faces
                .into_iter()
                .map(|face| FaceEntry::from_record(source.clone(), face))
                .collect());
        }

        let image = image::open(&package.source)?;
        let stem = package
            .source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());

        // 先校验全部区域，任何一个越界都不写出裁剪图
        for face in &faces {
            check_bounds(&image, face)?;
        }

        let mut entries = Vec::with_capacity(faces.len());
        for (index, face) in faces.into_iter().enumerate() {
            let crop_path = dir.join(face_crop_name(&stem, index));
            self.save_crop(&image, face, &crop_path)?;
            entries.push(FaceEntry::from_record(crop_path.to_string_lossy().to_string(), face));
        }
        Ok(entries)
    }

    fn save_crop(&self, image: &DynamicImage, face: &DetectionRecord, crop_path: &Path) -> AppResult<()> {
        let mut crop = image.crop_imm(face.x, face.y, face.width, face.height).to_rgb8();
        if self.config.rotate_crops {
            crop = image::imageops::rotate180(&crop);
        }
        crop.save(crop_path)?;
        debug!("[EXPORT] 已保存人脸: {}", crop_path.display());
        Ok(())
    }

    /// 追加到目录汇总文件，先写临时文件再重命名，避免中途失败留下半个 JSON
    fn append_entries(&self, dir: &Path, entries: Vec<FaceEntry>) -> AppResult<()> {
        let lock = self.dir_lock(dir);
        let _guard = lock.lock();

        let result_path = self.result_path(dir);
        let mut all: Vec<FaceEntry> = if result_path.exists() {
            let content = fs::read_to_string(&result_path)?;
            serde_json::from_str(&content).map_err(|e| {
                AppError::Completion(format!("汇总文件损坏 {}: {}", result_path.display(), e))
            })?
        } else {
            Vec::new()
        };
        all.extend(entries);

        let tmp_path = result_path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_string_pretty(&all)?)?;
        fs::rename(&tmp_path, &result_path)?;
        Ok(())
    }
}

fn check_bounds(image: &DynamicImage, face: &DetectionRecord) -> AppResult<()> {
    let (x2, y2) = face.bottom_right();
    if face.width == 0 || face.height == 0 || x2 > image.width() || y2 > image.height() {
        return Err(AppError::Completion(format!(
            "人脸区域 ({}, {}, {}x{}) 超出图片范围 {}x{}",
            face.x, face.y, face.width, face.height, image.width(), image.height()
        )));
    }
    Ok(())
}

impl Finisher for FaceExporter {
    fn finish(&self, package: &ResultPackage) -> AppResult<()> {
        if package.faces().next().is_none() {
            debug!("[EXPORT] {} 没有人脸记录，跳过", package.source.display());
            return Ok(());
        }

        let dir = match package.source.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let entries = self.export_crops(package, &dir)?;
        let count = entries.len();
        self.append_entries(&dir, entries)?;

        info!("[EXPORT] {} -> {} 张人脸", package.source.display(), count);
        Ok(())
    }
}
