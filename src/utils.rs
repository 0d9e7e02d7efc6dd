// 工具模块

use std::path::Path;
use std::process::Command;

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

/// Windows 下隐藏控制台窗口的标志
#[cfg(target_os = "windows")]
pub const CREATE_NO_WINDOW: u32 = 0x08000000;

/// 支持的图片格式
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// 导出的人脸裁剪图文件名标记：<stem>_face<N>.jpg
pub const FACE_CROP_MARKER: &str = "_face";

/// 创建一个隐藏控制台窗口的 Command（Windows 专用）
/// 在非 Windows 平台上等同于 Command::new
#[cfg(target_os = "windows")]
pub fn hidden_command(program: &str) -> Command {
    let mut cmd = Command::new(program);
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd
}

#[cfg(not(target_os = "windows"))]
pub fn hidden_command(program: &str) -> Command {
    Command::new(program)
}

/// 按扩展名判断是否为支持的图片
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// 生成人脸裁剪图的文件名
pub fn face_crop_name(stem: &str, index: usize) -> String {
    format!("{}{}{}.jpg", stem, FACE_CROP_MARKER, index)
}

/// 是否为本工具生成的人脸裁剪图（扫描时跳过，避免重复处理）
pub fn is_face_crop(path: &Path) -> bool {
    let stem = match path.file_stem().and_then(|s| s.to_str()) {
        Some(stem) => stem,
        None => return false,
    };
    match stem.rfind(FACE_CROP_MARKER) {
        Some(pos) => {
            let suffix = &stem[pos + FACE_CROP_MARKER.len()..];
            !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}
