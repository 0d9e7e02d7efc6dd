// 外部检测程序适配
//
// 调用外部检测程序（例如基于级联分类器的人脸/眼睛/嘴部检测脚本）处理单张图片，
// 程序从 stdout 输出 JSON 数组，每个元素为一条检测记录：
//   [{"kind": "face", "x": 10, "y": 20, "width": 64, "height": 64}, ...]
// 退出码非 0 视为检测失败。
//
// 每次调用都启动独立子进程，多个检测线程并发调用时互不共享状态。

use crate::config::DetectorConfig;
use crate::error::{AppError, AppResult};
use crate::models::DetectionRecord;
use crate::pipeline::Detector;
use crate::utils::hidden_command;
use std::path::Path;
use std::process::Stdio;
use tracing::{debug, error};

/// 错误输出最多保留的字符数
const MAX_ERROR_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct ExternalDetector {
    program: String,
    args: Vec<String>,
}

impl ExternalDetector {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// 从配置构建，未配置检测程序时返回错误
    pub fn from_config(config: &DetectorConfig) -> AppResult<Self> {
        let program = config
            .program
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| AppError::Config("未配置检测程序".to_string()))?;
        Ok(Self::new(program, config.args.clone()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Detector for ExternalDetector {
    fn detect(&self, item: &Path) -> AppResult<Vec<DetectionRecord>> {
        if !item.is_file() {
            return Err(AppError::NotFound(format!("图片文件不存在: {}", item.display())));
        }

        debug!("[DETECT] 调用 {} 处理 {}", self.program, item.display());
        let output = hidden_command(&self.program)
            .args(&self.args)
            .arg(item)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                error!("[DETECT] 启动检测程序 {} 失败: {}", self.program, e);
                AppError::Detection(format!("启动检测程序 {} 失败: {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                format!("检测程序退出码 {:?}（无错误输出）", output.status.code())
            } else {
                format!(
                    "检测程序退出码 {:?}: {}",
                    output.status.code(),
                    stderr.trim().chars().take(MAX_ERROR_CHARS).collect::<String>()
                )
            };
            return Err(AppError::Detection(message));
        }

        parse_records(&output.stdout)
    }
}

/// 解析检测程序的 stdout；空输出视为没有检测到任何区域
fn parse_records(stdout: &[u8]) -> AppResult<Vec<DetectionRecord>> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(text)
        .map_err(|e| AppError::Detection(format!("解析检测结果失败: {}", e)))
}
