// 配置管理模块
//
// 配置以 JSON 文件保存，由调用方显式加载并传入流水线，不使用进程级全局状态。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::fs;
use crate::error::{AppError, AppResult};
use tracing::{info, warn};

/// 日志级别
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    /// 转换为 tracing 过滤器字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(AppError::InvalidArgument(format!("未知日志级别: {}", other))),
        }
    }
}

fn default_worker_count() -> usize {
    num_cpus::get().max(1)
}

/// 流水线线程配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 检测线程数（CPU 密集）
    #[serde(default = "default_worker_count")]
    pub detection_workers: usize,
    /// 导出线程数（IO 密集）
    #[serde(default = "default_worker_count")]
    pub completion_workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detection_workers: default_worker_count(),
            completion_workers: default_worker_count(),
        }
    }
}

impl PipelineConfig {
    pub fn new(detection_workers: usize, completion_workers: usize) -> Self {
        Self { detection_workers, completion_workers }
    }

    /// 两组线程数都必须大于 0，否则输入队列永远无法被消费，提交方会在水位线处永久阻塞
    pub fn validate(&self) -> AppResult<()> {
        if self.detection_workers == 0 {
            return Err(AppError::InvalidConfiguration("检测线程数不能为 0".to_string()));
        }
        if self.completion_workers == 0 {
            return Err(AppError::InvalidConfiguration("导出线程数不能为 0".to_string()));
        }
        Ok(())
    }
}

/// 外部检测程序配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// 检测程序路径，为空时必须通过命令行指定
    #[serde(default)]
    pub program: Option<String>,
    /// 放在图片路径之前的额外参数
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_result_file_name() -> String {
    "result.json".to_string()
}

fn default_true() -> bool {
    true
}

/// 结果导出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// 每个目录下的汇总文件名
    #[serde(default = "default_result_file_name")]
    pub result_file_name: String,
    /// 是否裁剪并保存人脸图片
    #[serde(default = "default_true")]
    pub crop_faces: bool,
    /// 裁剪图是否旋转 180 度（水平 + 垂直翻转）
    #[serde(default = "default_true")]
    pub rotate_crops: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            result_file_name: default_result_file_name(),
            crop_faces: true,
            rotate_crops: true,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub export: ExportConfig,
    /// 日志级别
    #[serde(default)]
    pub log_level: LogLevel,
    /// 日志目录，未设置时只输出到控制台
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn validate(&self) -> AppResult<()> {
        self.pipeline.validate()?;
        if self.export.result_file_name.trim().is_empty() {
            return Err(AppError::Config("汇总文件名不能为空".to_string()));
        }
        Ok(())
    }
}

/// 从 JSON 文件加载配置
pub fn load_config(config_path: &Path) -> AppResult<AppConfig> {
    if !config_path.exists() {
        return Err(AppError::NotFound(format!("配置文件不存在: {}", config_path.display())));
    }

    let content = fs::read_to_string(config_path)?;
    let config: AppConfig = serde_json::from_str(&content).map_err(|e| {
        warn!("[CONFIG] 配置文件 JSON 解析失败: {}", e);
        AppError::Config(format!("配置文件解析失败 {}: {}", config_path.display(), e))
    })?;

    info!("[CONFIG] 配置已加载: {}", config_path.display());
    Ok(config)
}

/// 将配置写回文件（用于生成默认配置模板）
pub fn save_config(config_path: &Path, config: &AppConfig) -> AppResult<()> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(config_path, content)?;
    info!("[CONFIG] 配置已保存: {}", config_path.display());
    Ok(())
}
