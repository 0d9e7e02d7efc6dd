// FaceScan - 人脸特征批量检测工具
// 主入口文件

use clap::Parser;
use facescan::commands;
use facescan::config::{self, AppConfig, LogLevel};
use facescan::error::AppResult;
use facescan::logging;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// 递归扫描目录中的图片，检测人脸/眼睛/嘴部并导出人脸裁剪图与 result.json
#[derive(Parser, Debug)]
#[command(name = "facescan", version, about)]
struct Cli {
    /// 要扫描的目录（仅 --write-config 时可省略）
    #[arg(required_unless_present = "write_config")]
    dir: Option<PathBuf>,

    /// 检测线程数（默认 CPU 逻辑核数）
    #[arg(short = 'd', long)]
    detection_workers: Option<usize>,

    /// 导出线程数（默认 CPU 逻辑核数）
    #[arg(short = 'c', long)]
    completion_workers: Option<usize>,

    /// JSON 配置文件
    #[arg(long)]
    config: Option<PathBuf>,

    /// 外部检测程序，覆盖配置文件
    #[arg(long)]
    detector: Option<String>,

    /// 传给检测程序的额外参数（可重复），放在图片路径之前
    #[arg(long = "detector-arg", allow_hyphen_values = true)]
    detector_args: Vec<String>,

    /// 日志目录
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// 日志级别: error/warn/info/debug/trace
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// 将合并后的配置写入该文件后退出
    #[arg(long)]
    write_config: Option<PathBuf>,
}

impl Cli {
    /// 加载配置文件并用命令行参数覆盖
    fn resolve_config(&self) -> AppResult<AppConfig> {
        let mut config = match &self.config {
            Some(path) => config::load_config(path)?,
            None => AppConfig::default(),
        };

        if let Some(n) = self.detection_workers {
            config.pipeline.detection_workers = n;
        }
        if let Some(n) = self.completion_workers {
            config.pipeline.completion_workers = n;
        }
        if let Some(program) = &self.detector {
            config.detector.program = Some(program.clone());
        }
        if !self.detector_args.is_empty() {
            config.detector.args = self.detector_args.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = Some(dir.clone());
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(path) = &cli.write_config {
        return match config::save_config(path, &config) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("ERROR: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let Some(dir) = &cli.dir else {
        eprintln!("ERROR: 缺少要扫描的目录");
        return ExitCode::FAILURE;
    };

    // guard 必须保持存活，否则异步日志线程会退出
    let _log_guard = logging::init_logging(config.log_dir.as_deref(), &config.log_level);

    info!("FaceScan 启动: {}", dir.display());

    match commands::run_scan(dir, &config) {
        Ok(stats) => {
            match serde_json::to_string_pretty(&stats) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("统计结果序列化失败: {}", e),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("扫描失败: {}", e);
            ExitCode::FAILURE
        }
    }
}
