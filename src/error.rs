// 错误处理模块

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 解析错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("图像处理错误: {0}")]
    Image(#[from] image::ImageError),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("未找到: {0}")]
    NotFound(String),

    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 构造流水线时参数非法（例如某一组工作线程数为 0）
    #[error("无效的流水线配置: {0}")]
    InvalidConfiguration(String),

    /// 流水线已开始关闭，拒绝新的提交
    #[error("线程池已关闭，无法提交新任务")]
    PoolClosed,

    /// 重复调用 shutdown
    #[error("线程池已经关闭过")]
    AlreadyClosed,

    #[error("检测失败: {0}")]
    Detection(String),

    #[error("结果导出失败: {0}")]
    Completion(String),
}

pub type AppResult<T> = Result<T, AppError>;
