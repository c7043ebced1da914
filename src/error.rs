//! 扫描会话错误类型
//! Error taxonomy of the scan session

use thiserror::Error;

/// 会话级错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// 构建器/会话误用 (致命, 不重试)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 帧源或检测器未就绪 (可在解决原因后重试 start)
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// 同一会话内重复发布结果
    #[error("result already published for this session")]
    AlreadyPublished,

    /// 结果通道已失效 (会话已清理)
    #[error("result channel closed")]
    ChannelClosed,
}

pub type ScanResult<T> = Result<T, ScanError>;

/// 帧源获取失败原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("camera busy: {0}")]
    Busy(String),

    #[error("frame source failure: {0}")]
    Io(String),
}

/// 检测器错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectError {
    /// 检测器整体不可用 (等价于 ResourceUnavailable)
    #[error("detector unavailable: {0}")]
    Unavailable(String),

    /// 单帧失败, 丢弃该帧即可
    #[error("frame rejected: {0}")]
    Frame(String),
}

impl From<SourceError> for ScanError {
    fn from(e: SourceError) -> Self {
        ScanError::ResourceUnavailable(e.to_string())
    }
}

impl From<DetectError> for ScanError {
    fn from(e: DetectError) -> Self {
        ScanError::ResourceUnavailable(e.to_string())
    }
}
