use std::fmt;

/// 翻译引擎错误类型
#[derive(Debug)]
pub enum EngineError {
    /// 块不存在或可翻译内容为空
    ContentMissing { index: usize },
    /// 图片转换失败（下载 / 读取 / 编码）
    ImageConversionFailed { reason: String },
    /// MT 不支持的语言对
    UnsupportedLanguagePair { source: String, target: String },
    /// 网络请求失败
    Transport {
        endpoint: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 服务端返回了错误响应
    BadResponse { endpoint: String, message: String },
    /// 返回内容为空
    EmptyResponse { context: String },
    /// 流式响应中途失败
    StreamFailed { message: String },
    /// 请求参数无法构造成合法的 API 请求
    InvalidRequest { message: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::ContentMissing { index } => {
                write!(f, "块 {} 不存在或内容为空", index)
            }
            EngineError::ImageConversionFailed { reason } => {
                write!(f, "图片转换失败: {}", reason)
            }
            EngineError::UnsupportedLanguagePair { source, target } => {
                write!(f, "MT 不支持的语言对: {} -> {}", source, target)
            }
            EngineError::Transport { endpoint, source } => {
                write!(f, "网络请求失败 ({}): {}", endpoint, source)
            }
            EngineError::BadResponse { endpoint, message } => {
                write!(f, "服务端错误响应 ({}): {}", endpoint, message)
            }
            EngineError::EmptyResponse { context } => {
                write!(f, "返回内容为空 ({})", context)
            }
            EngineError::StreamFailed { message } => {
                write!(f, "流式响应失败: {}", message)
            }
            EngineError::InvalidRequest { message } => {
                write!(f, "请求构造失败: {}", message)
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Transport { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

impl EngineError {
    /// 批量重试时是否值得再试一次
    ///
    /// 传输类失败（网络、坏响应、空响应、断流）和图片转换失败会按退避策略重试；
    /// 校验类失败（内容缺失、语言对不支持）重试也不会有不同结果，直接判定失败。
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Transport { .. }
            | EngineError::BadResponse { .. }
            | EngineError::EmptyResponse { .. }
            | EngineError::StreamFailed { .. }
            | EngineError::ImageConversionFailed { .. } => true,
            EngineError::ContentMissing { .. }
            | EngineError::UnsupportedLanguagePair { .. }
            | EngineError::InvalidRequest { .. } => false,
        }
    }
}

// ========== 便捷构造函数 ==========

impl EngineError {
    /// 创建网络请求失败错误
    pub fn transport(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        EngineError::Transport {
            endpoint: endpoint.into(),
            source: Box::new(source),
        }
    }

    /// 创建图片转换失败错误
    pub fn image_conversion(reason: impl Into<String>) -> Self {
        EngineError::ImageConversionFailed {
            reason: reason.into(),
        }
    }

    /// 创建服务端错误响应
    pub fn bad_response(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::BadResponse {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 引擎结果类型
pub type EngineResult<T> = Result<T, EngineError>;
