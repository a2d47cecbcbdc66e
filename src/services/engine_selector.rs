//! 引擎选择服务 - 业务能力层
//!
//! 只负责"这个块该用哪个翻译引擎"，按优先级依次裁决：
//!
//! 1. 表格 / 图片 / 公式类型的块强制走 LLM（MT 无法保持结构）
//! 2. 用户偏好 LLM → LLM
//! 3. 用户偏好 MT → 语言对受支持则 MT，否则回退 LLM
//! 4. 自动模式 → 采纳语言检测器的建议

use tracing::debug;

use crate::models::block::BlockType;
use crate::services::lang_detector::DetectionResult;

/// 翻译引擎
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// 机器翻译后端（仅中英互译）
    Mt,
    /// 通用大模型后端
    Llm,
}

impl Engine {
    /// 获取引擎代码
    pub fn code(self) -> &'static str {
        match self {
            Engine::Mt => "mt",
            Engine::Llm => "llm",
        }
    }

    /// 获取引擎显示名称
    pub fn name(self) -> &'static str {
        match self {
            Engine::Mt => "机器翻译",
            Engine::Llm => "大模型",
        }
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 用户的引擎偏好
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnginePreference {
    /// 自动：采纳检测器建议
    #[default]
    Auto,
    /// 优先机器翻译
    Mt,
    /// 优先大模型
    Llm,
}

impl EnginePreference {
    /// 从配置字符串解析偏好
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Some(EnginePreference::Auto),
            "mt" => Some(EnginePreference::Mt),
            "llm" => Some(EnginePreference::Llm),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EnginePreference::Auto => "自动",
            EnginePreference::Mt => "机器翻译优先",
            EnginePreference::Llm => "大模型优先",
        }
    }
}

impl std::fmt::Display for EnginePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 引擎选择结果
#[derive(Debug, Clone)]
pub struct EngineSelection {
    pub engine: Engine,
    /// 非常规选择的原因（强制 LLM、MT 回退等）
    pub reason: Option<String>,
}

/// 归一化语言代码
///
/// 去掉地区子标签（zh-CN → zh），再把常见别名收敛到标准代码：
/// zh / cmn / chi / zho → zh，en / eng → en。
pub fn normalize_lang_code(code: &str) -> String {
    let lower = code.trim().to_lowercase();
    let primary = lower
        .split(|c: char| c == '-' || c == '_')
        .next()
        .unwrap_or(&lower);

    match primary {
        "zh" | "cmn" | "chi" | "zho" => "zh".to_string(),
        "en" | "eng" => "en".to_string(),
        other => other.to_string(),
    }
}

/// 语言对是否受 MT 支持
///
/// MT 后端只覆盖中英互译，其余语言对一律不支持。
pub fn is_mt_supported(source: &str, target: &str) -> bool {
    let src = normalize_lang_code(source);
    let tgt = normalize_lang_code(target);
    matches!((src.as_str(), tgt.as_str()), ("zh", "en") | ("en", "zh"))
}

/// 引擎选择器
pub struct EngineSelector;

impl EngineSelector {
    /// 创建新的引擎选择器
    pub fn new() -> Self {
        Self
    }

    /// 为一个块选择翻译引擎
    pub fn select(
        &self,
        block_type: BlockType,
        detection: &DetectionResult,
        preference: EnginePreference,
    ) -> EngineSelection {
        // 优先级 1: 结构化内容强制 LLM
        if block_type.requires_llm() {
            return EngineSelection {
                engine: Engine::Llm,
                reason: Some(format!("{}类型的块仅支持 LLM 翻译", block_type.name())),
            };
        }

        // 优先级 2: 用户偏好 LLM
        if preference == EnginePreference::Llm {
            return EngineSelection {
                engine: Engine::Llm,
                reason: None,
            };
        }

        // 优先级 3: 用户偏好 MT，语言对必须受支持
        if preference == EnginePreference::Mt {
            if is_mt_supported(detection.detected.code(), detection.target.code()) {
                return EngineSelection {
                    engine: Engine::Mt,
                    reason: None,
                };
            }
            debug!(
                "语言对 {} -> {} 不受 MT 支持，回退 LLM",
                detection.detected.code(),
                detection.target.code()
            );
            return EngineSelection {
                engine: Engine::Llm,
                reason: Some(format!(
                    "语言对 {} -> {} 不受 MT 支持，回退 LLM",
                    detection.source_name(),
                    detection.target_name()
                )),
            };
        }

        // 优先级 4: 自动模式采纳检测器建议
        EngineSelection {
            engine: detection.recommended_engine,
            reason: None,
        }
    }
}

impl Default for EngineSelector {
    fn default() -> Self {
        Self::new()
    }
}
