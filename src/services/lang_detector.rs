//! 语言检测服务 - 业务能力层
//!
//! 只负责"判断一段文本是什么语言、该翻译成什么语言"，不关心流程。
//!
//! ## 核心功能
//! 1. **文本清理**：剥离 HTML 标签和 LaTeX 数学定界符/命令，只对正文分类
//! 2. **短文本启发式**：清理后不足 10 字符时按中文字符占比判断
//! 3. **长文本统计**：按字符书写系统做频率统计，再与中文占比启发式对账（占比优先）
//! 4. **目标语言策略**：中文 → 英文；英文及无法判定 → 中文；其他语言 → 中文

use regex::Regex;
use tracing::debug;

use crate::services::engine_selector::{self, Engine};

/// 语言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lang {
    /// 中文
    Zh,
    /// 英语
    En,
    /// 日语
    Ja,
    /// 韩语
    Ko,
    /// 俄语
    Ru,
    /// 阿拉伯语
    Ar,
    /// 无法判定
    Unknown,
}

impl Lang {
    /// 获取语言代码
    pub fn code(self) -> &'static str {
        match self {
            Lang::Zh => "zh",
            Lang::En => "en",
            Lang::Ja => "ja",
            Lang::Ko => "ko",
            Lang::Ru => "ru",
            Lang::Ar => "ar",
            Lang::Unknown => "unknown",
        }
    }

    /// 获取语言显示名称
    pub fn name(self) -> &'static str {
        match self {
            Lang::Zh => "中文",
            Lang::En => "英语",
            Lang::Ja => "日语",
            Lang::Ko => "韩语",
            Lang::Ru => "俄语",
            Lang::Ar => "阿拉伯语",
            Lang::Unknown => "未知语言",
        }
    }

    /// 获取英文名称（用于发给 LLM 的提示词）
    pub fn english_name(self) -> &'static str {
        match self {
            Lang::Zh => "Chinese",
            Lang::En => "English",
            Lang::Ja => "Japanese",
            Lang::Ko => "Korean",
            Lang::Ru => "Russian",
            Lang::Ar => "Arabic",
            Lang::Unknown => "Unknown",
        }
    }

    /// 从语言代码解析（接受常见别名，如 cmn / chi / zho / eng）
    pub fn from_code(code: &str) -> Option<Self> {
        match engine_selector::normalize_lang_code(code).as_str() {
            "zh" => Some(Lang::Zh),
            "en" => Some(Lang::En),
            "ja" => Some(Lang::Ja),
            "ko" => Some(Lang::Ko),
            "ru" => Some(Lang::Ru),
            "ar" => Some(Lang::Ar),
            _ => None,
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 检测置信度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn name(self) -> &'static str {
        match self {
            Confidence::High => "高",
            Confidence::Medium => "中",
            Confidence::Low => "低",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 语言检测结果
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// 检测到的源语言
    pub detected: Lang,
    /// 置信度
    pub confidence: Confidence,
    /// 建议的目标语言
    pub target: Lang,
    /// 建议的翻译引擎（语言对受 MT 支持时为 MT，否则为 LLM）
    pub recommended_engine: Engine,
}

impl DetectionResult {
    /// 源语言显示名称
    pub fn source_name(&self) -> &'static str {
        self.detected.name()
    }

    /// 目标语言显示名称
    pub fn target_name(&self) -> &'static str {
        self.target.name()
    }
}

/// 语言检测器
///
/// 职责：
/// - 清理标记噪音后对文本分类
/// - 给出源语言、目标语言与建议引擎
/// - 只处理单段文本，不出现 Vec<Block>
pub struct LangDetector;

impl LangDetector {
    /// 创建新的语言检测器
    pub fn new() -> Self {
        Self
    }

    /// 文本是否适合做语言检测
    ///
    /// 清理掉标记噪音后至少要有 3 个字符，否则检测结果不可靠，
    /// 调用方应改用配置的默认目标语言。
    pub fn is_suitable_for_detection(&self, text: &str) -> bool {
        self.clean_text(text).chars().count() >= 3
    }

    /// 检测文本语言并给出翻译建议
    pub fn detect(&self, text: &str) -> DetectionResult {
        let cleaned = self.clean_text(text);
        let chars: Vec<char> = cleaned.chars().filter(|c| !c.is_whitespace()).collect();
        let total = chars.len();
        let han_count = chars.iter().filter(|&&c| is_han(c)).count();
        let han_ratio = if total > 0 {
            han_count as f64 / total as f64
        } else {
            0.0
        };

        let (detected, confidence) = if cleaned.chars().count() < 10 {
            // 短文本：只看中文字符占比
            if han_ratio > 0.3 {
                (Lang::Zh, Confidence::Medium)
            } else {
                (Lang::En, Confidence::Low)
            }
        } else {
            let (stat_lang, stat_conf) = classify_by_script(&chars);
            // 与中文占比启发式对账，占比优先
            if stat_lang != Lang::Zh && han_ratio > 0.3 {
                (Lang::Zh, Confidence::Medium)
            } else {
                (stat_lang, stat_conf)
            }
        };

        let target = target_for(detected);
        let recommended_engine = if engine_selector::is_mt_supported(detected.code(), target.code())
        {
            Engine::Mt
        } else {
            Engine::Llm
        };

        debug!(
            "语言检测: {} -> {} (置信度: {}, 中文占比: {:.2})",
            detected.name(),
            target.name(),
            confidence,
            han_ratio
        );

        DetectionResult {
            detected,
            confidence,
            target,
            recommended_engine,
        }
    }

    /// 检测门禁不通过时的兜底结果
    ///
    /// 使用调用方给定的默认目标语言，置信度一律按低处理。
    pub fn fallback(&self, default_target: Lang) -> DetectionResult {
        let recommended_engine =
            if engine_selector::is_mt_supported(Lang::Unknown.code(), default_target.code()) {
                Engine::Mt
            } else {
                Engine::Llm
            };

        DetectionResult {
            detected: Lang::Unknown,
            confidence: Confidence::Low,
            target: default_target,
            recommended_engine,
        }
    }

    /// 剥离 HTML 标签和 LaTeX 数学符号，留下可分类的正文
    fn clean_text(&self, text: &str) -> String {
        let mut cleaned = text.to_string();

        // HTML 标签
        if let Ok(re) = Regex::new(r"<[^>]+>") {
            cleaned = re.replace_all(&cleaned, " ").into_owned();
        }
        // LaTeX 数学定界符: $ $$ \( \) \[ \]
        if let Ok(re) = Regex::new(r"\$\$?|\\\(|\\\)|\\\[|\\\]") {
            cleaned = re.replace_all(&cleaned, " ").into_owned();
        }
        // LaTeX 命令: \frac \alpha 等
        if let Ok(re) = Regex::new(r"\\[a-zA-Z]+\*?") {
            cleaned = re.replace_all(&cleaned, " ").into_owned();
        }
        // 残留的结构符号
        if let Ok(re) = Regex::new(r"[{}_^&~]") {
            cleaned = re.replace_all(&cleaned, " ").into_owned();
        }

        cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl Default for LangDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// 目标语言策略：中文翻译成英文，其余（含无法判定）一律翻译成中文
fn target_for(detected: Lang) -> Lang {
    match detected {
        Lang::Zh => Lang::En,
        _ => Lang::Zh,
    }
}

/// 按书写系统做频率统计分类
///
/// 只统计有明确书写系统归属的字符，数字和标点不参与。
fn classify_by_script(chars: &[char]) -> (Lang, Confidence) {
    let mut han = 0usize;
    let mut latin = 0usize;
    let mut kana = 0usize;
    let mut hangul = 0usize;
    let mut cyrillic = 0usize;
    let mut arabic = 0usize;

    for &c in chars {
        if is_han(c) {
            han += 1;
        } else if is_latin(c) {
            latin += 1;
        } else if is_kana(c) {
            kana += 1;
        } else if is_hangul(c) {
            hangul += 1;
        } else if is_cyrillic(c) {
            cyrillic += 1;
        } else if is_arabic(c) {
            arabic += 1;
        }
    }

    let scripted = han + latin + kana + hangul + cyrillic + arabic;
    if scripted == 0 {
        return (Lang::Unknown, Confidence::Low);
    }

    // 日文混写汉字，假名只要占到一定比例就判日语
    if kana > 0 && kana as f64 / scripted as f64 >= 0.05 {
        return (Lang::Ja, Confidence::Medium);
    }

    let (lang, dominant) = [
        (Lang::Zh, han),
        (Lang::En, latin),
        (Lang::Ko, hangul),
        (Lang::Ru, cyrillic),
        (Lang::Ar, arabic),
    ]
    .into_iter()
    .max_by_key(|&(_, count)| count)
    .unwrap_or((Lang::Unknown, 0));

    let ratio = dominant as f64 / scripted as f64;
    let confidence = if ratio >= 0.6 {
        Confidence::High
    } else if ratio >= 0.3 {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    (lang, confidence)
}

fn is_han(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' | '\u{F900}'..='\u{FAFF}')
}

fn is_latin(c: char) -> bool {
    c.is_ascii_alphabetic() || matches!(c, '\u{00C0}'..='\u{024F}')
}

fn is_kana(c: char) -> bool {
    matches!(c, '\u{3040}'..='\u{309F}' | '\u{30A0}'..='\u{30FF}')
}

fn is_hangul(c: char) -> bool {
    matches!(c, '\u{AC00}'..='\u{D7AF}' | '\u{1100}'..='\u{11FF}')
}

fn is_cyrillic(c: char) -> bool {
    matches!(c, '\u{0400}'..='\u{04FF}')
}

fn is_arabic(c: char) -> bool {
    matches!(c, '\u{0600}'..='\u{06FF}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_chinese_text() {
        let detector = LangDetector::new();
        let result = detector.detect("你好世界，这是一个测试文本");

        assert_eq!(result.detected, Lang::Zh);
        assert_eq!(result.target, Lang::En);
        assert_eq!(result.recommended_engine, Engine::Mt);
        assert_eq!(result.source_name(), "中文");
        assert_eq!(result.target_name(), "英语");
    }

    #[test]
    fn test_detect_english_text() {
        let detector = LangDetector::new();
        let result = detector.detect("The quick brown fox jumps over the lazy dog.");

        assert_eq!(result.detected, Lang::En);
        assert_eq!(result.target, Lang::Zh);
        assert_eq!(result.recommended_engine, Engine::Mt);
        assert_eq!(result.confidence, Confidence::High);
    }

    #[test]
    fn test_japanese_targets_chinese_via_llm() {
        let detector = LangDetector::new();
        let result = detector.detect("これはテストですこれはテストです");

        assert_eq!(result.detected, Lang::Ja);
        assert_eq!(result.target, Lang::Zh);
        assert_eq!(result.recommended_engine, Engine::Llm);
    }

    #[test]
    fn test_short_text_uses_han_ratio() {
        let detector = LangDetector::new();

        let zh = detector.detect("测试文本");
        assert_eq!(zh.detected, Lang::Zh);
        assert_eq!(zh.confidence, Confidence::Medium);

        let en = detector.detect("hello");
        assert_eq!(en.detected, Lang::En);
        assert_eq!(en.confidence, Confidence::Low);
        assert_eq!(en.target, Lang::Zh);
    }

    #[test]
    fn test_han_ratio_wins_over_statistics() {
        let detector = LangDetector::new();
        // 拉丁字母更多，但中文占比超过 0.3，应判定为中文
        let result = detector.detect("Hello World abc 世界测试文本示例内容");

        assert_eq!(result.detected, Lang::Zh);
        assert_eq!(result.confidence, Confidence::Medium);
        assert_eq!(result.target, Lang::En);
    }

    #[test]
    fn test_markup_is_stripped_before_detection() {
        let detector = LangDetector::new();
        let result = detector.detect("<table><tr><td>这是一个中文表格单元内容</td></tr></table>");
        assert_eq!(result.detected, Lang::Zh);

        let latex = detector.detect(r"$$\frac{a}{b} + \alpha$$ 这是一段公式说明文字");
        assert_eq!(latex.detected, Lang::Zh);
    }

    #[test]
    fn test_suitability_gate() {
        let detector = LangDetector::new();

        assert!(!detector.is_suitable_for_detection(""));
        assert!(!detector.is_suitable_for_detection("<p></p>"));
        assert!(!detector.is_suitable_for_detection("你好"));
        assert!(!detector.is_suitable_for_detection(r"$$\alpha$$"));
        assert!(detector.is_suitable_for_detection("你好吗"));
        assert!(detector.is_suitable_for_detection("abc"));
    }

    #[test]
    fn test_fallback_uses_default_target() {
        let detector = LangDetector::new();
        let result = detector.fallback(Lang::Zh);

        assert_eq!(result.detected, Lang::Unknown);
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.target, Lang::Zh);
        assert_eq!(result.recommended_engine, Engine::Llm);
    }

    #[test]
    fn test_lang_from_code_aliases() {
        assert_eq!(Lang::from_code("zh"), Some(Lang::Zh));
        assert_eq!(Lang::from_code("cmn"), Some(Lang::Zh));
        assert_eq!(Lang::from_code("zh-CN"), Some(Lang::Zh));
        assert_eq!(Lang::from_code("eng"), Some(Lang::En));
        assert_eq!(Lang::from_code("fr"), None);
    }
}
