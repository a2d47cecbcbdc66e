//! 提示词构建服务 - 业务能力层
//!
//! 只负责把"翻译 / 解读一个块"变成发给 LLM 的消息列表，不发请求。
//!
//! ## 消息模型
//! 与 OpenAI 兼容接口对齐：消息内容要么是纯文本，要么是
//! 文本 + 图片的多部分内容（Vision 请求）。

use crate::models::block::BlockType;
use crate::services::lang_detector::{Confidence, DetectionResult, Lang};

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
}

/// 多部分内容中的单个部分
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { url: String },
}

/// 消息内容：纯文本或多部分
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// 聊天消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: MessageContent,
}

impl ChatMessage {
    /// 构造系统消息
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: MessageContent::Text(text.into()),
        }
    }

    /// 构造纯文本用户消息
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(text.into()),
        }
    }

    /// 构造多部分用户消息
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Parts(parts),
        }
    }
}

/// 提示词构建器
///
/// 职责：
/// - 按块类型生成翻译 / 解读提示词
/// - 表格保留 HTML 标签，公式保留 LaTeX
/// - 图片块生成带图片部分的多模态消息
pub struct PromptBuilder;

impl PromptBuilder {
    /// 创建新的提示词构建器
    pub fn new() -> Self {
        Self
    }

    /// 构建翻译消息
    ///
    /// # 参数
    /// - `block_type`: 块类型，决定格式保留规则
    /// - `content`: 待翻译内容
    /// - `target`: 目标语言
    /// - `source_hint`: 已知的源语言（检测失败时为 None）
    /// - `detection`: 检测结果，置信度低时会在提示词里注明
    pub fn build_translate_messages(
        &self,
        block_type: BlockType,
        content: &str,
        target: Lang,
        source_hint: Option<Lang>,
        detection: Option<&DetectionResult>,
    ) -> Vec<ChatMessage> {
        let system = format!(
            "You are a professional translator for technical documents. \
             Always preserve formatting and structure, and output the translation only.{}",
            type_rule(block_type)
        );

        let direction = match source_hint {
            Some(source) if source != Lang::Unknown => format!(
                "Translate the following content from {} to {}.",
                source.english_name(),
                target.english_name()
            ),
            _ => format!(
                "Translate the following content to {}.",
                target.english_name()
            ),
        };

        let uncertainty = match detection {
            Some(d) if d.confidence == Confidence::Low => {
                "\nThe source language is uncertain; infer it from the text."
            }
            _ => "",
        };

        let user = format!(
            "{} Preserve formatting, structure, and any special characters.{}\n\n{}\n\nTranslation:",
            direction, uncertainty, content
        );

        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }

    /// 构建带图片的翻译消息（Vision 请求）
    pub fn build_translate_messages_with_image(
        &self,
        block_type: BlockType,
        content: &str,
        image_data_url: &str,
        target: Lang,
    ) -> Vec<ChatMessage> {
        let system = format!(
            "You are a professional translator for technical documents. \
             Always preserve formatting and structure, and output the translation only.{}",
            type_rule(block_type)
        );

        let mut instruction = format!(
            "Translate all text in this image to {}. \
             Keep the reading order and output the translation only.",
            target.english_name()
        );
        let context = content.trim();
        if !context.is_empty() {
            instruction.push_str(&format!("\n\nContext from the document:\n{}", context));
        }

        let parts = vec![
            ContentPart::Text { text: instruction },
            ContentPart::ImageUrl {
                url: image_data_url.to_string(),
            },
        ];

        vec![ChatMessage::system(system), ChatMessage::user_parts(parts)]
    }

    /// 构建解读消息
    ///
    /// 解读面向应用的中文用户，统一用中文输出。
    pub fn build_explain_messages(&self, block_type: BlockType, content: &str) -> Vec<ChatMessage> {
        let system =
            "你是一名耐心的文档讲解助手，请用通俗的中文解释用户给出的内容，必要时分点说明。";

        let user = match block_type {
            BlockType::Table => format!(
                "请解读下面这个表格，说明它的结构和要表达的信息：\n\n{}",
                content
            ),
            BlockType::InterlineEquation => format!(
                "请解释下面这个公式的含义，逐项说明符号和推导：\n\n{}",
                content
            ),
            _ => format!("请解读下面这段内容，解释其要点和含义：\n\n{}", content),
        };

        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }

    /// 构建带图片的解读消息（Vision 请求）
    pub fn build_explain_messages_with_image(
        &self,
        _block_type: BlockType,
        content: &str,
        image_data_url: &str,
    ) -> Vec<ChatMessage> {
        let system =
            "你是一名耐心的文档讲解助手，请用通俗的中文解释用户给出的内容，必要时分点说明。";

        let mut instruction = "请描述并解读这张图片的内容。".to_string();
        let context = content.trim();
        if !context.is_empty() {
            instruction.push_str(&format!("\n\n文档中的上下文：\n{}", context));
        }

        let parts = vec![
            ContentPart::Text { text: instruction },
            ContentPart::ImageUrl {
                url: image_data_url.to_string(),
            },
        ];

        vec![ChatMessage::system(system), ChatMessage::user_parts(parts)]
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 块类型对应的格式保留规则，附加在系统消息末尾
fn type_rule(block_type: BlockType) -> &'static str {
    match block_type {
        BlockType::Table => {
            " The input is an HTML table: translate the cell text and keep every HTML tag unchanged."
        }
        BlockType::InterlineEquation => {
            " The input contains LaTeX math: keep all LaTeX expressions unchanged and translate only the surrounding text."
        }
        BlockType::Image => " The input is an image from a document.",
        _ => "",
    }
}
