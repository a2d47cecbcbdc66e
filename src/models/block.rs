use serde::{Deserialize, Serialize};

/// 块类型
///
/// 与上游文档解析器输出的类型字符串一一对应。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    /// 正文段落
    Text,
    /// 标题
    Title,
    /// 表格（通常带 HTML 形式）
    Table,
    /// 图片
    Image,
    /// 行间公式
    InterlineEquation,
    /// 未知类型，按正文处理
    #[serde(other)]
    Other,
}

impl BlockType {
    /// 获取类型名称
    pub fn name(self) -> &'static str {
        match self {
            BlockType::Text => "正文",
            BlockType::Title => "标题",
            BlockType::Table => "表格",
            BlockType::Image => "图片",
            BlockType::InterlineEquation => "公式",
            BlockType::Other => "未知",
        }
    }

    /// 表格、图片、公式这三类内容 MT 无法处理，只能走 LLM
    pub fn requires_llm(self) -> bool {
        matches!(
            self,
            BlockType::Table | BlockType::Image | BlockType::InterlineEquation
        )
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 文档内容块
///
/// 由外部文档解析流程产出，本引擎只通过 `index` 引用它。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// 块在文档中的稳定索引
    pub index: usize,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    /// 可翻译文本（markdown / latex / 图片引用）
    pub content: String,
    /// 表格块的 HTML 形式
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_content: Option<String>,
}

impl Block {
    /// 选择用于翻译的内容：表格优先用 HTML 形式（保留结构），其余用原文
    pub fn translation_source(&self) -> &str {
        if self.block_type == BlockType::Table {
            if let Some(html) = &self.html_content {
                if !html.trim().is_empty() {
                    return html;
                }
            }
        }
        &self.content
    }
}

/// 块文档
///
/// 一个解析完成的文档的全部内容块。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDocument {
    pub name: String,
    pub blocks: Vec<Block>,
    #[serde(skip_serializing, skip_deserializing)]
    pub file_path: Option<String>,
}

/// 翻译输出中的单个块
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatedBlock {
    pub index: usize,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

/// 翻译输出文档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatedDocument {
    pub name: String,
    pub blocks: Vec<TranslatedBlock>,
}
