//! 应用编排 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量文档翻译的处理和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：启动日志、创建 LLM / MT / 图片三个后端客户端
//! 2. **批量加载**：扫描并加载所有待翻译的块文档（`Vec<BlockDocument>`）
//! 3. **逐文档处理**：每份文档建一个会话，批量翻译后导出结果
//! 4. **全局统计**：汇总所有文档的翻译结果
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个块的细节，向下委托 batch_runner
//! - **资源所有者**：唯一创建后端客户端的模块，会话间共享同一组客户端
//! - **失败隔离**：一份文档保存失败不影响其余文档

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::models::block::{BlockDocument, TranslatedDocument};
use crate::models::loaders::{load_all_toml_files, save_translated_document};
use crate::orchestrator::batch_runner::translate_all_blocks;
use crate::orchestrator::observer::LogObserver;
use crate::orchestrator::session::BlockSession;
use crate::services::image_embedder::HttpImageEmbedder;
use crate::services::llm_backend::OpenAiChatBackend;
use crate::services::mt_backend::MtranClient;
use crate::utils::logging::init_log_file;
use crate::workflow::block_flow::BlockFlow;

/// 应用主结构
pub struct App {
    config: Config,
    chat: Arc<OpenAiChatBackend>,
    mt: Arc<MtranClient>,
    embedder: Arc<HttpImageEmbedder>,
}

impl App {
    /// 初始化应用
    pub fn initialize(config: Config) -> Result<Self> {
        init_log_file(&config.output_log_file)?;
        log_startup(&config);

        let chat = Arc::new(OpenAiChatBackend::new(&config));
        let mt = Arc::new(MtranClient::new(&config));
        let embedder = Arc::new(HttpImageEmbedder::new(&config));

        Ok(Self {
            config,
            chat,
            mt,
            embedder,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        let documents = self.load_documents().await?;

        if documents.is_empty() {
            warn!("⚠️ 没有找到待翻译的TOML文件，程序结束");
            return Ok(());
        }

        let total_docs = documents.len();
        info!("✓ 找到 {} 份待翻译的块文档", total_docs);

        let mut stats = ProcessingStats {
            total_documents: total_docs,
            ..Default::default()
        };

        for (doc_index, document) in documents.into_iter().enumerate() {
            log_document_start(doc_index + 1, total_docs, &document);

            match self.process_document(document).await {
                Ok(doc_stats) => {
                    stats.translated_blocks += doc_stats.translated;
                    stats.total_blocks += doc_stats.total;
                    stats.saved_documents += 1;
                }
                Err(e) => {
                    warn!("❌ 文档处理失败: {}", e);
                    stats.failed_documents += 1;
                }
            }
        }

        print_final_stats(&stats, &self.config);
        Ok(())
    }

    /// 加载块文档
    async fn load_documents(&self) -> Result<Vec<BlockDocument>> {
        info!("📁 正在扫描待翻译的块文档...");
        load_all_toml_files(&self.config.blocks_folder).await
    }

    /// 翻译一份文档并保存结果
    async fn process_document(&self, document: BlockDocument) -> Result<DocumentStats> {
        let name = document.name.clone();
        let flow = BlockFlow::new(
            &self.config,
            self.chat.clone(),
            self.mt.clone(),
            self.embedder.clone(),
        );
        let session = BlockSession::new(
            &self.config,
            document.blocks,
            flow,
            Arc::new(LogObserver),
        );

        let summary = translate_all_blocks(&session, |completed, total| {
            info!("📄 [{}] 翻译进度: {}/{}", name, completed, total);
        })
        .await;

        let translated = TranslatedDocument {
            name: name.clone(),
            blocks: session.export_blocks(),
        };
        let output_path = save_translated_document(&translated, &self.config.output_folder)
            .await
            .with_context(|| format!("保存文档 {} 的翻译结果失败", name))?;

        info!("💾 [{}] 已保存至 {}", name, output_path.display());

        Ok(DocumentStats {
            total: summary.total,
            translated: session.translated_count(),
        })
    }
}

/// 单份文档的翻译统计
#[derive(Debug, Default)]
struct DocumentStats {
    total: usize,
    translated: usize,
}

/// 全局处理统计
#[derive(Debug, Default)]
struct ProcessingStats {
    total_documents: usize,
    saved_documents: usize,
    failed_documents: usize,
    total_blocks: usize,
    translated_blocks: usize,
}

// ========== 日志辅助函数 ==========

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 批量块翻译模式");
    info!("📊 最大并发块数: {}", config.max_concurrent_blocks);
    info!("🔧 引擎偏好: {}", config.engine_preference);
    info!("{}", "=".repeat(60));
}

fn log_document_start(current: usize, total: usize, document: &BlockDocument) {
    info!("{}", "=".repeat(60));
    info!(
        "📄 开始翻译第 {}/{} 份文档: {} ({} 个块)",
        current,
        total,
        document.name,
        document.blocks.len()
    );
    info!("{}", "=".repeat(60));
}

fn print_final_stats(stats: &ProcessingStats, config: &Config) {
    info!("{}", "=".repeat(60));
    info!("📊 全部翻译完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!(
        "✅ 文档: 保存 {}/{}，失败 {}",
        stats.saved_documents, stats.total_documents, stats.failed_documents
    );
    info!(
        "✅ 块: 已翻译 {}/{}",
        stats.translated_blocks, stats.total_blocks
    );
    info!("{}", "=".repeat(60));
    info!("日志已保存至: {}", config.output_log_file);
}
