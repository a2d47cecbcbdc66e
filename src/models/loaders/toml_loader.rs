use crate::models::block::{BlockDocument, TranslatedDocument};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 从 TOML 文件加载数据并转换为 BlockDocument 对象
pub async fn load_toml_to_block_document(toml_file_path: &Path) -> Result<BlockDocument> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let mut document: BlockDocument = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    // 设置文件路径
    document.file_path = Some(toml_file_path.to_string_lossy().to_string());

    Ok(document)
}

/// 从文件夹中加载所有 TOML 文件并转换为 BlockDocument 对象列表
pub async fn load_all_toml_files(folder_path: &str) -> Result<Vec<BlockDocument>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut documents = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            tracing::info!(
                "正在加载: {}",
                path.file_name().unwrap_or_default().to_string_lossy()
            );

            match load_toml_to_block_document(&path).await {
                Ok(document) => {
                    let block_count = document.blocks.len();
                    tracing::info!("成功加载 {} 个内容块", block_count);
                    documents.push(document);
                }
                Err(e) => {
                    tracing::warn!("加载文件失败 {}: {}", path.display(), e);
                }
            }
        }
    }

    Ok(documents)
}

/// 把翻译结果写成 TOML 文件
pub async fn save_translated_document(
    document: &TranslatedDocument,
    output_folder: &str,
) -> Result<PathBuf> {
    let folder = PathBuf::from(output_folder);
    fs::create_dir_all(&folder)
        .await
        .with_context(|| format!("无法创建输出目录: {}", output_folder))?;

    let file_name = format!("{}_translated.toml", document.name);
    let output_path = folder.join(file_name);

    let content = toml::to_string_pretty(document)
        .with_context(|| format!("无法序列化翻译结果: {}", document.name))?;

    fs::write(&output_path, content)
        .await
        .with_context(|| format!("无法写入翻译结果: {}", output_path.display()))?;

    Ok(output_path)
}
