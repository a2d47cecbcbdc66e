/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 是否开启翻译功能
    pub translation_enabled: bool,
    /// 翻译引擎偏好: auto / mt / llm
    pub engine_preference: String,
    /// 检测失败时的默认目标语言代码
    pub default_target_lang: String,
    /// 批量翻译的并发块数量
    pub max_concurrent_blocks: usize,
    /// 批量翻译单块最大尝试次数
    pub max_retries: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    /// 待翻译块文档（TOML）存放目录
    pub blocks_folder: String,
    /// 翻译结果输出目录
    pub output_folder: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    // --- MT 配置 ---
    pub mt_api_base_url: String,
    pub mt_api_token: String,
    // --- 本地图片资源根目录（空表示只允许远程图片）---
    pub asset_root: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            translation_enabled: true,
            engine_preference: "auto".to_string(),
            default_target_lang: "zh".to_string(),
            max_concurrent_blocks: 10,
            max_retries: 3,
            verbose_logging: false,
            output_log_file: "translate_log.txt".to_string(),
            blocks_folder: "blocks_toml".to_string(),
            output_folder: "translated_toml".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.deepseek.com/v1".to_string(),
            llm_model_name: "deepseek-chat".to_string(),
            mt_api_base_url: "http://127.0.0.1:8989".to_string(),
            mt_api_token: String::new(),
            asset_root: "static".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            translation_enabled: std::env::var("TRANSLATION_ENABLED").ok().and_then(|v| v.parse().ok()).unwrap_or(default.translation_enabled),
            engine_preference: std::env::var("ENGINE_PREFERENCE").unwrap_or(default.engine_preference),
            default_target_lang: std::env::var("DEFAULT_TARGET_LANG").unwrap_or(default.default_target_lang),
            max_concurrent_blocks: std::env::var("MAX_CONCURRENT_BLOCKS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_blocks),
            max_retries: std::env::var("MAX_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_retries),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            blocks_folder: std::env::var("BLOCKS_FOLDER").unwrap_or(default.blocks_folder),
            output_folder: std::env::var("OUTPUT_FOLDER").unwrap_or(default.output_folder),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            mt_api_base_url: std::env::var("MT_API_BASE_URL").unwrap_or(default.mt_api_base_url),
            mt_api_token: std::env::var("MT_API_TOKEN").unwrap_or(default.mt_api_token),
            asset_root: std::env::var("ASSET_ROOT").unwrap_or(default.asset_root),
        }
    }
}
