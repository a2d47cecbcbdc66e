pub mod block;
pub mod loaders;

pub use block::{Block, BlockDocument, BlockType, TranslatedBlock, TranslatedDocument};
pub use loaders::{load_all_toml_files, load_toml_to_block_document, save_translated_document};
