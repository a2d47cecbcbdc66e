pub mod stream_consumer;

pub use stream_consumer::{
    extract_error_message, ChunkStream, StreamConsumer, StreamOutcome, StreamPhase,
    CHUNK_CHANNEL_CAPACITY,
};
