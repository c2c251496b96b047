mod filesystem;
mod memory;
mod s3;
mod sink;

pub use filesystem::FilesystemSink;
pub use memory::MemorySink;
pub use s3::S3Sink;
pub use sink::ObjectSink;
