mod client;
mod directory;
mod types;

pub use client::SlackClient;
pub use directory::DirectoryService;
pub use types::{
    Channel, ChannelDirectory, ChannelId, Message, MessageTs, Page, PageRequest, UserDirectory,
};
