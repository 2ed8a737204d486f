//! Reply Drafter: LLM-drafted replies for Gmail conversations.

pub mod config;
pub mod error;
pub mod llm;
pub mod mailbox;
pub mod pipeline;
pub mod sheet;
