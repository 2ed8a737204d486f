//! Reply pipeline.
//!
//! Every batch flows through:
//! 1. `ConversationFetcher::fetch()`: last message of each matching conversation
//! 2. `extract()`: flat `FROM/TO/SUBJECT/body` text
//! 3. `PromptBuilder::add_prompt()`: template + text
//! 4. `ReplyGenerator::generate()`: one completion per prompt
//! 5. `OutcomeDrafter::classify_and_draft()`: draft or no-reply, then label
//!
//! Prompts and replies are recorded in the results sheet between stages.

pub mod drafter;
pub mod extract;
pub mod fetch;
pub mod html;
pub mod labeler;
pub mod processor;
pub mod prompt;
pub mod types;

pub use drafter::{NO_REPLY_SENTINEL, OutcomeDrafter, OutcomeLabels};
pub use fetch::ConversationFetcher;
pub use labeler::OutcomeLabeler;
pub use processor::{Collaborators, PipelineSettings, ReplyPipeline, reply_to_selection};
pub use prompt::PromptBuilder;
pub use types::{BatchReport, EmailRecord, ReplyOutcome, ThreadOutcome};
