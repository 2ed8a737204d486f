//! Reply pipeline: runs a batch through every stage in order.
//!
//! Flow:
//! 1. Fetch the last message of each matching conversation
//! 2. Extract text and build prompts, record prompts in column 1
//! 3. Generate replies one at a time, record replies in column 2
//! 4. Classify each reply: draft + replied label, or no-reply label
//!
//! Every stage finishes for the whole batch before the next starts. The
//! first error aborts the run; nothing is retried or skipped.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use super::drafter::{OutcomeDrafter, OutcomeLabels};
use super::extract::extract;
use super::fetch::ConversationFetcher;
use super::labeler::OutcomeLabeler;
use super::prompt::{PromptBuilder, build_prompt};
use super::types::{BatchReport, ExtractedEmail, PromptedEmail, RepliedEmail, ThreadOutcome};
use crate::config::{ConfigKey, ConfigSnapshot, DEFAULT_MAX_BATCH};
use crate::error::{ConfigError, PipelineError};
use crate::llm::ReplyGenerator;
use crate::mailbox::{ConversationStore, DraftCreator, Labeler};
use crate::sheet::{CellRef, PROMPT_COLUMN, REPLY_COLUMN, SheetRecorder, TableWriter};

/// Settings resolved for one run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub address: String,
    pub search_query: String,
    pub exclude_query: String,
    pub prompt_template: String,
    pub replied_label: String,
    pub no_reply_label: String,
    pub max_batch: usize,
    /// Skip conversations already carrying either outcome label.
    pub skip_labeled: bool,
}

impl PipelineSettings {
    /// Resolve settings from a snapshot. Fails on any missing required key.
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Result<Self, ConfigError> {
        Ok(Self {
            address: snapshot.require(ConfigKey::Address)?.to_string(),
            search_query: single_line(
                ConfigKey::SearchQuery,
                snapshot.require(ConfigKey::SearchQuery)?,
            )?,
            exclude_query: single_line(
                ConfigKey::ExcludeQuery,
                snapshot.get(ConfigKey::ExcludeQuery),
            )?,
            prompt_template: snapshot.require(ConfigKey::PromptTemplate)?.to_string(),
            replied_label: snapshot.require(ConfigKey::RepliedLabel)?.to_string(),
            no_reply_label: snapshot.require(ConfigKey::NoReplyLabel)?.to_string(),
            max_batch: DEFAULT_MAX_BATCH,
            skip_labeled: false,
        })
    }

    pub fn with_max_batch(mut self, max_batch: usize) -> Result<Self, ConfigError> {
        if max_batch == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_batch".to_string(),
                message: "must be a positive integer".to_string(),
            });
        }
        self.max_batch = max_batch;
        Ok(self)
    }

    pub fn with_skip_labeled(mut self, skip_labeled: bool) -> Self {
        self.skip_labeled = skip_labeled;
        self
    }
}

/// Mailbox queries are sent as one protocol line.
fn single_line(key: ConfigKey, value: &str) -> Result<String, ConfigError> {
    if value.contains(['\r', '\n']) {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must not contain line breaks".to_string(),
        });
    }
    Ok(value.to_string())
}

/// External collaborators of the pipeline.
#[derive(Clone)]
pub struct Collaborators {
    pub conversations: Arc<dyn ConversationStore>,
    pub drafts: Arc<dyn DraftCreator>,
    pub labels: Arc<dyn Labeler>,
    pub generator: Arc<dyn ReplyGenerator>,
    pub table: Arc<dyn TableWriter>,
}

pub struct ReplyPipeline {
    fetcher: ConversationFetcher,
    prompts: PromptBuilder,
    generator: Arc<dyn ReplyGenerator>,
    recorder: SheetRecorder,
    drafter: OutcomeDrafter,
    max_batch: usize,
}

impl ReplyPipeline {
    pub fn new(collaborators: Collaborators, settings: PipelineSettings) -> Self {
        let mut fetcher = ConversationFetcher::new(
            collaborators.conversations,
            &settings.search_query,
            &settings.exclude_query,
        );
        if settings.skip_labeled {
            fetcher = fetcher.skip_labeled(vec![
                settings.replied_label.clone(),
                settings.no_reply_label.clone(),
            ]);
        }

        let drafter = OutcomeDrafter::new(
            collaborators.drafts,
            OutcomeLabeler::new(collaborators.labels),
            settings.address,
            OutcomeLabels {
                replied: settings.replied_label,
                no_reply: settings.no_reply_label,
            },
        );

        Self {
            fetcher,
            prompts: PromptBuilder::new(settings.prompt_template),
            generator: collaborators.generator,
            recorder: SheetRecorder::new(collaborators.table),
            drafter,
            max_batch: settings.max_batch,
        }
    }

    /// Process one batch end to end.
    pub async fn run(&self) -> Result<BatchReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, max_batch = self.max_batch, model = self.generator.model_name(), "Starting batch run");

        let messages = self.fetcher.fetch(self.max_batch).await?;

        let extracted: Vec<ExtractedEmail> = messages.into_iter().map(extract).collect();
        let prompted: Vec<PromptedEmail> = extracted
            .into_iter()
            .map(|record| self.prompts.add_prompt(record))
            .collect();
        self.recorder
            .write(&prompted, |record| record.prompt(), PROMPT_COLUMN)
            .await?;

        let mut replied: Vec<RepliedEmail> = Vec::with_capacity(prompted.len());
        for record in prompted {
            debug!(thread_id = %record.thread_id(), "Generating reply");
            let reply = self.generator.generate(record.prompt()).await?;
            replied.push(record.with_reply(reply));
        }
        self.recorder
            .write(&replied, |record| record.reply(), REPLY_COLUMN)
            .await?;

        let mut outcomes = Vec::with_capacity(replied.len());
        for record in &replied {
            let outcome = self.drafter.classify_and_draft(record).await?;
            outcomes.push(ThreadOutcome {
                thread_id: record.thread_id().clone(),
                subject: record.source().subject.clone(),
                outcome,
            });
        }

        let report = BatchReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };
        info!(
            %run_id,
            total = report.total(),
            drafted = report.drafted(),
            no_reply = report.no_reply(),
            "Batch run complete"
        );
        Ok(report)
    }
}

/// Generate a reply for arbitrary text and write it one column right of `cell`.
///
/// Bypasses the mailbox entirely. Returns the reply.
pub async fn reply_to_selection(
    generator: &dyn ReplyGenerator,
    template: &str,
    text: &str,
    sheet: &str,
    cell: CellRef,
    table: &dyn TableWriter,
) -> Result<String, PipelineError> {
    let prompt = build_prompt(template, text);
    let reply = generator.generate(&prompt).await?;

    let target = cell.right();
    table.write_cell(sheet, target, &reply).await?;
    info!(sheet, source = %cell, target = %target, "Reply written next to selection");
    Ok(reply)
}
