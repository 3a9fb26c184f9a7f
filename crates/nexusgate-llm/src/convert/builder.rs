use std::collections::HashMap;

use crate::types::{BlockDelta, CompletionResponse, ContentBlock, StopReason, StreamEvent, Usage, unix_now};

/// Identity of a logical block in the upstream protocol
///
/// `Text` and `Thinking` name "the current text/reasoning run": re-entering
/// one after another block has opened starts a fresh canonical block. The
/// other keys name concrete upstream slots and stay bound to the canonical
/// index they were first given.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockKey {
    /// Running assistant text
    Text,
    /// Running reasoning text
    Thinking,
    /// Numbered slot (`OpenAI` tool call index, Anthropic block index)
    Slot(u32),
    /// Output item by id (Responses function call)
    Item(String),
    /// Content part of an output item (Responses message text)
    Part(String, u32),
    /// Reasoning item by id (Responses reasoning summary)
    Reasoning(String),
}

impl BlockKey {
    const fn is_run(&self) -> bool {
        matches!(self, Self::Text | Self::Thinking)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    BeforeFirstEvent,
    Started,
    BuildingBlocks,
    Finished,
}

/// Per-stream state shared by every upstream stream decoder
///
/// Owns canonical index assignment, the upstream-key to index map, and the
/// stop reason and usage that are only emitted once the stream finishes.
#[derive(Debug)]
pub struct StreamBuilder {
    phase: Phase,
    id: String,
    model: String,
    next_index: u32,
    open: Option<(BlockKey, u32)>,
    slots: HashMap<BlockKey, u32>,
    stop_reason: Option<StopReason>,
    usage: Usage,
    saw_tool_use: bool,
}

impl Default for StreamBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamBuilder {
    pub fn new() -> Self {
        Self {
            phase: Phase::BeforeFirstEvent,
            id: String::new(),
            model: String::new(),
            next_index: 0,
            open: None,
            slots: HashMap::new(),
            stop_reason: None,
            usage: Usage::default(),
            saw_tool_use: false,
        }
    }

    /// Record response id and model as soon as the upstream reveals them
    pub fn identify(&mut self, id: &str, model: &str) {
        if self.id.is_empty() && !id.is_empty() {
            id.clone_into(&mut self.id);
        }
        if self.model.is_empty() && !model.is_empty() {
            model.clone_into(&mut self.model);
        }
    }

    /// Emit `message_start` once
    pub fn start(&mut self, out: &mut Vec<StreamEvent>) {
        if self.phase != Phase::BeforeFirstEvent {
            return;
        }

        if self.id.is_empty() {
            self.id = format!("msg_{}", uuid::Uuid::new_v4().simple());
        }

        out.push(StreamEvent::MessageStart {
            message: CompletionResponse {
                id: self.id.clone(),
                model: self.model.clone(),
                content: Vec::new(),
                stop_reason: None,
                usage: self.usage,
                created: Some(unix_now()),
            },
        });
        self.phase = Phase::Started;
    }

    /// Open the block for `key` unless it is already bound
    ///
    /// Returns the canonical index of the block.
    pub fn start_block(&mut self, key: BlockKey, block: ContentBlock, out: &mut Vec<StreamEvent>) -> Option<u32> {
        if self.phase == Phase::Finished {
            return None;
        }

        if let Some((open_key, index)) = &self.open
            && *open_key == key
        {
            return Some(*index);
        }

        if !key.is_run()
            && let Some(index) = self.slots.get(&key)
        {
            return Some(*index);
        }

        self.start(out);
        self.close_open(out);

        let index = self.next_index;
        self.next_index += 1;

        if matches!(block, ContentBlock::ToolUse(_)) {
            self.saw_tool_use = true;
        }

        if !key.is_run() {
            self.slots.insert(key.clone(), index);
        }
        self.open = Some((key, index));
        self.phase = Phase::BuildingBlocks;

        out.push(StreamEvent::ContentBlockStart {
            index,
            content_block: block,
        });

        Some(index)
    }

    /// Append a fragment to the block for `key`, opening it with `header` if needed
    ///
    /// Fragments for a slot that is no longer open still go to that slot's
    /// original index.
    pub fn delta(
        &mut self,
        key: BlockKey,
        header: impl FnOnce() -> ContentBlock,
        delta: BlockDelta,
        out: &mut Vec<StreamEvent>,
    ) {
        if self.phase == Phase::Finished {
            return;
        }

        let bound = match &self.open {
            Some((open_key, index)) if *open_key == key => Some(*index),
            _ if key.is_run() => None,
            _ => {
                let index = self.slots.get(&key).copied();
                if let Some(index) = index {
                    tracing::debug!(index, "fragment for a block that is already closed");
                }
                index
            }
        };

        let index = match bound {
            Some(index) => index,
            None => match self.start_block(key, header(), out) {
                Some(index) => index,
                None => return,
            },
        };

        out.push(StreamEvent::ContentBlockDelta { index, delta });
    }

    /// Close the block for `key` if it is the open one
    pub fn stop_block(&mut self, key: &BlockKey, out: &mut Vec<StreamEvent>) {
        self.close_where(|open| open == key, out);
    }

    /// Close the open block if its key satisfies `predicate`
    pub fn close_where(&mut self, predicate: impl FnOnce(&BlockKey) -> bool, out: &mut Vec<StreamEvent>) {
        if self.open.as_ref().is_some_and(|(key, _)| predicate(key)) {
            self.close_open(out);
        }
    }

    fn close_open(&mut self, out: &mut Vec<StreamEvent>) {
        if let Some((_, index)) = self.open.take() {
            out.push(StreamEvent::ContentBlockStop { index });
        }
    }

    /// Remember the stop reason for the closing `message_delta`
    pub const fn set_stop_reason(&mut self, reason: StopReason) {
        self.stop_reason = Some(reason);
    }

    /// Whether the stop reason has been reported
    pub const fn has_stop_reason(&self) -> bool {
        self.stop_reason.is_some()
    }

    /// Whether any tool block was opened
    pub const fn saw_tool_use(&self) -> bool {
        self.saw_tool_use
    }

    /// Fold in usage reported anywhere in the stream
    pub fn merge_usage(&mut self, usage: &Usage) {
        self.usage.merge(usage);
    }

    /// Close the open block and emit `message_delta` + `message_stop`
    ///
    /// Only the first call has an effect.
    pub fn finish(&mut self, out: &mut Vec<StreamEvent>) {
        if self.phase == Phase::Finished {
            return;
        }

        self.start(out);
        self.close_open(out);

        out.push(StreamEvent::MessageDelta {
            stop_reason: self.stop_reason,
            usage: self.usage,
        });
        out.push(StreamEvent::MessageStop);
        self.phase = Phase::Finished;
    }

    /// Whether `message_stop` has been emitted
    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }
}
