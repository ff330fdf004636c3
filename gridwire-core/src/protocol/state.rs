//! Per-session resumption state.
//!
//! One [`Frame`] per message nesting level. Frames are pooled by depth: a
//! frame popped before its message finished keeps its progress so the next
//! call resumes it, one popped after finishing is cleared for the next
//! sibling.

use std::any::Any;

use tracing::trace;

use crate::error::{GridwireError, Result};

/// Progress of a length-prefixed byte payload.
#[derive(Debug, Default)]
pub(crate) struct ChunkProgress {
    /// Length prefix written or read.
    pub(crate) header_done: bool,
    /// Expected payload length when reading.
    pub(crate) len: usize,
    /// Bytes of the payload written so far.
    pub(crate) offset: usize,
    /// Staged payload: the marshalled blob when writing, the gathered bytes
    /// when reading.
    pub(crate) buf: Vec<u8>,
    /// `buf` holds the marshalled blob.
    pub(crate) staged: bool,
}

impl ChunkProgress {
    pub(crate) fn reset(&mut self) {
        self.header_done = false;
        self.len = 0;
        self.offset = 0;
        self.buf.clear();
        self.staged = false;
    }
}

/// Progress of the one field of a frame currently in flight.
#[derive(Default)]
pub(crate) struct FieldProgress {
    /// Count or length prefix handled.
    pub(crate) started: bool,
    /// Element count of the field.
    pub(crate) len: usize,
    /// Elements completed.
    pub(crate) index: usize,
    /// Key of the current map entry written.
    pub(crate) key_done: bool,
    pub(crate) chunk: ChunkProgress,
    /// Container being assembled while reading.
    pub(crate) partial: Option<Box<dyn Any + Send>>,
    /// Key of the current map entry, read but not yet inserted.
    pub(crate) key: Option<Box<dyn Any + Send>>,
    /// Nested message or element being read.
    pub(crate) element: Option<Box<dyn Any + Send>>,
}

impl FieldProgress {
    pub(crate) fn reset(&mut self) {
        self.started = false;
        self.len = 0;
        self.index = 0;
        self.key_done = false;
        self.chunk.reset();
        self.partial = None;
        self.key = None;
        self.element = None;
    }
}

impl std::fmt::Debug for FieldProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldProgress")
            .field("started", &self.started)
            .field("len", &self.len)
            .field("index", &self.index)
            .field("key_done", &self.key_done)
            .field("chunk", &self.chunk)
            .field("partial", &self.partial.is_some())
            .field("key", &self.key.is_some())
            .field("element", &self.element.is_some())
            .finish()
    }
}

/// Resumption state of one message level.
#[derive(Debug, Default)]
pub struct Frame {
    /// Number of fields of this message already completed.
    pub(crate) state: u8,
    /// The message type byte has been written.
    pub(crate) header_written: bool,
    pub(crate) field: FieldProgress,
}

impl Frame {
    /// Returns the number of completed fields.
    pub fn completed_fields(&self) -> u8 {
        self.state
    }

    /// Returns `true` once the message type byte is out.
    pub fn header_written(&self) -> bool {
        self.header_written
    }

    pub(crate) fn reset(&mut self) {
        self.state = 0;
        self.header_written = false;
        self.field.reset();
    }
}

/// Stack of frames for one encode or decode session.
#[derive(Debug)]
pub struct MessageState {
    frames: Vec<Frame>,
    depth: usize,
    max_depth: usize,
}

impl MessageState {
    /// Creates a state allowing `max_depth` nesting levels.
    pub fn new(max_depth: usize) -> Self {
        Self {
            frames: vec![Frame::default()],
            depth: 0,
            max_depth: max_depth.max(1),
        }
    }

    /// Returns the current nesting depth, 0 for the root message.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the number of pooled frames.
    pub fn pooled(&self) -> usize {
        self.frames.len()
    }

    /// Returns the frame of the current level.
    pub fn current(&self) -> &Frame {
        &self.frames[self.depth]
    }

    pub(crate) fn current_mut(&mut self) -> &mut Frame {
        &mut self.frames[self.depth]
    }

    /// Descends into a nested message.
    ///
    /// A pooled frame is reused as is; it holds either cleared state or the
    /// progress of the same nested message from an earlier call.
    pub(crate) fn forward(&mut self) -> Result<()> {
        if self.depth + 1 >= self.max_depth {
            return Err(GridwireError::Protocol(format!(
                "message nesting exceeds {} levels",
                self.max_depth
            )));
        }
        self.depth += 1;
        if self.frames.len() <= self.depth {
            self.frames.push(Frame::default());
        }
        trace!(depth = self.depth, "frame pushed");
        Ok(())
    }

    /// Returns to the parent message.
    pub(crate) fn backward(&mut self, finished: bool) {
        if finished {
            self.frames[self.depth].reset();
        }
        self.depth = self.depth.saturating_sub(1);
        trace!(depth = self.depth, finished, "frame popped");
    }

    /// Clears every frame and returns to the root.
    pub fn reset(&mut self) {
        self.frames.iter_mut().for_each(Frame::reset);
        self.depth = 0;
    }
}
