//! Ordered emitter: per-chunk output released in chunk-index order.
//!
//! Scan workers finish out of order, but output must follow on-disk chunk
//! order. Each worker gets a private buffer via [`OrderedOutput::begin`],
//! appends formatted matches, and hands it back via
//! [`OrderedOutput::end`]. A cursor tracks the next index to release;
//! buffers arriving early are held and drained the moment the gap closes,
//! so in-order completions release wait-free without per-chunk signaling.
//! When the held-back total exceeds the configured budget, early
//! producers are blocked until their output drains.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::{Condvar, Mutex};
use termcolor::Buffer;

/// A private per-chunk sink handed to one producer.
pub struct OutputChunk {
    index: u32,
    buffer: Buffer,
}

impl OutputChunk {
    /// The buffer to append formatted output to.
    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }
}

struct EmitState<W> {
    sink: W,
    next: u32,
    held: BTreeMap<u32, Buffer>,
    held_bytes: usize,
    unflushed: usize,
    failed: bool,
}

impl<W: Write> EmitState<W> {
    fn release(&mut self, buffer: &Buffer, flush_threshold: usize) -> io::Result<()> {
        self.sink.write_all(buffer.as_slice())?;
        self.next += 1;

        self.unflushed += buffer.as_slice().len();
        if self.unflushed >= flush_threshold {
            self.sink.flush()?;
            self.unflushed = 0;
        }

        Ok(())
    }
}

/// Many-producer, order-preserving output multiplexer.
pub struct OrderedOutput<W> {
    state: Mutex<EmitState<W>>,
    released: Condvar,
    max_buffered: usize,
    flush_threshold: usize,
    color: bool,
}

impl<W: Write> OrderedOutput<W> {
    pub fn new(sink: W, max_buffered: usize, flush_threshold: usize, color: bool) -> Self {
        Self {
            state: Mutex::new(EmitState {
                sink,
                next: 0,
                held: BTreeMap::new(),
                held_bytes: 0,
                unflushed: 0,
                failed: false,
            }),
            released: Condvar::new(),
            max_buffered,
            flush_threshold,
            color,
        }
    }

    /// Open the private sink for chunk `index`.
    pub fn begin(&self, index: u32) -> OutputChunk {
        let buffer = if self.color {
            Buffer::ansi()
        } else {
            Buffer::no_color()
        };

        OutputChunk { index, buffer }
    }

    /// Submit a finished chunk. Output is written through immediately when
    /// `index` is next in line (draining any directly following held
    /// buffers), otherwise held back.
    pub fn end(&self, chunk: OutputChunk) -> io::Result<()> {
        let OutputChunk { index, buffer } = chunk;
        let mut state = self.state.lock().unwrap();

        debug_assert!(index >= state.next);

        if index == state.next {
            let result = (|| {
                state.release(&buffer, self.flush_threshold)?;

                loop {
                    let next = state.next;
                    let Some(held) = state.held.remove(&next) else {
                        break;
                    };
                    state.held_bytes -= held.as_slice().len();
                    state.release(&held, self.flush_threshold)?;
                }

                Ok(())
            })();

            // Parked producers must wake even on a sink failure, or they
            // would wait forever for a drain that cannot happen.
            if result.is_err() {
                state.failed = true;
            }
            self.released.notify_all();
            return result;
        }

        state.held_bytes += buffer.as_slice().len();
        state.held.insert(index, buffer);

        // Back-pressure: an early producer parks until its own output has
        // drained or the held-back total falls under the budget. The
        // producer owning `next` never reaches this point, and chunk
        // tasks start in index order, so the chain always advances.
        while !state.failed && state.held_bytes > self.max_buffered && state.held.contains_key(&index) {
            state = self.released.wait(state).unwrap();
        }

        Ok(())
    }

    /// Flush the sink and return it. All submitted chunks have been
    /// released when the producers are done.
    pub fn finish(self) -> io::Result<W> {
        let mut state = self.state.into_inner().unwrap();
        debug_assert!(state.held.is_empty());
        state.sink.flush()?;
        Ok(state.sink)
    }
}
