use log::debug;

use super::{BufferKey, EventSelectionSet, MappedBuffer};
use crate::count::{CounterHandle, Kernel};
use crate::ffi::abi as b;
use crate::io_loop::{Flow, IoEventLoop, LoopHandler, Ready, Token};
use crate::sample::record::{Records, Schema};
use crate::sample::{RecordBuffer, RecordConsumer};
use crate::{Error, Result};

impl<K: Kernel> EventSelectionSet<K> {
    /// Maps one ring buffer per cpu (or per thread for cpu-agnostic event files)
    /// and redirects every other event file of that cpu into it.
    ///
    /// The largest power of two of data pages not above `max_pages` is tried
    /// first, halving on failure down to `min_pages`.
    pub fn mmap_event_files(&mut self, min_pages: usize, max_pages: usize) -> Result<()> {
        self.check_opened()?;
        if !self.buffers.is_empty() {
            return Err(Error::AlreadyMapped);
        }
        let invalid = Error::InvalidMmapSize {
            min: min_pages,
            max: max_pages,
        };
        if min_pages == 0 || min_pages > max_pages {
            return Err(invalid);
        }
        let mut pages = 1 << (usize::BITS - 1 - max_pages.leading_zeros());
        if pages < min_pages {
            return Err(invalid);
        }

        loop {
            match self.map_buffers(pages, None) {
                Ok(()) => break,
                Err(e) if pages / 2 >= min_pages => {
                    debug!("failed to map {} pages, retry with {}: {}", pages, pages / 2, e);
                    self.buffers.clear();
                    pages /= 2;
                }
                Err(e) => {
                    self.buffers.clear();
                    return Err(e);
                }
            }
        }
        debug!("mapped {} buffers of {} pages", self.buffers.len(), pages);
        self.mmap_pages = pages;
        Ok(())
    }

    /// Creates the buffers of every event file, or only of those on `only_cpu`,
    /// that do not have one yet.
    pub(super) fn map_buffers(&mut self, pages: usize, only_cpu: Option<i32>) -> Result<()> {
        for selection in &self.selections {
            for (&(tid, cpu), handle) in &selection.counters {
                if only_cpu.is_some_and(|it| it != cpu) {
                    continue;
                }
                let mmap_error = |source| Error::Mmap {
                    pages,
                    tid,
                    cpu,
                    source,
                };
                let key = BufferKey::new(tid, cpu);
                match self.buffers.get(&key) {
                    Some(mapped) => {
                        let (id, owner) = mapped.owner;
                        let to = &self.selections[id as usize].counters[&owner];
                        handle.redirect_output(to).map_err(mmap_error)?;
                    }
                    None => {
                        let buffer = handle.mmap(pages).map_err(mmap_error)?;
                        self.buffers.insert(
                            key,
                            MappedBuffer {
                                owner: (selection.selection_id, (tid, cpu)),
                                fd: handle.raw_fd(),
                                buffer,
                                token: None,
                            },
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Watches every buffer on `lp` and hands the records drained from them to
    /// `consumer`, once the set is driven as the loop's handler.
    pub fn prepare_to_read_mmap_event_data<L, C>(&mut self, lp: &mut L, consumer: C) -> Result<()>
    where
        L: IoEventLoop,
        C: RecordConsumer + 'static,
    {
        if self.buffers.is_empty() {
            return Err(Error::NotMapped);
        }
        for mapped in self.buffers.values_mut() {
            if mapped.token.is_none() {
                mapped.token = Some(lp.add_read_event(mapped.fd)?);
            }
        }
        self.consumer = Some(Box::new(consumer));
        Ok(())
    }

    /// Drains every buffer one last time, typically after the loop stopped.
    pub fn finish_read_mmap_event_data(&mut self) -> Result<()> {
        let keys: Vec<_> = self.buffers.keys().copied().collect();
        for key in keys {
            self.drain_buffer(key)?;
        }
        Ok(())
    }

    /// Record layout shared by every buffer of the set.
    pub fn schema(&self) -> Schema {
        self.selections
            .first()
            .map(|it| Schema {
                sample_type: it.attr.sample_type,
                sample_id_all: it.attr.flag(b::PERF_ATTR_FLAG_SAMPLE_ID_ALL),
            })
            .unwrap_or_default()
    }

    pub(super) fn drain_buffer(&mut self, key: BufferKey) -> Result<()> {
        let schema = self.schema();
        let Some(mapped) = self.buffers.get_mut(&key) else {
            return Ok(());
        };
        let consumer = self.consumer.as_mut().ok_or(Error::NoConsumer)?;

        self.drain_buf.clear();
        if mapped.buffer.drain(&mut self.drain_buf) == 0 {
            return Ok(());
        }
        for record in Records::new(&self.drain_buf, schema) {
            if !consumer.consume(record?) {
                return Err(Error::ConsumerAborted);
            }
        }
        Ok(())
    }

    /// Whether `token` is one of the set's loop registrations.
    pub fn owns(&self, token: Token) -> bool {
        self.hotplug_timer == Some(token) || self.buffer_of(token).is_some()
    }

    fn buffer_of(&self, token: Token) -> Option<BufferKey> {
        self.buffers
            .iter()
            .find(|(_, it)| it.token == Some(token))
            .map(|(&key, _)| key)
    }
}

/// Drains the buffer behind a ready token and polls hotplug on timer ticks.
///
/// Tokens the set did not register are ignored, so a caller handler can
/// forward everything it does not own. A buffer that hangs up, because every
/// thread it monitored exited, is drained once more and unregistered. The loop
/// exits when no buffer is left registered.
impl<K: Kernel, L: IoEventLoop> LoopHandler<L> for EventSelectionSet<K> {
    fn on_ready(&mut self, lp: &mut L, ready: Ready) -> Result<Flow> {
        let token = ready.token;
        if self.hotplug_timer == Some(token) {
            self.detect_cpu_hotplug_events(lp)?;
            return Ok(Flow::Continue);
        }
        let Some(key) = self.buffer_of(token) else {
            return Ok(Flow::Continue);
        };
        self.drain_buffer(key)?;
        if !ready.hangup {
            return Ok(Flow::Continue);
        }

        // Level-triggered hangups stay ready, so the registration has to go.
        lp.del_event(token)?;
        if let Some(mapped) = self.buffers.get_mut(&key) {
            mapped.token = None;
        }
        debug!("buffer of {:?} hung up", key);
        if self.buffers.values().all(|it| it.token.is_none()) {
            Ok(Flow::Exit)
        } else {
            Ok(Flow::Continue)
        }
    }
}
