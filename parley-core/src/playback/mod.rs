//! Outbound audio: generation-tagged playback queue with barge-in cancellation.
//!
//! Producers (turn tasks) write synthesizer chunks through a [`PlaybackWriter`],
//! which re-frames them to fixed playback frames at the output rate. The
//! transport pulls [`PlaybackItem`]s with [`PlaybackScheduler::next`] and
//! turns them into wire messages with an [`OutboundTracker`].
//!
//! Writes are accepted only while their generation is live: the latest one
//! issued and not cancelled. `cancel(g)` purges every queued item of
//! generation `g` (and older), raises the generation clock's cancellation
//! floor and enqueues an interrupted end-of-turn marker. Frames already handed
//! to the transport are not retracted.

pub mod outbound;
pub mod packer;
pub mod pacer;

pub use outbound::{Outbound, OutboundTracker};
pub use packer::FramePacker;
pub use pacer::Pacer;

use std::collections::VecDeque;
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::{
    buffering::AudioFrame,
    engine::GenerationClock,
    error::Result,
    services::AudioChunkStream,
    session::SessionDiagnostics,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackItem {
    Frame { generation: u64, frame: AudioFrame },
    EndOfTurn { generation: u64, interrupted: bool },
}

impl PlaybackItem {
    pub fn generation(&self) -> u64 {
        match self {
            PlaybackItem::Frame { generation, .. } | PlaybackItem::EndOfTurn { generation, .. } => {
                *generation
            }
        }
    }

    pub fn is_frame(&self) -> bool {
        matches!(self, PlaybackItem::Frame { .. })
    }
}

#[derive(Default)]
struct Queue {
    items: VecDeque<PlaybackItem>,
    closed: bool,
}

pub struct PlaybackScheduler {
    clock: Arc<GenerationClock>,
    queue: Mutex<Queue>,
    notify: Notify,
    output_rate: u32,
    frame_ms: u32,
    diagnostics: Arc<SessionDiagnostics>,
}

impl PlaybackScheduler {
    pub fn new(
        clock: Arc<GenerationClock>,
        output_rate: u32,
        frame_ms: u32,
        diagnostics: Arc<SessionDiagnostics>,
    ) -> Self {
        Self {
            clock,
            queue: Mutex::new(Queue::default()),
            notify: Notify::new(),
            output_rate,
            frame_ms,
            diagnostics,
        }
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn frame_ms(&self) -> u32 {
        self.frame_ms
    }

    /// Open a writer for `generation` whose input arrives at `source_rate`.
    ///
    /// # Errors
    /// `ParleyError::Resampler` if the output rate converter cannot be built.
    pub fn writer(self: &Arc<Self>, generation: u64, source_rate: u32) -> Result<PlaybackWriter> {
        Ok(PlaybackWriter {
            scheduler: Arc::clone(self),
            generation,
            packer: FramePacker::new(source_rate, self.output_rate, self.frame_ms)?,
            frames: 0,
        })
    }

    /// Drain a whole chunk stream into the queue as `generation`, then mark the
    /// end of turn. Returns `Ok(false)` when the generation stopped being live
    /// part-way.
    ///
    /// # Errors
    /// The first error yielded by `stream`; frames already queued stay queued.
    pub async fn enqueue(
        self: &Arc<Self>,
        generation: u64,
        source_rate: u32,
        mut stream: AudioChunkStream,
    ) -> Result<bool> {
        let mut writer = self.writer(generation, source_rate)?;
        while let Some(chunk) = stream.next().await {
            if !writer.push(&chunk?) {
                return Ok(false);
            }
        }
        Ok(writer.finish())
    }

    /// Drop everything queued for `generation` and older, refuse its future
    /// writes, and queue an interrupted end-of-turn marker ahead of any newer
    /// generation's items. Returns the number of frames dropped.
    pub fn cancel(&self, generation: u64) -> usize {
        self.clock.cancel(generation);
        let dropped = {
            let mut q = self.queue.lock();
            if q.closed {
                return 0;
            }
            let dropped = q
                .items
                .iter()
                .filter(|it| it.is_frame() && it.generation() <= generation)
                .count();
            q.items.retain(|it| it.generation() > generation);
            // Only newer generations remain, so the marker goes first.
            q.items.push_front(PlaybackItem::EndOfTurn {
                generation,
                interrupted: true,
            });
            dropped
        };
        SessionDiagnostics::add(&self.diagnostics.playback_frames_dropped, dropped);
        info!(generation, dropped, "playback cancelled");
        self.notify.notify_one();
        dropped
    }

    /// Pop the next item without waiting.
    pub fn try_next(&self) -> Option<PlaybackItem> {
        self.queue.lock().items.pop_front()
    }

    /// Wait for the next item. `None` once the scheduler is closed.
    pub async fn next(&self) -> Option<PlaybackItem> {
        loop {
            {
                let mut q = self.queue.lock();
                if q.closed {
                    return None;
                }
                if let Some(item) = q.items.pop_front() {
                    return Some(item);
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn queued_frames(&self) -> usize {
        self.queue.lock().items.iter().filter(|it| it.is_frame()).count()
    }

    /// Stop accepting items, drop the queue and wake the transport.
    pub fn close(&self) {
        let dropped = {
            let mut q = self.queue.lock();
            if q.closed {
                return;
            }
            q.closed = true;
            let dropped = q.items.iter().filter(|it| it.is_frame()).count();
            q.items.clear();
            dropped
        };
        SessionDiagnostics::add(&self.diagnostics.playback_frames_dropped, dropped);
        debug!(dropped, "playback scheduler closed");
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.queue.lock().closed
    }

    fn append(&self, generation: u64, frames: Vec<AudioFrame>, end_of_turn: bool) -> bool {
        let n = frames.len();
        {
            let mut q = self.queue.lock();
            if q.closed || !self.clock.is_live(generation) {
                drop(q);
                SessionDiagnostics::add(&self.diagnostics.playback_frames_dropped, n);
                return false;
            }
            q.items
                .extend(frames.into_iter().map(|frame| PlaybackItem::Frame { generation, frame }));
            if end_of_turn {
                q.items.push_back(PlaybackItem::EndOfTurn {
                    generation,
                    interrupted: false,
                });
            }
        }
        SessionDiagnostics::add(&self.diagnostics.playback_frames, n);
        if n > 0 || end_of_turn {
            self.notify.notify_one();
        }
        true
    }
}

/// Per-generation producer handle.
pub struct PlaybackWriter {
    scheduler: Arc<PlaybackScheduler>,
    generation: u64,
    packer: FramePacker,
    frames: usize,
}

impl PlaybackWriter {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Frames queued so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Re-frame `chunk` and queue the complete frames. Returns `false` once the
    /// generation has been cancelled or superseded, or the scheduler closed;
    /// the caller should stop producing.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        if !self.scheduler.clock.is_live(self.generation) {
            return false;
        }
        let frames = self.packer.push(chunk);
        let n = frames.len();
        if n == 0 {
            return !self.scheduler.is_closed();
        }
        let accepted = self.scheduler.append(self.generation, frames, false);
        if accepted {
            self.frames += n;
        }
        accepted
    }

    /// Queue the padded tail and the end-of-turn marker.
    pub fn finish(mut self) -> bool {
        let frames = self.packer.finish();
        self.frames += frames.len();
        debug!(generation = self.generation, frames = self.frames, "playback generation complete");
        self.scheduler.append(self.generation, frames, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn scheduler(rate: u32, frame_ms: u32) -> (Arc<PlaybackScheduler>, Arc<GenerationClock>) {
        let clock = Arc::new(GenerationClock::new());
        let sched = Arc::new(PlaybackScheduler::new(
            Arc::clone(&clock),
            rate,
            frame_ms,
            Arc::new(SessionDiagnostics::default()),
        ));
        (sched, clock)
    }

    fn drain(sched: &PlaybackScheduler) -> Vec<PlaybackItem> {
        std::iter::from_fn(|| sched.try_next()).collect()
    }

    #[tokio::test]
    async fn enqueue_reframes_pads_and_marks_end() {
        let (sched, clock) = scheduler(16_000, 20);
        let g = clock.advance();
        let chunks: Vec<Result<Vec<u8>>> =
            vec![Ok(vec![1u8; 333]), Ok(vec![1u8; 333]), Ok(vec![1u8; 334])];
        assert!(sched.enqueue(g, 16_000, stream::iter(chunks).boxed()).await.unwrap());

        let items = drain(&sched);
        // 1000 bytes over 640-byte frames: one full, one padded, then the marker.
        assert_eq!(items.len(), 3);
        match &items[1] {
            PlaybackItem::Frame { frame, .. } => {
                assert_eq!(frame.data.len(), 640);
                assert!(frame.data[360..].iter().all(|&b| b == 0));
            }
            other => panic!("expected frame, got {other:?}"),
        }
        assert_eq!(
            items[2],
            PlaybackItem::EndOfTurn {
                generation: g,
                interrupted: false
            }
        );
    }

    #[test]
    fn cancel_purges_generation_and_refuses_later_writes() {
        let (sched, clock) = scheduler(16_000, 20);
        let g = clock.advance();
        let mut w = sched.writer(g, 16_000).unwrap();
        assert!(w.push(&vec![0u8; 640 * 4]));
        assert_eq!(sched.queued_frames(), 4);

        assert_eq!(sched.cancel(g), 4);
        assert!(!w.push(&vec![0u8; 640]));
        assert!(!w.finish());

        assert_eq!(
            drain(&sched),
            vec![PlaybackItem::EndOfTurn {
                generation: g,
                interrupted: true
            }]
        );
    }

    #[test]
    fn newer_generation_survives_cancel_of_older() {
        let (sched, clock) = scheduler(16_000, 20);
        let g1 = clock.advance();
        let mut w1 = sched.writer(g1, 16_000).unwrap();
        w1.push(&vec![0u8; 640 * 2]);
        let g2 = clock.advance();
        let mut w2 = sched.writer(g2, 16_000).unwrap();
        w2.push(&vec![0u8; 640]);

        sched.cancel(g1);
        let items = drain(&sched);
        assert_eq!(
            items[0],
            PlaybackItem::EndOfTurn {
                generation: g1,
                interrupted: true
            }
        );
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].generation(), g2);
        assert!(items[1].is_frame());
    }

    #[test]
    fn superseded_generation_is_refused_without_a_cancel() {
        let (sched, clock) = scheduler(16_000, 20);
        let g1 = clock.advance();
        let mut w1 = sched.writer(g1, 16_000).unwrap();
        assert!(w1.push(&vec![3u8; 640 * 2]));

        let g2 = clock.advance();
        assert!(!clock.is_cancelled(g1));
        assert!(!w1.push(&vec![3u8; 640]));
        assert!(!w1.finish());
        assert_eq!(sched.queued_frames(), 2);

        // The superseded turn retires its leftovers; the newer one is unaffected.
        assert_eq!(sched.cancel(g1), 2);
        let mut w2 = sched.writer(g2, 16_000).unwrap();
        assert!(w2.push(&vec![4u8; 640]));
        let items = drain(&sched);
        assert_eq!(
            items[0],
            PlaybackItem::EndOfTurn {
                generation: g1,
                interrupted: true
            }
        );
        assert!(items[1..].iter().all(|it| it.generation() == g2));
    }

    #[tokio::test]
    async fn next_wakes_on_push_and_ends_on_close() {
        let (sched, clock) = scheduler(16_000, 20);
        let g = clock.advance();
        let consumer = {
            let sched = Arc::clone(&sched);
            tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(item) = sched.next().await {
                    let end = !item.is_frame();
                    got.push(item);
                    if end {
                        break;
                    }
                }
                got
            })
        };
        let mut w = sched.writer(g, 16_000).unwrap();
        w.push(&vec![0u8; 640]);
        w.finish();
        let got = consumer.await.unwrap();
        assert_eq!(got.len(), 2);

        let waiter = {
            let sched = Arc::clone(&sched);
            tokio::spawn(async move { sched.next().await })
        };
        tokio::task::yield_now().await;
        sched.close();
        assert_eq!(waiter.await.unwrap(), None);
    }
}
