use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// Real-time pacing for outbound frames.
///
/// The first `lead_frames` of a generation go out immediately to prime the
/// client's jitter buffer; after that frame `n` is due at
/// `origin + (n - lead) * frame`. When the producer falls behind, the schedule
/// is rebased on the late frame instead of bursting to catch up.
#[derive(Debug)]
pub struct Pacer {
    frame: Duration,
    lead_frames: u32,
    origin: Option<Instant>,
    sent: u32,
}

impl Pacer {
    pub fn new(frame_ms: u32, lead_frames: u32) -> Self {
        Self {
            frame: Duration::from_millis(frame_ms as u64),
            lead_frames,
            origin: None,
            sent: 0,
        }
    }

    /// Wait until the next frame may go out. The schedule only moves on
    /// [`Pacer::mark_sent`], so this can be dropped and awaited again freely.
    pub async fn ready(&mut self) {
        let now = Instant::now();
        let origin = *self.origin.get_or_insert(now);
        if self.sent < self.lead_frames {
            return;
        }
        let offset = self.frame * (self.sent - self.lead_frames);
        let due = origin + offset;
        if due > now {
            sleep_until(due).await;
        } else if let Some(rebased) = now.checked_sub(offset) {
            self.origin = Some(rebased);
        }
    }

    pub fn mark_sent(&mut self) {
        self.sent = self.sent.saturating_add(1);
    }

    /// Start over for the next generation.
    pub fn reset(&mut self) {
        self.origin = None;
        self.sent = 0;
    }

    pub fn frames_sent(&self) -> u32 {
        self.sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn send(pacer: &mut Pacer) {
        pacer.ready().await;
        pacer.mark_sent();
    }

    #[tokio::test(start_paused = true)]
    async fn lead_frames_are_immediate_then_real_time() {
        let mut pacer = Pacer::new(20, 3);
        let start = Instant::now();
        for _ in 0..3 {
            send(&mut pacer).await;
        }
        assert_eq!(Instant::now(), start);

        // Frames 3..8 are due at 0, 20, 40, 60, 80 ms after the origin.
        for _ in 0..5 {
            send(&mut pacer).await;
        }
        assert_eq!(Instant::now() - start, Duration::from_millis(80));
        assert_eq!(pacer.frames_sent(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_restores_the_lead_burst() {
        let mut pacer = Pacer::new(20, 1);
        send(&mut pacer).await;
        send(&mut pacer).await;
        send(&mut pacer).await;
        let after_first = Instant::now();
        pacer.reset();
        send(&mut pacer).await;
        assert_eq!(Instant::now(), after_first);
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_again_does_not_advance_the_schedule() {
        let mut pacer = Pacer::new(20, 0);
        let start = Instant::now();
        pacer.ready().await;
        pacer.ready().await;
        assert_eq!(Instant::now(), start);
        pacer.mark_sent();

        // An abandoned wait leaves the next slot where it was.
        let _ = tokio::time::timeout(Duration::from_millis(5), pacer.ready()).await;
        pacer.ready().await;
        assert_eq!(Instant::now() - start, Duration::from_millis(20));
        assert_eq!(pacer.frames_sent(), 1);
    }
}
