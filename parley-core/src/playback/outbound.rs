use super::PlaybackItem;
use crate::ipc::ServerEvent;

/// One message for the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Event(ServerEvent),
    /// Raw PCM16 playback frame (binary message).
    Audio { generation: u64, pcm16: Vec<u8> },
}

/// Turns the playback item sequence into wire messages: `ttsBegin` before a
/// generation's first frame, the frame itself (binary, or base64 `ttsChunk`
/// when `inline_audio` is set) and `ttsEnd` when the generation ends.
///
/// A generation whose frames stop without a marker (superseded, not
/// cancelled) is closed as interrupted when the next generation starts.
#[derive(Debug, Default)]
pub struct OutboundTracker {
    current: Option<u64>,
    seq: u64,
    inline_audio: bool,
}

impl OutboundTracker {
    pub fn new(inline_audio: bool) -> Self {
        Self {
            current: None,
            seq: 0,
            inline_audio,
        }
    }

    /// Generation currently being delivered.
    pub fn current(&self) -> Option<u64> {
        self.current
    }

    pub fn on_item(&mut self, item: PlaybackItem) -> Vec<Outbound> {
        let mut out = Vec::with_capacity(3);
        match item {
            PlaybackItem::Frame { generation, frame } => {
                if self.current != Some(generation) {
                    if let Some(prev) = self.current.take() {
                        out.push(Outbound::Event(ServerEvent::TtsEnd {
                            generation: prev,
                            interrupted: true,
                        }));
                    }
                    self.current = Some(generation);
                    self.seq = 0;
                    out.push(Outbound::Event(ServerEvent::TtsBegin { generation }));
                }
                let pcm16 = frame.into_bytes();
                if self.inline_audio {
                    out.push(Outbound::Event(ServerEvent::tts_chunk(generation, self.seq, &pcm16)));
                } else {
                    out.push(Outbound::Audio { generation, pcm16 });
                }
                self.seq += 1;
            }
            PlaybackItem::EndOfTurn {
                generation,
                interrupted,
            } => {
                if let Some(cur) = self.current.filter(|&cur| cur <= generation) {
                    self.current = None;
                    out.push(Outbound::Event(ServerEvent::TtsEnd {
                        generation: cur,
                        interrupted: interrupted || cur < generation,
                    }));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::AudioFrame;

    fn frame(generation: u64) -> PlaybackItem {
        PlaybackItem::Frame {
            generation,
            frame: AudioFrame::new(vec![0u8; 640], 16_000, 20),
        }
    }

    fn end(generation: u64, interrupted: bool) -> PlaybackItem {
        PlaybackItem::EndOfTurn {
            generation,
            interrupted,
        }
    }

    #[test]
    fn frames_are_bracketed_by_begin_and_end() {
        let mut t = OutboundTracker::new(false);
        let mut out = Vec::new();
        for item in [frame(1), frame(1), end(1, false)] {
            out.extend(t.on_item(item));
        }
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], Outbound::Event(ServerEvent::TtsBegin { generation: 1 }));
        assert!(matches!(out[1], Outbound::Audio { generation: 1, .. }));
        assert_eq!(
            out[3],
            Outbound::Event(ServerEvent::TtsEnd {
                generation: 1,
                interrupted: false
            })
        );
        assert_eq!(t.current(), None);
    }

    #[test]
    fn cancel_marker_for_unstarted_generation_is_silent() {
        let mut t = OutboundTracker::new(false);
        assert!(t.on_item(end(3, true)).is_empty());
    }

    #[test]
    fn cancel_of_newer_generation_ends_older_playback() {
        let mut t = OutboundTracker::new(false);
        t.on_item(frame(1));
        let out = t.on_item(end(2, true));
        assert_eq!(
            out,
            vec![Outbound::Event(ServerEvent::TtsEnd {
                generation: 1,
                interrupted: true
            })]
        );
    }

    #[test]
    fn superseded_generation_is_closed_by_the_next_one() {
        let mut t = OutboundTracker::new(true);
        t.on_item(frame(1));
        let out = t.on_item(frame(2));
        assert_eq!(
            out[0],
            Outbound::Event(ServerEvent::TtsEnd {
                generation: 1,
                interrupted: true
            })
        );
        assert_eq!(out[1], Outbound::Event(ServerEvent::TtsBegin { generation: 2 }));
        assert!(matches!(
            &out[2],
            Outbound::Event(ServerEvent::TtsChunk { generation: 2, seq: 0, .. })
        ));
    }
}
