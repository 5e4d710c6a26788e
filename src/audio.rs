/*!
 # Audio trigger coordination

 Signaling protocol between the once-per-second scheduling context and the
 audio-rendering context. The two sides share four flags and the pending
 clip path behind a single mutex, held only for the read-modify-write —
 never across file I/O or a rendering call.

 The scheduling side energizes the amplifier relay on every bell and runs
 two delay timers: a warm-up delay before the first clip drives a cold
 amplifier, and a cool-down delay before power-down once playback has
 fallen silent. The rendering side polls once per second, starts playback
 for recognized clips, and reports the falling edge of playback so the
 scheduling side knows when to begin the cool-down.
*/

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::schedule::ManualPreset;
use crate::timer::OnDelay;
use crate::{Error, Result};

/// Highest volume level on the user-facing 0-10 scale
pub const MAX_VOLUME: u8 = 10;

/// Renderer gain at volume level 1
const GAIN_MIN: f32 = 0.1;

/// Renderer gain at volume level 10
const GAIN_MAX: f32 = 4.0;

/// Amplifier warm-up interval between relay-on and the first clip
const WARMUP_DELAY: Duration = Duration::from_secs(2);

/// Cool-down interval between end of playback and relay-off
const COOLDOWN_DELAY: Duration = Duration::from_secs(2);

/// Maps the user volume level to renderer gain: 0 mutes, 1-10 spread
/// linearly between the minimum and maximum gain
pub fn volume_to_gain(volume: u8) -> f32 {
    if volume == 0 {
        return 0.0;
    }
    let volume = volume.min(MAX_VOLUME);
    GAIN_MIN + (volume - 1) as f32 * (GAIN_MAX - GAIN_MIN) / (MAX_VOLUME - 1) as f32
}

/// Interface to the external audio decoder/output driver
pub trait AudioRenderer {
    /// Opens the clip at `path` as the next source
    fn open(&mut self, path: &Path) -> Result<()>;
    /// Starts rendering the opened source
    fn begin(&mut self) -> Result<()>;
    /// Drives decoding; returns false once the clip has ended
    fn pump(&mut self) -> bool;
    fn stop(&mut self);
    fn is_running(&self) -> bool;
    fn set_gain(&mut self, gain: f32);
}

/// Placeholder renderer used when no decoder backend is wired up.
///
/// Reports playback for a fixed simulated clip length so the relay
/// sequencing around each bell still runs end to end.
#[derive(Debug)]
pub struct SilentRenderer {
    clip_len: Duration,
    started: Option<Instant>,
    gain: f32,
}

impl SilentRenderer {
    pub fn new(clip_len: Duration) -> SilentRenderer {
        SilentRenderer {
            clip_len,
            started: None,
            gain: 1.0,
        }
    }
}

impl Default for SilentRenderer {
    fn default() -> Self {
        SilentRenderer::new(Duration::from_secs(5))
    }
}

impl AudioRenderer for SilentRenderer {
    fn open(&mut self, path: &Path) -> Result<()> {
        debug!(file = %path.display(), "silent renderer opened clip");
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        debug!(gain = self.gain, "silent playback started");
        self.started = Some(Instant::now());
        Ok(())
    }

    fn pump(&mut self) -> bool {
        self.is_running()
    }

    fn stop(&mut self) {
        self.started = None;
    }

    fn is_running(&self) -> bool {
        self.started
            .map(|started| started.elapsed() < self.clip_len)
            .unwrap_or(false)
    }

    fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }
}

/// Interface to the amplifier and relay output lines
pub trait BellOutputs {
    fn set_amplifier(&mut self, on: bool);
    fn set_relay(&mut self, on: bool);
}

/// Output lines that only log their transitions, for running without the
/// I/O expander hardware
#[derive(Debug, Default)]
pub struct LogOutputs {
    amplifier: bool,
    relay: bool,
}

impl BellOutputs for LogOutputs {
    fn set_amplifier(&mut self, on: bool) {
        if self.amplifier != on {
            info!(on, "amplifier enable");
            self.amplifier = on;
        }
    }

    fn set_relay(&mut self, on: bool) {
        if self.relay != on {
            info!(on, "audio relay");
            self.relay = on;
        }
    }
}

/// Shared flags between the two contexts. `is_playing` is written only by
/// the rendering context.
#[derive(Debug, Default)]
struct SharedFlags {
    play_requested: bool,
    stop_requested: bool,
    is_playing: bool,
    pending_path: Option<PathBuf>,
}

/// Handle to the mutex-guarded shared state. Both halves of the protocol
/// hold a clone; all flag access goes through the coordinator and pump
/// operations, nothing reaches the flags ad hoc.
#[derive(Debug, Clone, Default)]
pub struct AudioShared {
    inner: Arc<Mutex<SharedFlags>>,
}

impl AudioShared {
    pub fn new() -> AudioShared {
        AudioShared::default()
    }

    /// Whether the rendering context reported playback at its last poll
    pub fn is_playing(&self) -> bool {
        self.inner.lock().is_playing
    }
}

/// Scheduling-context half of the protocol: accepts bell triggers and
/// sequences the relay around playback
pub struct AudioCoordinator<O: BellOutputs> {
    shared: AudioShared,
    outputs: O,
    warming: bool,
    warmup: OnDelay,
    cooldown: OnDelay,
}

impl<O: BellOutputs> AudioCoordinator<O> {
    pub fn new(shared: AudioShared, outputs: O) -> AudioCoordinator<O> {
        AudioCoordinator::with_delays(shared, outputs, WARMUP_DELAY, COOLDOWN_DELAY)
    }

    /// Coordinator with custom delay presets
    pub fn with_delays(
        shared: AudioShared,
        outputs: O,
        warmup: Duration,
        cooldown: Duration,
    ) -> AudioCoordinator<O> {
        AudioCoordinator {
            shared,
            outputs,
            warming: false,
            warmup: OnDelay::new(warmup),
            cooldown: OnDelay::new(cooldown),
        }
    }

    pub fn outputs(&self) -> &O {
        &self.outputs
    }

    /// Requests a bell: energizes the outputs and hands the clip to the
    /// rendering context. The latest request wins when several arrive
    /// between polls.
    #[instrument(skip(self))]
    pub fn ring(&mut self, name: &str, audio_file: &str) {
        info!(name, file = audio_file, "bell ring");
        self.outputs.set_amplifier(true);
        self.outputs.set_relay(true);

        let mut flags = self.shared.inner.lock();
        if flags.is_playing || flags.stop_requested {
            // Equipment already powered: the new bell preempts or
            // immediately follows the one in flight
            flags.stop_requested = false;
            flags.play_requested = true;
        } else {
            // Cold amplifier: hold the request until the warm-up elapses
            self.warming = true;
        }
        flags.pending_path = Some(PathBuf::from(audio_file));
    }

    /// Fires a manual preset bell, bypassing the schedule. Disabled and
    /// out-of-range slots are rejected.
    pub fn ring_preset(&mut self, presets: &[ManualPreset], index: usize) -> bool {
        match presets.get(index) {
            Some(preset) if preset.enabled => {
                self.ring(&preset.name, &preset.audio_file);
                true
            }
            Some(_) => {
                warn!(index, "manual preset is disabled");
                false
            }
            None => {
                warn!(index, "manual preset index out of range");
                false
            }
        }
    }

    /// Drives the delay timers; call once per loop pass. Releases the
    /// held play request after the warm-up and de-energizes the outputs
    /// once the stop request has been held for the cool-down.
    pub fn service(&mut self) {
        if self.warmup.feed(self.warming) {
            self.warming = false;
            self.shared.inner.lock().play_requested = true;
            debug!("warm-up elapsed, play request released");
        }

        let stopping = self.shared.inner.lock().stop_requested;
        if self.cooldown.feed(stopping) {
            self.shared.inner.lock().stop_requested = false;
            self.outputs.set_amplifier(false);
            self.outputs.set_relay(false);
            debug!("cool-down elapsed, outputs de-energized");
        }
    }
}

/// Rendering-context half of the protocol: owns the decoder and reports
/// playback state. Never touches storage.
pub struct AudioPump<R: AudioRenderer> {
    shared: AudioShared,
    renderer: R,
    last_playing: bool,
}

impl<R: AudioRenderer> AudioPump<R> {
    pub fn new(shared: AudioShared, renderer: R) -> AudioPump<R> {
        AudioPump {
            shared,
            renderer,
            last_playing: false,
        }
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.renderer.set_gain(gain);
    }

    /// One poll pass, run once per second: publish the playback state,
    /// detect the end of a clip, and consume any pending play request.
    pub fn poll(&mut self) {
        let request = {
            let mut flags = self.shared.inner.lock();
            flags.is_playing = self.renderer.is_running();
            if self.last_playing && !flags.is_playing && !flags.play_requested {
                // Falling edge of playback with nothing new pending:
                // signal the scheduling side to start the cool-down
                flags.stop_requested = true;
                debug!("playback finished");
            }
            self.last_playing = flags.is_playing;
            if flags.play_requested {
                flags.play_requested = false;
                flags.pending_path.clone()
            } else {
                None
            }
        };

        // Playback start is file I/O, kept outside the lock
        if let Some(path) = request {
            if is_supported(&path) {
                if self.renderer.is_running() {
                    self.renderer.stop();
                }
                info!(file = %path.display(), "starting playback");
                if let Err(err) = self
                    .renderer
                    .open(&path)
                    .and_then(|()| self.renderer.begin())
                {
                    error!(%err, "failed to start playback");
                }
            } else {
                let err = Error::UnsupportedAudioFormat(path.display().to_string());
                error!(%err, "dropping play request");
            }
        }
    }

    /// Continuously drives the decoder; stops it at end of clip
    pub fn pump(&mut self) {
        if self.renderer.is_running() && !self.renderer.pump() {
            self.renderer.stop();
        }
    }
}

/// Only MP3 clips are recognized by the rendering context
fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("mp3"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread::sleep;

    /// Renderer whose playback state the test controls from outside
    #[derive(Clone, Default)]
    struct FakeRenderer {
        running: Arc<AtomicBool>,
        opened: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl AudioRenderer for FakeRenderer {
        fn open(&mut self, path: &Path) -> Result<()> {
            self.opened.lock().push(path.to_path_buf());
            Ok(())
        }

        fn begin(&mut self) -> Result<()> {
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn pump(&mut self) -> bool {
            self.is_running()
        }

        fn stop(&mut self) {
            self.running.store(false, Ordering::SeqCst);
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        fn set_gain(&mut self, _gain: f32) {}
    }

    #[derive(Debug, Default)]
    struct FakeOutputs {
        amplifier: bool,
        relay: bool,
    }

    impl BellOutputs for FakeOutputs {
        fn set_amplifier(&mut self, on: bool) {
            self.amplifier = on;
        }

        fn set_relay(&mut self, on: bool) {
            self.relay = on;
        }
    }

    fn coordinator(
        shared: &AudioShared,
        warmup_ms: u64,
        cooldown_ms: u64,
    ) -> AudioCoordinator<FakeOutputs> {
        AudioCoordinator::with_delays(
            shared.clone(),
            FakeOutputs::default(),
            Duration::from_millis(warmup_ms),
            Duration::from_millis(cooldown_ms),
        )
    }

    #[test]
    fn idle_ring_waits_for_the_warmup_delay() {
        let shared = AudioShared::new();
        let mut coord = coordinator(&shared, 30, 30);

        coord.ring("Assembly", "/audio/a.mp3");
        assert!(coord.outputs().relay, "relay energizes immediately");
        assert!(coord.outputs().amplifier);
        assert!(!shared.inner.lock().play_requested);

        coord.service();
        assert!(!shared.inner.lock().play_requested, "still warming up");

        sleep(Duration::from_millis(40));
        coord.service();
        assert!(shared.inner.lock().play_requested);
        assert_eq!(
            shared.inner.lock().pending_path.as_deref(),
            Some(Path::new("/audio/a.mp3"))
        );
    }

    #[test]
    fn ring_while_playing_requests_immediately() {
        let shared = AudioShared::new();
        let renderer = FakeRenderer::default();
        let mut pump = AudioPump::new(shared.clone(), renderer.clone());
        let mut coord = coordinator(&shared, 0, 30);

        // First bell starts playback
        coord.ring("First", "/audio/first.mp3");
        coord.service();
        pump.poll();
        pump.poll();
        assert!(shared.is_playing());

        // Second bell preempts with no warm-up hold
        coord.ring("Second", "/audio/second.mp3");
        assert!(shared.inner.lock().play_requested);
        assert!(!coord.warming);

        pump.poll();
        let opened = renderer.opened.lock().clone();
        assert_eq!(
            opened,
            vec![
                PathBuf::from("/audio/first.mp3"),
                PathBuf::from("/audio/second.mp3")
            ]
        );
    }

    #[test]
    fn ring_clears_a_pending_stop_request() {
        let shared = AudioShared::new();
        let mut coord = coordinator(&shared, 30, 30);

        shared.inner.lock().stop_requested = true;
        coord.ring("Chained", "/audio/c.mp3");

        let flags = shared.inner.lock();
        assert!(!flags.stop_requested);
        assert!(flags.play_requested, "no warm-up while equipment is hot");
    }

    #[test]
    fn falling_edge_of_playback_requests_stop() {
        let shared = AudioShared::new();
        let renderer = FakeRenderer::default();
        let mut pump = AudioPump::new(shared.clone(), renderer.clone());
        let mut coord = coordinator(&shared, 0, 30);

        coord.ring("Only", "/audio/only.mp3");
        coord.service();
        pump.poll();
        pump.poll();
        assert!(shared.is_playing());

        // Clip ends; the next poll reports the falling edge
        renderer.running.store(false, Ordering::SeqCst);
        pump.poll();
        assert!(shared.inner.lock().stop_requested);
    }

    #[test]
    fn cooldown_deenergizes_outputs_and_clears_stop() {
        let shared = AudioShared::new();
        let mut coord = coordinator(&shared, 0, 20);

        coord.ring("Bell", "/audio/x.mp3");
        shared.inner.lock().stop_requested = true;

        coord.service();
        assert!(coord.outputs().relay, "cool-down still counting");

        sleep(Duration::from_millis(30));
        coord.service();
        assert!(!coord.outputs().relay);
        assert!(!coord.outputs().amplifier);
        assert!(!shared.inner.lock().stop_requested);
    }

    #[test]
    fn unsupported_format_is_dropped() {
        let shared = AudioShared::new();
        let renderer = FakeRenderer::default();
        let mut pump = AudioPump::new(shared.clone(), renderer.clone());

        {
            let mut flags = shared.inner.lock();
            flags.play_requested = true;
            flags.pending_path = Some(PathBuf::from("/audio/siren.wav"));
        }
        pump.poll();

        assert!(renderer.opened.lock().is_empty());
        assert!(!shared.inner.lock().play_requested, "request was consumed");
        assert!(!renderer.is_running());
    }

    #[test]
    fn latest_ring_wins_between_polls() {
        let shared = AudioShared::new();
        let renderer = FakeRenderer::default();
        let mut pump = AudioPump::new(shared.clone(), renderer.clone());
        let mut coord = coordinator(&shared, 0, 30);

        coord.ring("A", "/audio/a.mp3");
        coord.ring("B", "/audio/b.mp3");
        coord.service();
        pump.poll();

        assert_eq!(
            renderer.opened.lock().clone(),
            vec![PathBuf::from("/audio/b.mp3")]
        );
    }

    #[test]
    fn preset_trigger_validates_slot_state() {
        let shared = AudioShared::new();
        let mut coord = coordinator(&shared, 30, 30);
        let mut presets: [ManualPreset; 4] = Default::default();
        presets[1] = ManualPreset {
            enabled: true,
            name: "Break".to_string(),
            audio_file: "/audio/break.mp3".to_string(),
        };

        assert!(!coord.ring_preset(&presets, 0), "disabled slot rejected");
        assert!(!coord.ring_preset(&presets, 9), "out of range rejected");
        assert!(coord.ring_preset(&presets, 1));
        assert_eq!(
            shared.inner.lock().pending_path.as_deref(),
            Some(Path::new("/audio/break.mp3"))
        );
    }

    #[test]
    fn volume_maps_linearly_to_gain() {
        assert_eq!(volume_to_gain(0), 0.0);
        assert_eq!(volume_to_gain(1), GAIN_MIN);
        assert!((volume_to_gain(MAX_VOLUME) - GAIN_MAX).abs() < 1e-5);
        assert_eq!(volume_to_gain(MAX_VOLUME + 5), volume_to_gain(MAX_VOLUME));
        assert!(volume_to_gain(5) > volume_to_gain(4));
    }
}
