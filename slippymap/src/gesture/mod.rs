//! Multi-touch gesture recognition.
//!
//! A small state machine turns raw pointer events into pan/zoom/tap/fling
//! intents. It is event-driven with explicit timestamps: the caller feeds
//! [`TouchEvent`]s as they arrive and calls [`poll`] once per frame so a
//! withheld single tap can fire after the double-tap window closes. No
//! platform timers are involved.
//!
//! All state is scoped to one touch-down-to-up sequence and cleared on
//! release or cancel; only the pending-tap record survives a release, since
//! double-tap detection spans two sequences.
//!
//! [`poll`]: GestureRecognizer::poll

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::debug;

/// Exponent base for the zoom scale response.
const ZOOM_BASE: f64 = 1.6;

/// Single-pole low-pass divisor for pan and zoom smoothing.
const SMOOTHING: f64 = 5.0;

/// Only pointer samples this recent contribute to fling velocity.
const VELOCITY_WINDOW: Duration = Duration::from_millis(100);

/// A pointer position in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pointer {
    pub x: f64,
    pub y: f64,
}

impl Pointer {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn dist_sq(&self, other: &Pointer) -> f64 {
        (self.x - other.x).powi(2) + (self.y - other.y).powi(2)
    }

    fn midpoint(&self, other: &Pointer) -> Pointer {
        Pointer::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Raw pointer events fed by the hosting UI layer.
#[derive(Debug, Clone, Copy)]
pub enum TouchEvent {
    /// First pointer down.
    Down { at: Instant, pos: Pointer },
    /// Second pointer down while the first is held.
    SecondDown {
        at: Instant,
        first: Pointer,
        second: Pointer,
    },
    /// Pointer movement; `second` is present during two-finger contact.
    Move {
        at: Instant,
        first: Pointer,
        second: Option<Pointer>,
    },
    /// Second pointer up; `remaining` is the pointer still down.
    SecondUp { at: Instant, remaining: Pointer },
    /// Last pointer up.
    Up { at: Instant, pos: Pointer },
    /// Sequence aborted by the platform.
    Cancel,
}

/// Recognized gesture intents, consumed by the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureIntent {
    /// Smoothed pan delta in viewport pixels (finger movement direction).
    Pan { dx: f64, dy: f64 },
    /// Smoothed zoom scale factor, anchored at the pointer midpoint.
    Zoom { scale: f64, focus: Pointer },
    /// Confirmed single tap (released only after the double-tap window).
    Tap { pos: Pointer },
    /// Second tap released within the double-tap window: zoom in at the
    /// release point. Dragging instead of releasing cancels it.
    DoubleTap { pos: Pointer },
    /// Two-finger tap: zoom out centered at the pointer midpoint.
    TwoFingerTap { midpoint: Pointer },
    /// Kinetic scroll start; velocity in pixels/second, inverted relative
    /// to the finger motion.
    Fling { vx: f64, vy: f64 },
}

/// Recognizer tuning.
#[derive(Debug, Clone, Copy)]
pub struct GestureConfig {
    /// Squared displacement (px²) promoting a candidate to movement.
    pub slop_sq: f64,
    /// How long a single tap is withheld waiting for a second tap.
    pub double_tap_timeout: Duration,
    /// Minimum fling speed in px/s, required on at least one axis.
    pub min_fling_velocity: f64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            slop_sq: 400.0,
            double_tap_timeout: Duration::from_millis(300),
            min_fling_velocity: 50.0,
        }
    }
}

#[derive(Debug)]
enum State {
    Idle,
    PanCandidate {
        start: Pointer,
        last: Pointer,
    },
    Panning {
        last: Pointer,
        filter_dx: f64,
        filter_dy: f64,
    },
    ZoomCandidate {
        first: Pointer,
        second: Pointer,
    },
    Zooming {
        prev_dist: f64,
        filter_scale: f64,
    },
}

#[derive(Debug, Clone, Copy)]
struct PendingTap {
    pos: Pointer,
    at: Instant,
}

/// Translates raw touch events into gesture intents.
pub struct GestureRecognizer {
    config: GestureConfig,
    viewport_width: f64,
    viewport_height: f64,
    state: State,
    pending_tap: Option<PendingTap>,
    suppress_tap: bool,
    /// A second down landed inside the double-tap window; the classification
    /// is decided on release, movement disarms it.
    double_tap_armed: bool,
    samples: VecDeque<(Instant, Pointer)>,
}

impl GestureRecognizer {
    pub fn new(config: GestureConfig, viewport_width: u32, viewport_height: u32) -> Self {
        Self {
            config,
            viewport_width: f64::from(viewport_width.max(1)),
            viewport_height: f64::from(viewport_height.max(1)),
            state: State::Idle,
            pending_tap: None,
            suppress_tap: false,
            double_tap_armed: false,
            samples: VecDeque::new(),
        }
    }

    /// Updates the viewport dimensions used to normalize zoom distances.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport_width = f64::from(width.max(1));
        self.viewport_height = f64::from(height.max(1));
    }

    /// Feeds one raw event; returns the intents it produced.
    pub fn handle(&mut self, event: TouchEvent) -> Vec<GestureIntent> {
        let mut intents = Vec::new();
        match event {
            TouchEvent::Down { at, pos } => self.on_down(at, pos, &mut intents),
            TouchEvent::SecondDown { first, second, .. } => {
                self.samples.clear();
                self.double_tap_armed = false;
                self.state = State::ZoomCandidate { first, second };
            }
            TouchEvent::Move { at, first, second } => {
                self.on_move(at, first, second, &mut intents)
            }
            TouchEvent::SecondUp { remaining, .. } => self.on_second_up(remaining, &mut intents),
            TouchEvent::Up { at, pos } => self.on_up(at, pos, &mut intents),
            TouchEvent::Cancel => {
                self.state = State::Idle;
                self.samples.clear();
                self.pending_tap = None;
                self.suppress_tap = false;
                self.double_tap_armed = false;
            }
        }
        intents
    }

    /// Releases a withheld single tap once the double-tap window has closed.
    ///
    /// Call once per frame with the current time.
    pub fn poll(&mut self, now: Instant) -> Option<GestureIntent> {
        let pending = self.pending_tap?;
        if now.duration_since(pending.at) >= self.config.double_tap_timeout {
            self.pending_tap = None;
            Some(GestureIntent::Tap { pos: pending.pos })
        } else {
            None
        }
    }

    fn on_down(&mut self, at: Instant, pos: Pointer, intents: &mut Vec<GestureIntent>) {
        self.samples.clear();
        self.suppress_tap = false;
        self.double_tap_armed = false;
        if let Some(pending) = self.pending_tap.take() {
            if at.duration_since(pending.at) < self.config.double_tap_timeout {
                // Classified on release: a clean second tap zooms in, a
                // drag is just a pan.
                self.double_tap_armed = true;
            } else {
                // The frame loop stalled past the window; the first tap
                // still counts.
                intents.push(GestureIntent::Tap { pos: pending.pos });
            }
        }
        self.state = State::PanCandidate { start: pos, last: pos };
    }

    fn on_move(
        &mut self,
        at: Instant,
        first: Pointer,
        second: Option<Pointer>,
        intents: &mut Vec<GestureIntent>,
    ) {
        let state = std::mem::replace(&mut self.state, State::Idle);
        self.state = match state {
            State::Idle => State::Idle,
            State::PanCandidate { start, .. } => {
                self.samples.push_back((at, first));
                self.prune_samples(at);
                if first.dist_sq(&start) > self.config.slop_sq {
                    // Movement cancels tap classification for good.
                    self.suppress_tap = true;
                    self.pending_tap = None;
                    self.double_tap_armed = false;
                    let mut filter_dx = 0.0;
                    let mut filter_dy = 0.0;
                    let dx = low_pass(&mut filter_dx, first.x - start.x);
                    let dy = low_pass(&mut filter_dy, first.y - start.y);
                    intents.push(GestureIntent::Pan { dx, dy });
                    State::Panning {
                        last: first,
                        filter_dx,
                        filter_dy,
                    }
                } else {
                    State::PanCandidate { start, last: first }
                }
            }
            State::Panning {
                last,
                mut filter_dx,
                mut filter_dy,
            } => {
                self.samples.push_back((at, first));
                self.prune_samples(at);
                let dx = low_pass(&mut filter_dx, first.x - last.x);
                let dy = low_pass(&mut filter_dy, first.y - last.y);
                intents.push(GestureIntent::Pan { dx, dy });
                State::Panning {
                    last: first,
                    filter_dx,
                    filter_dy,
                }
            }
            State::ZoomCandidate {
                first: f0,
                second: s0,
            } => match second {
                Some(second)
                    if first.dist_sq(&f0) > self.config.slop_sq
                        || second.dist_sq(&s0) > self.config.slop_sq =>
                {
                    self.suppress_tap = true;
                    self.double_tap_armed = false;
                    let prev =
                        normalized_dist_sq(f0, s0, self.viewport_width, self.viewport_height);
                    let dist = normalized_dist_sq(
                        first,
                        second,
                        self.viewport_width,
                        self.viewport_height,
                    );
                    let raw = ZOOM_BASE.powf(dist - prev);
                    let mut filter_scale = 0.0;
                    let scale = low_pass(&mut filter_scale, raw);
                    intents.push(GestureIntent::Zoom {
                        scale,
                        focus: first.midpoint(&second),
                    });
                    State::Zooming {
                        prev_dist: dist,
                        filter_scale,
                    }
                }
                _ => State::ZoomCandidate {
                    first: f0,
                    second: s0,
                },
            },
            State::Zooming {
                prev_dist,
                mut filter_scale,
            } => match second {
                Some(second) => {
                    let dist = normalized_dist_sq(
                        first,
                        second,
                        self.viewport_width,
                        self.viewport_height,
                    );
                    let raw = ZOOM_BASE.powf(dist - prev_dist);
                    let scale = low_pass(&mut filter_scale, raw);
                    intents.push(GestureIntent::Zoom {
                        scale,
                        focus: first.midpoint(&second),
                    });
                    State::Zooming {
                        prev_dist: dist,
                        filter_scale,
                    }
                }
                None => State::Zooming {
                    prev_dist,
                    filter_scale,
                },
            },
        };
    }

    fn on_second_up(&mut self, remaining: Pointer, intents: &mut Vec<GestureIntent>) {
        let state = std::mem::replace(&mut self.state, State::Idle);
        self.state = match state {
            State::ZoomCandidate { first, second } => {
                // Both fingers down, no qualifying movement: a two-finger
                // tap, emitted exactly once here. The trailing Up is
                // suppressed and cannot fling (samples are cleared).
                intents.push(GestureIntent::TwoFingerTap {
                    midpoint: first.midpoint(&second),
                });
                self.suppress_tap = true;
                State::PanCandidate {
                    start: remaining,
                    last: remaining,
                }
            }
            // Degrade to panning anchored at the remaining pointer;
            // subsequent moves keep flowing.
            State::Zooming { .. } => State::Panning {
                last: remaining,
                filter_dx: 0.0,
                filter_dy: 0.0,
            },
            _ => State::PanCandidate {
                start: remaining,
                last: remaining,
            },
        };
        self.samples.clear();
    }

    fn on_up(&mut self, at: Instant, pos: Pointer, intents: &mut Vec<GestureIntent>) {
        let state = std::mem::replace(&mut self.state, State::Idle);
        match state {
            State::PanCandidate { .. } => {
                if self.double_tap_armed {
                    debug!("double tap");
                    intents.push(GestureIntent::DoubleTap { pos });
                } else if !self.suppress_tap {
                    self.pending_tap = Some(PendingTap { pos, at });
                }
            }
            State::Panning { .. } => {
                if let Some(intent) = self.fling_intent(at, pos) {
                    intents.push(intent);
                }
            }
            _ => {}
        }
        self.samples.clear();
        self.suppress_tap = false;
        self.double_tap_armed = false;
    }

    /// Fling velocity from the recent sample window, inverted relative to
    /// the finger motion. Emitted when either axis exceeds the minimum
    /// speed, so a straight swipe still flings.
    fn fling_intent(&mut self, at: Instant, pos: Pointer) -> Option<GestureIntent> {
        self.prune_samples(at);
        let (t0, p0) = *self.samples.front()?;
        let dt = at.duration_since(t0).as_secs_f64();
        if dt <= 0.0 {
            return None;
        }
        let vx = -(pos.x - p0.x) / dt;
        let vy = -(pos.y - p0.y) / dt;
        if vx.abs() > self.config.min_fling_velocity || vy.abs() > self.config.min_fling_velocity {
            debug!(vx, vy, "fling");
            Some(GestureIntent::Fling { vx, vy })
        } else {
            None
        }
    }

    fn prune_samples(&mut self, now: Instant) {
        while let Some((t, _)) = self.samples.front() {
            if now.duration_since(*t) > VELOCITY_WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}

fn normalized_dist_sq(a: Pointer, b: Pointer, width: f64, height: f64) -> f64 {
    ((a.x - b.x) / width).powi(2) + ((a.y - b.y) / height).powi(2)
}

/// Single-pole low-pass step. A zero filter is unseeded: the first sample
/// passes through unattenuated and becomes the filter state.
fn low_pass(filter: &mut f64, value: f64) -> f64 {
    if *filter == 0.0 {
        *filter = value;
    }
    *filter += (value - *filter) / SMOOTHING;
    *filter
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recognizer() -> GestureRecognizer {
        GestureRecognizer::new(GestureConfig::default(), 1000, 1000)
    }

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    fn p(x: f64, y: f64) -> Pointer {
        Pointer::new(x, y)
    }

    #[test]
    fn test_tap_is_withheld_for_double_tap_window() {
        let mut g = recognizer();
        let t0 = Instant::now();

        assert!(g.handle(TouchEvent::Down { at: t0, pos: p(10.0, 10.0) }).is_empty());
        assert!(g.handle(TouchEvent::Up { at: at(t0, 50), pos: p(10.0, 10.0) }).is_empty());

        assert_eq!(g.poll(at(t0, 200)), None);
        assert_eq!(
            g.poll(at(t0, 360)),
            Some(GestureIntent::Tap { pos: p(10.0, 10.0) })
        );
        assert_eq!(g.poll(at(t0, 400)), None);
    }

    #[test]
    fn test_double_tap_classified_on_release() {
        let mut g = recognizer();
        let t0 = Instant::now();

        g.handle(TouchEvent::Down { at: t0, pos: p(10.0, 10.0) });
        g.handle(TouchEvent::Up { at: at(t0, 40), pos: p(10.0, 10.0) });

        // The second down alone decides nothing yet.
        assert!(g.handle(TouchEvent::Down { at: at(t0, 150), pos: p(12.0, 11.0) }).is_empty());

        let intents = g.handle(TouchEvent::Up { at: at(t0, 190), pos: p(12.0, 11.0) });
        assert_eq!(intents, vec![GestureIntent::DoubleTap { pos: p(12.0, 11.0) }]);
        assert_eq!(g.poll(at(t0, 600)), None);
    }

    #[test]
    fn test_tap_then_drag_pans_without_zooming() {
        let mut g = recognizer();
        let t0 = Instant::now();

        g.handle(TouchEvent::Down { at: t0, pos: p(100.0, 100.0) });
        g.handle(TouchEvent::Up { at: at(t0, 40), pos: p(100.0, 100.0) });

        // A second down inside the window followed by a drag is a plain
        // pan, never a zoom-in.
        assert!(g.handle(TouchEvent::Down { at: at(t0, 150), pos: p(100.0, 100.0) }).is_empty());
        let intents = g.handle(TouchEvent::Move {
            at: at(t0, 180),
            first: p(160.0, 100.0),
            second: None,
        });
        assert_eq!(intents, vec![GestureIntent::Pan { dx: 60.0, dy: 0.0 }]);

        let intents = g.handle(TouchEvent::Up { at: at(t0, 400), pos: p(160.0, 100.0) });
        assert!(
            !intents.iter().any(|i| matches!(i, GestureIntent::DoubleTap { .. })),
            "drag must cancel the double tap: {:?}",
            intents
        );
        assert_eq!(g.poll(at(t0, 1000)), None);
    }

    #[test]
    fn test_two_taps_outside_window_are_two_singles() {
        let mut g = recognizer();
        let t0 = Instant::now();

        g.handle(TouchEvent::Down { at: t0, pos: p(10.0, 10.0) });
        g.handle(TouchEvent::Up { at: at(t0, 40), pos: p(10.0, 10.0) });
        assert_eq!(
            g.poll(at(t0, 400)),
            Some(GestureIntent::Tap { pos: p(10.0, 10.0) })
        );

        g.handle(TouchEvent::Down { at: at(t0, 500), pos: p(10.0, 10.0) });
        g.handle(TouchEvent::Up { at: at(t0, 540), pos: p(10.0, 10.0) });
        assert_eq!(
            g.poll(at(t0, 900)),
            Some(GestureIntent::Tap { pos: p(10.0, 10.0) })
        );
    }

    #[test]
    fn test_two_finger_tap_emits_exactly_one_intent() {
        let mut g = recognizer();
        let t0 = Instant::now();
        let mut all = Vec::new();

        all.extend(g.handle(TouchEvent::Down { at: t0, pos: p(100.0, 100.0) }));
        all.extend(g.handle(TouchEvent::SecondDown {
            at: at(t0, 10),
            first: p(100.0, 100.0),
            second: p(200.0, 100.0),
        }));
        all.extend(g.handle(TouchEvent::SecondUp {
            at: at(t0, 80),
            remaining: p(100.0, 100.0),
        }));
        all.extend(g.handle(TouchEvent::Up { at: at(t0, 85), pos: p(100.0, 100.0) }));
        assert_eq!(g.poll(at(t0, 1000)), None);

        assert_eq!(
            all,
            vec![GestureIntent::TwoFingerTap {
                midpoint: p(150.0, 100.0)
            }]
        );
    }

    #[test]
    fn test_moves_within_slop_stay_candidate() {
        let mut g = recognizer();
        let t0 = Instant::now();

        g.handle(TouchEvent::Down { at: t0, pos: p(100.0, 100.0) });
        // 20px slop: 10px away stays a tap candidate.
        let intents = g.handle(TouchEvent::Move {
            at: at(t0, 20),
            first: p(107.0, 107.0),
            second: None,
        });
        assert!(intents.is_empty());

        g.handle(TouchEvent::Up { at: at(t0, 60), pos: p(107.0, 107.0) });
        assert!(matches!(
            g.poll(at(t0, 400)),
            Some(GestureIntent::Tap { .. })
        ));
    }

    #[test]
    fn test_pan_promotion_cancels_tap_and_smooths() {
        let mut g = recognizer();
        let t0 = Instant::now();

        g.handle(TouchEvent::Down { at: t0, pos: p(100.0, 100.0) });
        let first = g.handle(TouchEvent::Move {
            at: at(t0, 30),
            first: p(130.0, 100.0),
            second: None,
        });
        // The filter seeds from the first sample: 30px pass through.
        assert_eq!(first, vec![GestureIntent::Pan { dx: 30.0, dy: 0.0 }]);

        let second = g.handle(TouchEvent::Move {
            at: at(t0, 60),
            first: p(150.0, 100.0),
            second: None,
        });
        // 30 + (20 - 30) / 5 = 28.
        match second.as_slice() {
            [GestureIntent::Pan { dx, dy }] => {
                assert!((dx - 28.0).abs() < 1e-9);
                assert_eq!(*dy, 0.0);
            }
            other => panic!("unexpected intents: {:?}", other),
        }

        // A pan sequence never yields a tap.
        g.handle(TouchEvent::Up { at: at(t0, 90), pos: p(150.0, 100.0) });
        assert_eq!(g.poll(at(t0, 600)), None);
    }

    #[test]
    fn test_zoom_scale_filtered_from_normalized_distance() {
        let mut g = recognizer();
        let t0 = Instant::now();

        g.handle(TouchEvent::Down { at: t0, pos: p(400.0, 500.0) });
        g.handle(TouchEvent::SecondDown {
            at: at(t0, 10),
            first: p(400.0, 500.0),
            second: p(600.0, 500.0),
        });

        // Fingers spread 100px apart: past slop, promotes to zooming. The
        // scale filter seeds from the first sample.
        let intents = g.handle(TouchEvent::Move {
            at: at(t0, 40),
            first: p(350.0, 500.0),
            second: Some(p(650.0, 500.0)),
        });

        let d0 = (200.0_f64 / 1000.0).powi(2);
        let d1 = (300.0_f64 / 1000.0).powi(2);
        let expected = 1.6_f64.powf(d1 - d0);
        let first_scale = match intents.as_slice() {
            [GestureIntent::Zoom { scale, focus }] => {
                assert!((scale - expected).abs() < 1e-12, "scale = {}", scale);
                assert_eq!(*focus, p(500.0, 500.0));
                assert!(*scale > 1.0, "spreading fingers must zoom in");
                *scale
            }
            other => panic!("unexpected intents: {:?}", other),
        };

        // Pinching back in pulls the smoothed scale down toward below 1.
        let intents = g.handle(TouchEvent::Move {
            at: at(t0, 70),
            first: p(450.0, 500.0),
            second: Some(p(550.0, 500.0)),
        });
        match intents.as_slice() {
            [GestureIntent::Zoom { scale, .. }] => assert!(*scale < first_scale),
            other => panic!("unexpected intents: {:?}", other),
        }
    }

    #[test]
    fn test_second_up_during_zoom_degrades_to_pan() {
        let mut g = recognizer();
        let t0 = Instant::now();

        g.handle(TouchEvent::Down { at: t0, pos: p(400.0, 500.0) });
        g.handle(TouchEvent::SecondDown {
            at: at(t0, 10),
            first: p(400.0, 500.0),
            second: p(600.0, 500.0),
        });
        g.handle(TouchEvent::Move {
            at: at(t0, 40),
            first: p(350.0, 500.0),
            second: Some(p(650.0, 500.0)),
        });
        g.handle(TouchEvent::SecondUp {
            at: at(t0, 60),
            remaining: p(350.0, 500.0),
        });

        // The remaining pointer pans from its own anchor without a jump;
        // the pan filter is fresh, so the first delta passes through.
        let intents = g.handle(TouchEvent::Move {
            at: at(t0, 80),
            first: p(360.0, 500.0),
            second: None,
        });
        assert_eq!(intents, vec![GestureIntent::Pan { dx: 10.0, dy: 0.0 }]);
    }

    #[test]
    fn test_fast_release_flings_inverted() {
        let mut g = recognizer();
        let t0 = Instant::now();

        g.handle(TouchEvent::Down { at: t0, pos: p(500.0, 500.0) });
        for i in 1..=5u64 {
            g.handle(TouchEvent::Move {
                at: at(t0, i * 16),
                first: p(500.0 - 40.0 * i as f64, 500.0 - 30.0 * i as f64),
                second: None,
            });
        }
        let intents = g.handle(TouchEvent::Up {
            at: at(t0, 96),
            pos: p(300.0, 350.0),
        });

        match intents.as_slice() {
            [GestureIntent::Fling { vx, vy }] => {
                // Finger moved toward negative x/y; fling is inverted.
                assert!(*vx > 0.0 && *vy > 0.0, "vx = {}, vy = {}", vx, vy);
                assert!(*vx > 50.0 && *vy > 50.0);
            }
            other => panic!("unexpected intents: {:?}", other),
        }
    }

    #[test]
    fn test_single_axis_swipe_still_flings() {
        let mut g = recognizer();
        let t0 = Instant::now();

        // A fast, purely vertical swipe: no horizontal velocity at all.
        g.handle(TouchEvent::Down { at: t0, pos: p(500.0, 500.0) });
        for i in 1..=5u64 {
            g.handle(TouchEvent::Move {
                at: at(t0, i * 16),
                first: p(500.0, 500.0 - 32.0 * i as f64),
                second: None,
            });
        }
        let intents = g.handle(TouchEvent::Up {
            at: at(t0, 96),
            pos: p(500.0, 340.0),
        });

        match intents.as_slice() {
            [GestureIntent::Fling { vx, vy }] => {
                assert_eq!(*vx, 0.0);
                assert!(*vy > 50.0, "vy = {}", vy);
            }
            other => panic!("unexpected intents: {:?}", other),
        }
    }

    #[test]
    fn test_slow_release_does_not_fling() {
        let mut g = recognizer();
        let t0 = Instant::now();

        g.handle(TouchEvent::Down { at: t0, pos: p(500.0, 500.0) });
        g.handle(TouchEvent::Move {
            at: at(t0, 100),
            first: p(450.0, 450.0),
            second: None,
        });
        // Barely moving at release time.
        g.handle(TouchEvent::Move {
            at: at(t0, 600),
            first: p(449.0, 449.0),
            second: None,
        });
        let intents = g.handle(TouchEvent::Up {
            at: at(t0, 700),
            pos: p(448.0, 448.0),
        });
        assert!(intents.is_empty());
    }

    #[test]
    fn test_cancel_clears_everything() {
        let mut g = recognizer();
        let t0 = Instant::now();

        g.handle(TouchEvent::Down { at: t0, pos: p(10.0, 10.0) });
        g.handle(TouchEvent::Up { at: at(t0, 40), pos: p(10.0, 10.0) });
        g.handle(TouchEvent::Cancel);
        assert_eq!(g.poll(at(t0, 1000)), None);
    }
}
